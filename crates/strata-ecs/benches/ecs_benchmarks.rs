//! Storage engine benchmarks: spawn throughput, query iteration, and
//! migration cost.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use strata_ecs::entity::Entity;
use strata_ecs::world::World;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Velocity {
    dx: f64,
    dy: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Health(u32);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup_world() -> World {
    let mut world = World::new();
    world.register_component::<Position>("position");
    world.register_component::<Velocity>("velocity");
    world.register_component::<Health>("health");
    world
}

/// Populate `count` entities with Position + Velocity.
fn populate(world: &mut World, count: usize) -> Vec<Entity> {
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let e = world.spawn_entity();
        world
            .add_component(
                e,
                Position {
                    x: i as f64,
                    y: 0.0,
                },
            )
            .unwrap();
        world
            .add_component(e, Velocity { dx: 1.0, dy: -1.0 })
            .unwrap();
        entities.push(e);
    }
    entities
}

// ---------------------------------------------------------------------------
// Benchmark 1: spawn + add throughput
// ---------------------------------------------------------------------------

fn bench_spawn(c: &mut Criterion) {
    c.bench_function("spawn_1k_pos_vel", |b| {
        b.iter(|| {
            let mut world = setup_world();
            let entities = populate(&mut world, 1000);
            black_box(entities.len());
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 2: query iteration over dense chunks
// ---------------------------------------------------------------------------

fn bench_query_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_iteration");

    for &count in &[1_000usize, 10_000, 100_000] {
        let mut world = setup_world();
        populate(&mut world, count);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &_count| {
            b.iter(|| {
                let mut sum = 0.0f64;
                for (_entity, (pos, vel)) in world.query::<(&Position, &Velocity)>() {
                    sum += pos.x * vel.dx;
                }
                black_box(sum);
            });
        });
    }

    group.finish();
}

fn bench_query_mutate(c: &mut Criterion) {
    let mut world = setup_world();
    populate(&mut world, 10_000);

    c.bench_function("query_mut_10k_integrate", |b| {
        b.iter(|| {
            for (_entity, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>() {
                pos.x += vel.dx;
                pos.y += vel.dy;
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 3: migration cost (add/remove round trip)
// ---------------------------------------------------------------------------

fn bench_migration(c: &mut Criterion) {
    let mut world = setup_world();
    let entities = populate(&mut world, 1_000);

    c.bench_function("migration_1k_add_remove_health", |b| {
        b.iter(|| {
            for &e in &entities {
                world.add_component(e, Health(100)).unwrap();
            }
            for &e in &entities {
                world.remove_component::<Health>(e).unwrap();
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_spawn,
    bench_query_iteration,
    bench_query_mutate,
    bench_migration,
);
criterion_main!(benches);
