//! Strata ECS -- archetype-based component storage with chunked SoA columns.
//!
//! Entities are stored in archetypes (one per unique set of component types)
//! using a Structure-of-Arrays layout: each archetype owns a list of
//! fixed-size 16 KiB chunks, and each chunk holds one dense column per
//! component type. Adding or removing a component migrates the entity's row
//! between archetypes; hole-filling keeps every column dense at all times.
//! Generational entity IDs enable immediate stale-reference detection.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.register_component::<Velocity>("velocity");
//!
//! let entity = world.spawn_entity();
//! world.add_component(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//! world.add_component(entity, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//!
//! assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
#[allow(unsafe_code)]
pub mod chunk;
#[allow(unsafe_code)]
pub mod component;
pub mod entity;
#[allow(unsafe_code)]
pub mod query;
#[allow(unsafe_code)]
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by storage operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {0} is not registered (stale or never allocated)")]
    EntityNotRegistered(entity::Entity),

    /// A component type was referenced that has not been registered.
    #[error("component type '{0}' not registered")]
    UnknownComponent(String),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::chunk::CHUNK_BYTES;
    pub use crate::component::{ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::Entity;
    pub use crate::query::{Query, QueryItem, QueryIter, QueryIterMut};
    pub use crate::world::{EntityLocation, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
