//! Entity identifiers and allocation.
//!
//! An [`Entity`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and an *index* in the low 32 bits. Indices start at 1, so the
//! all-zero value is reserved as the null sentinel ([`Entity::NULL`]). The
//! generation is bumped every time an index is recycled, which allows
//! immediate stale-handle detection.

use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`, where `index >= 1` for any
/// handle produced by the allocator. The raw value `0` is the null sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u64);

impl Entity {
    /// The null entity. Never returned by the allocator, never alive.
    pub const NULL: Entity = Entity(0);

    /// Construct an `Entity` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Whether this is the null sentinel.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Issues unique [`Entity`] handles and tracks liveness.
///
/// Free indices are kept in a FIFO queue so that generations are spread out
/// over time rather than concentrated on a hot index. The allocator does not
/// cascade component removal; the [`World`](crate::world::World) is
/// responsible for clearing storage before deallocating a handle.
#[derive(Debug)]
pub struct EntityAllocator {
    /// Current generation for each slot. Slot `s` backs entity index `s + 1`.
    generations: Vec<u32>,
    /// Whether the slot is currently alive.
    alive: Vec<bool>,
    /// Free-list of recyclable slots (FIFO queue).
    free_slots: VecDeque<u32>,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            alive: Vec::new(),
            free_slots: VecDeque::new(),
        }
    }

    /// Allocate a fresh [`Entity`]. Never fails.
    ///
    /// If a recycled slot is available it is reused with its already-bumped
    /// generation; otherwise a brand-new slot is created.
    pub fn allocate(&mut self) -> Entity {
        if let Some(slot) = self.free_slots.pop_front() {
            self.alive[slot as usize] = true;
            Entity::new(slot + 1, self.generations[slot as usize])
        } else {
            let slot = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            Entity::new(slot + 1, 0)
        }
    }

    /// Deallocate an entity, bumping the generation for its slot so that any
    /// outstanding handles become stale.
    ///
    /// Returns `true` if the entity was alive and is now dead, `false` if the
    /// handle was null, stale, or already dead.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        let Some(slot) = self.slot_of(entity) else {
            return false;
        };
        if !self.alive[slot] {
            return false;
        }
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free_slots.push_back(slot as u32);
        true
    }

    /// Whether `entity` refers to a currently alive handle with a matching
    /// generation. O(1).
    pub fn is_alive(&self, entity: Entity) -> bool {
        match self.slot_of(entity) {
            Some(slot) => self.alive[slot],
            None => false,
        }
    }

    /// Total number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    /// Resolve a handle to its backing slot, rejecting null handles, indices
    /// out of range, and stale generations.
    fn slot_of(&self, entity: Entity) -> Option<usize> {
        if entity.is_null() {
            return None;
        }
        let slot = (entity.index() - 1) as usize;
        if slot >= self.generations.len() {
            return None;
        }
        if self.generations[slot] != entity.generation() {
            return None;
        }
        Some(slot)
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<Entity> = (0..100).map(|_| alloc.allocate()).collect();
        let mut indices: Vec<u32> = ids.iter().map(|e| e.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 100);
    }

    #[test]
    fn allocated_ids_are_never_null() {
        let mut alloc = EntityAllocator::new();
        for _ in 0..64 {
            let e = alloc.allocate();
            assert!(!e.is_null());
            assert!(e.index() >= 1);
        }
    }

    #[test]
    fn null_sentinel_is_raw_zero() {
        assert_eq!(Entity::NULL.to_raw(), 0);
        assert!(Entity::NULL.is_null());
        assert!(!EntityAllocator::new().is_alive(Entity::NULL));
    }

    #[test]
    fn generation_increments_on_recycle() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert_eq!(e0.generation(), 0);
        assert!(alloc.deallocate(e0));
        let e1 = alloc.allocate();
        // Same index, higher generation.
        assert_eq!(e1.index(), e0.index());
        assert_eq!(e1.generation(), 1);
    }

    #[test]
    fn stale_id_detection() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert!(alloc.is_alive(e0));
        assert!(alloc.deallocate(e0));
        assert!(!alloc.is_alive(e0), "stale handle should not be alive");
        let _e1 = alloc.allocate(); // recycles same index
        assert!(!alloc.is_alive(e0), "stale handle still dead after recycle");
    }

    #[test]
    fn double_deallocate_returns_false() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.deallocate(e));
        assert!(!alloc.deallocate(e));
    }

    #[test]
    fn alive_count_tracks_correctly() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        let _e1 = alloc.allocate();
        assert_eq!(alloc.alive_count(), 2);
        alloc.deallocate(e0);
        assert_eq!(alloc.alive_count(), 1);
    }

    #[test]
    fn entity_roundtrip() {
        let e = Entity::new(42, 7);
        assert_eq!(e.index(), 42);
        assert_eq!(e.generation(), 7);
        assert_eq!(Entity::from_raw(e.to_raw()), e);
    }
}
