//! Archetype storage: the unique partition for all entities sharing an
//! identical set of component types.
//!
//! An [`Archetype`]'s identity is its *sorted* list of [`ComponentTypeId`]s;
//! the [`World`](crate::world::World) sorts before lookup so that insertion
//! order of component additions can never create duplicate archetypes for
//! the same logical set. Storage is a list of fixed-capacity [`Chunk`]s with
//! one column per component type. Column slot indices are the positions in
//! the sorted type list, assigned once at archetype creation and therefore
//! stable across every chunk of the archetype.

use crate::chunk::{self, Chunk, CHUNK_BYTES};
use crate::component::{ComponentInfo, ComponentTypeId, ComponentVtable};
use crate::entity::Entity;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within the world. Indexes into `World::archetypes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub(crate) u32);

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// All storage for one set of component types.
///
/// Owns the sorted type list (set identity), per-type metadata and vtables,
/// the list of chunks, the enumeration-order entity list, and the cached
/// index of the next chunk with spare capacity. Archetypes are created
/// lazily and never destroyed; the set of archetypes is bounded by the
/// game's component vocabulary.
pub struct Archetype {
    /// Unique identifier of this archetype.
    id: ArchetypeId,
    /// Sorted, deduplicated list of component types. Slot `i` of every chunk
    /// stores `types[i]`.
    types: Vec<ComponentTypeId>,
    /// Metadata parallel to `types`.
    infos: Vec<ComponentInfo>,
    /// Construct/destroy capabilities parallel to `types`.
    vtables: Vec<ComponentVtable>,
    /// Entities currently stored here, in enumeration order. Used for
    /// introspection only; row addressing goes through the location index.
    entities: Vec<Entity>,
    /// Fixed-capacity storage blocks.
    chunks: Vec<Chunk>,
    /// Rows per chunk, bounded by the largest component:
    /// `CHUNK_BYTES / max_component_size`.
    rows_per_chunk: usize,
    /// Cached index of a chunk with spare capacity, or `None` when every
    /// chunk is full.
    free_chunk: Option<usize>,
}

impl Archetype {
    /// Create a new archetype and eagerly allocate its first chunk, so every
    /// archetype always has at least one chunk.
    ///
    /// `types` must already be sorted and deduplicated; `infos` and `vtables`
    /// must correspond 1:1 with it.
    ///
    /// # Panics
    ///
    /// Panics if any component is larger than [`CHUNK_BYTES`].
    pub(crate) fn new(
        id: ArchetypeId,
        types: Vec<ComponentTypeId>,
        infos: Vec<ComponentInfo>,
        vtables: Vec<ComponentVtable>,
    ) -> Self {
        assert!(
            types.windows(2).all(|w| w[0] < w[1]),
            "archetype type list must be sorted and deduplicated"
        );
        let mut max_size = 0usize;
        for info in &infos {
            if info.size > CHUNK_BYTES {
                panic!(
                    "component '{}' ({} bytes) does not fit in a {CHUNK_BYTES}-byte chunk column",
                    info.name, info.size
                );
            }
            max_size = max_size.max(info.size);
        }
        // ZST-only archetypes have no size-limited column; cap rows anyway.
        let rows_per_chunk = if max_size == 0 {
            CHUNK_BYTES
        } else {
            CHUNK_BYTES / max_size
        };

        let first_chunk = Chunk::new(&infos, rows_per_chunk);
        Self {
            id,
            types,
            infos,
            vtables,
            entities: Vec::new(),
            chunks: vec![first_chunk],
            rows_per_chunk,
            free_chunk: Some(0),
        }
    }

    // -- identity and introspection -----------------------------------------

    /// The archetype's unique ID.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The sorted set of component type IDs that define this archetype.
    #[inline]
    pub fn component_types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    /// Whether this archetype contains the given component type.
    #[inline]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.slot_of(type_id).is_some()
    }

    /// Number of entities stored in this archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether this archetype is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The entity IDs stored in this archetype, in enumeration order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The archetype's chunks, for tooling and profilers.
    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Maximum rows per chunk for this archetype.
    #[inline]
    pub fn rows_per_chunk(&self) -> usize {
        self.rows_per_chunk
    }

    /// Column slot index for a component type: its position in the sorted
    /// type list.
    #[inline]
    pub(crate) fn slot_of(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.types.binary_search(&type_id).ok()
    }

    // -- chunk allocation ----------------------------------------------------

    /// Claim a free row for `entity`, growing storage on demand.
    ///
    /// The cached free-chunk index is consulted first; if it is stale, the
    /// existing chunks are scanned for spare capacity before a new chunk is
    /// appended. After the insert the cache is re-derived so it never points
    /// at a full chunk.
    pub(crate) fn reserve_row(&mut self, entity: Entity) -> (usize, usize) {
        let chunk_idx = self.find_free_chunk();
        let row = self.chunks[chunk_idx].reserve_row(entity);
        if self.chunks[chunk_idx].is_full() {
            self.free_chunk = self.chunks.iter().position(|c| !c.is_full());
        } else {
            self.free_chunk = Some(chunk_idx);
        }
        (chunk_idx, row)
    }

    fn find_free_chunk(&mut self) -> usize {
        if let Some(idx) = self.free_chunk {
            if !self.chunks[idx].is_full() {
                return idx;
            }
        }
        if let Some(idx) = self.chunks.iter().position(|c| !c.is_full()) {
            return idx;
        }
        self.chunks.push(Chunk::new(&self.infos, self.rows_per_chunk));
        tracing::trace!(
            archetype = self.id.0,
            chunks = self.chunks.len(),
            rows_per_chunk = self.rows_per_chunk,
            "archetype grew a chunk"
        );
        self.chunks.len() - 1
    }

    /// Vacate (`chunk`, `row`) by hole-filling, and remember that the chunk
    /// has spare capacity again.
    ///
    /// Returns the entity whose row was moved into the hole, if any. The
    /// values at `row` must already have been moved out or dropped.
    pub(crate) fn release_row(&mut self, chunk: usize, row: usize) -> Option<Entity> {
        let moved = self.chunks[chunk].fill_hole(row);
        self.free_chunk = Some(match self.free_chunk {
            Some(idx) => idx.min(chunk),
            None => chunk,
        });
        moved
    }

    // -- entity list maintenance --------------------------------------------

    pub(crate) fn push_entity(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    pub(crate) fn remove_from_entity_list(&mut self, entity: Entity) {
        let pos = self
            .entities
            .iter()
            .position(|&e| e == entity)
            .expect("entity missing from archetype entity list");
        self.entities.swap_remove(pos);
    }

    // -- row access ----------------------------------------------------------

    /// Get a reference to a component value.
    ///
    /// # Safety
    ///
    /// `T` must be the concrete type stored in the column for `type_id`.
    pub unsafe fn get_component<T: 'static>(
        &self,
        chunk: usize,
        row: usize,
        type_id: ComponentTypeId,
    ) -> Option<&T> {
        let slot = self.slot_of(type_id)?;
        let chunk = self.chunks.get(chunk)?;
        if row >= chunk.row_count() {
            return None;
        }
        Some(&*(chunk.column_ptr(slot, row) as *const T))
    }

    /// Get a mutable reference to a component value.
    ///
    /// # Safety
    ///
    /// `T` must be the concrete type stored in the column for `type_id`.
    pub unsafe fn get_component_mut<T: 'static>(
        &mut self,
        chunk: usize,
        row: usize,
        type_id: ComponentTypeId,
    ) -> Option<&mut T> {
        let slot = self.slot_of(type_id)?;
        let chunk = self.chunks.get_mut(chunk)?;
        if row >= chunk.row_count() {
            return None;
        }
        Some(&mut *(chunk.column_ptr_mut(slot, row) as *mut T))
    }

    /// Raw mutable pointer to the component at (`chunk`, `row`) for
    /// `type_id`.
    ///
    /// # Safety
    ///
    /// The caller must use the pointer with the correct concrete type and
    /// must not create aliasing references through it.
    pub unsafe fn get_component_raw_mut(
        &mut self,
        chunk: usize,
        row: usize,
        type_id: ComponentTypeId,
    ) -> Option<*mut u8> {
        let slot = self.slot_of(type_id)?;
        let chunk = self.chunks.get_mut(chunk)?;
        if row >= chunk.row_count() {
            return None;
        }
        Some(chunk.column_ptr_mut(slot, row))
    }

    /// Default-construct the component for `type_id` into its slot at
    /// (`chunk`, `row`).
    ///
    /// # Safety
    ///
    /// The slot must be uninitialized (a freshly reserved row).
    pub(crate) unsafe fn construct_in_place(
        &mut self,
        chunk: usize,
        row: usize,
        type_id: ComponentTypeId,
    ) {
        let slot = self
            .slot_of(type_id)
            .expect("component type not in archetype");
        let vtable = &self.vtables[slot];
        (vtable.default_fn)(self.chunks[chunk].column_ptr_mut(slot, row));
    }

    /// Drop the component value for `type_id` at (`chunk`, `row`) in place.
    /// The bytes are left behind; the caller vacates the row afterwards.
    ///
    /// # Safety
    ///
    /// The slot must hold a live, initialized value.
    pub(crate) unsafe fn drop_component_in_place(
        &mut self,
        chunk: usize,
        row: usize,
        type_id: ComponentTypeId,
    ) {
        let slot = self
            .slot_of(type_id)
            .expect("component type not in archetype");
        let vtable = &self.vtables[slot];
        (vtable.drop_fn)(self.chunks[chunk].column_ptr_mut(slot, row));
    }

    /// Drop every component value at (`chunk`, `row`) in place. Used when an
    /// entity is destroyed outright.
    ///
    /// # Safety
    ///
    /// Every slot at the row must hold a live, initialized value.
    pub(crate) unsafe fn drop_row_values(&mut self, chunk: usize, row: usize) {
        for slot in 0..self.vtables.len() {
            let vtable = &self.vtables[slot];
            (vtable.drop_fn)(self.chunks[chunk].column_ptr_mut(slot, row));
        }
    }

    /// Relocate every component this archetype shares with `dst` from
    /// (`src_chunk`, `src_row`) to (`dst_chunk`, `dst_row`). All columns use
    /// the same destination row, so the row moves atomically.
    ///
    /// Types absent from `dst` are skipped; the caller destructs those in
    /// place before vacating the source row.
    ///
    /// # Safety
    ///
    /// The source row must hold live values; the destination row must be
    /// freshly reserved and uninitialized. Ownership of the copied values
    /// transfers to `dst`.
    pub(crate) unsafe fn relocate_row_to(
        &self,
        src_chunk: usize,
        src_row: usize,
        dst: &mut Archetype,
        dst_chunk: usize,
        dst_row: usize,
    ) {
        for (slot, &type_id) in self.types.iter().enumerate() {
            if let Some(dst_slot) = dst.slot_of(type_id) {
                chunk::relocate_component(
                    &self.chunks[src_chunk],
                    slot,
                    src_row,
                    &mut dst.chunks[dst_chunk],
                    dst_slot,
                    dst_row,
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn free_chunk_hint(&self) -> Option<usize> {
        self.free_chunk
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        // Destruct all live rows; the chunks then free their buffers.
        for chunk_idx in 0..self.chunks.len() {
            for row in 0..self.chunks[chunk_idx].row_count() {
                for slot in 0..self.vtables.len() {
                    let vtable = &self.vtables[slot];
                    unsafe {
                        (vtable.drop_fn)(self.chunks[chunk_idx].column_ptr_mut(slot, row));
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("types", &self.types)
            .field("entities", &self.entities.len())
            .field("chunks", &self.chunks.len())
            .field("rows_per_chunk", &self.rows_per_chunk)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    // 8 KiB component -> two rows per 16 KiB chunk.
    #[derive(Debug, Clone)]
    struct Big([f64; 1024]);

    impl Default for Big {
        fn default() -> Self {
            Big([0.0; 1024])
        }
    }

    fn archetype_of<T: Default + Send + Sync + 'static>(name: &str) -> Archetype {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<T>(name);
        let info = reg.get_info(id).unwrap().clone();
        Archetype::new(
            ArchetypeId(0),
            vec![id],
            vec![info],
            vec![ComponentVtable::new::<T>()],
        )
    }

    #[test]
    fn rows_per_chunk_bounded_by_largest_component() {
        let arch = archetype_of::<Big>("big");
        assert_eq!(arch.rows_per_chunk(), 2);
        let arch = archetype_of::<Pos>("position");
        assert_eq!(arch.rows_per_chunk(), CHUNK_BYTES / std::mem::size_of::<Pos>());
    }

    #[test]
    fn first_chunk_is_eager() {
        let arch = archetype_of::<Pos>("position");
        assert_eq!(arch.chunks().len(), 1);
        assert_eq!(arch.free_chunk_hint(), Some(0));
    }

    #[test]
    fn reserve_appends_chunk_when_full() {
        let mut arch = archetype_of::<Big>("big");
        // Fill chunk 0 (two rows) without constructing values; Big has no
        // Drop so leaving the bytes uninitialized is fine for this test.
        let (c0, _) = arch.reserve_row(Entity::new(1, 0));
        let (c1, _) = arch.reserve_row(Entity::new(2, 0));
        assert_eq!((c0, c1), (0, 0));
        assert_eq!(arch.free_chunk_hint(), None);

        let (c2, r2) = arch.reserve_row(Entity::new(3, 0));
        assert_eq!((c2, r2), (1, 0));
        assert_eq!(arch.chunks().len(), 2);
        assert_eq!(arch.free_chunk_hint(), Some(1));
    }

    #[test]
    fn release_reopens_full_chunk() {
        let mut arch = archetype_of::<Big>("big");
        arch.reserve_row(Entity::new(1, 0));
        arch.reserve_row(Entity::new(2, 0));
        arch.reserve_row(Entity::new(3, 0)); // chunk 1
        assert_eq!(arch.free_chunk_hint(), Some(1));

        // Vacating a row in chunk 0 should point the hint back at it.
        let moved = arch.release_row(0, 0);
        assert_eq!(moved, Some(Entity::new(2, 0)));
        assert_eq!(arch.free_chunk_hint(), Some(0));

        let (chunk, row) = arch.reserve_row(Entity::new(4, 0));
        assert_eq!((chunk, row), (0, 1));
    }

    #[test]
    fn slot_indices_follow_sorted_type_order() {
        let mut reg = ComponentRegistry::new();
        let pos = reg.register::<Pos>("position");
        let big = reg.register::<Big>("big");
        let mut types = vec![big, pos];
        types.sort();
        let infos: Vec<_> = types
            .iter()
            .map(|t| reg.get_info(*t).unwrap().clone())
            .collect();
        // Vtables must line up with the sorted type list.
        let vtables: Vec<_> = types
            .iter()
            .map(|t| {
                if *t == pos {
                    ComponentVtable::new::<Pos>()
                } else {
                    ComponentVtable::new::<Big>()
                }
            })
            .collect();
        let arch = Archetype::new(ArchetypeId(0), types.clone(), infos, vtables);
        for (i, t) in types.iter().enumerate() {
            assert_eq!(arch.slot_of(*t), Some(i));
        }
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn oversized_component_is_rejected() {
        #[derive(Clone)]
        struct Huge([u8; CHUNK_BYTES + 1]);
        impl Default for Huge {
            fn default() -> Self {
                Huge([0; CHUNK_BYTES + 1])
            }
        }
        let _ = archetype_of::<Huge>("huge");
    }
}
