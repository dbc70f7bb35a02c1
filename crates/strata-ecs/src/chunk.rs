//! Fixed-capacity, column-oriented storage blocks.
//!
//! A [`Chunk`] belongs to exactly one archetype. It holds one [`Column`] per
//! component type in the archetype's sorted type list, plus a parallel
//! `Vec<Entity>` mapping row index back to the owning entity. The length of
//! that vector *is* the chunk's shared row count: row `r` of every column
//! belongs to `entities[r]`, and rows `0..row_count` are always dense.
//!
//! # Safety
//!
//! Columns are type-erased byte buffers. All indices are checked with
//! always-on assertions at this boundary; the higher-level archetype and
//! world code guarantees that every access uses the correct component
//! metadata for the column's concrete type.

use crate::component::ComponentInfo;
use crate::entity::Entity;

use std::alloc::{self, Layout};
use std::ptr;

/// Capacity of a single column buffer in bytes (16 KiB).
///
/// Every column of a chunk gets a full-size buffer, so the number of rows a
/// chunk can hold is bounded by the largest component in its archetype:
/// `rows = CHUNK_BYTES / max_component_size`.
pub const CHUNK_BYTES: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// Column -- one component type's byte buffer
// ---------------------------------------------------------------------------

/// A fixed-capacity, densely packed byte buffer holding all rows of one
/// component type within a chunk. Allocated once at chunk creation; never
/// grows.
pub(crate) struct Column {
    /// Pointer to the heap allocation (null for zero-sized types).
    data: *mut u8,
    /// Size of a single element.
    item_size: usize,
    /// Alignment of a single element.
    item_align: usize,
}

// Columns only store raw bytes; registration requires the concrete component
// type to be Send + Sync.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Allocate a column for a component described by `info`.
    fn new(info: &ComponentInfo) -> Self {
        let data = if info.size > 0 {
            let layout = Layout::from_size_align(CHUNK_BYTES, info.align)
                .expect("invalid column layout");
            let ptr = unsafe { alloc::alloc(layout) };
            assert!(!ptr.is_null(), "column allocation failed");
            ptr
        } else {
            ptr::null_mut()
        };
        Self {
            data,
            item_size: info.size,
            item_align: info.align,
        }
    }

    /// Raw pointer to the element at `row`. The caller checks `row` against
    /// the chunk's row count.
    #[inline]
    fn ptr_at(&self, row: usize) -> *mut u8 {
        if self.item_size == 0 {
            // ZST -- dangling but aligned.
            return self.item_align as *mut u8;
        }
        unsafe { self.data.add(row * self.item_size) }
    }

    /// Move the element at `from` into `to` (a plain byte copy; the slot at
    /// `to` must already be vacated).
    #[inline]
    unsafe fn move_row(&mut self, from: usize, to: usize) {
        if self.item_size > 0 {
            ptr::copy_nonoverlapping(self.ptr_at(from), self.ptr_at(to), self.item_size);
        }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        // Deallocates the buffer only. Live values are dropped by the owning
        // archetype before its chunks are dropped.
        if !self.data.is_null() {
            let layout = Layout::from_size_align(CHUNK_BYTES, self.item_align)
                .expect("column layout must be valid");
            unsafe {
                alloc::dealloc(self.data, layout);
            }
        }
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("item_size", &self.item_size)
            .field("item_align", &self.item_align)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A fixed-capacity storage block: one column per component type, a shared
/// row count, and the row-to-entity back-reference used when hole-filling.
#[derive(Debug)]
pub struct Chunk {
    /// Row -> owning entity. `entities.len()` is the live row count shared by
    /// every column.
    entities: Vec<Entity>,
    /// One column per component type, in the archetype's sorted type order.
    columns: Vec<Column>,
    /// Maximum number of rows this chunk can hold.
    capacity: usize,
}

impl Chunk {
    /// Create an empty chunk with one column per component described in
    /// `infos` (the archetype's sorted type list).
    pub(crate) fn new(infos: &[ComponentInfo], capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            columns: infos.iter().map(Column::new).collect(),
            capacity,
        }
    }

    /// Number of live rows.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.entities.len()
    }

    /// Maximum number of rows.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether every row is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() == self.capacity
    }

    /// The entities stored in this chunk, in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The entity occupying `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= row_count()`.
    #[inline]
    pub fn entity_at(&self, row: usize) -> Entity {
        self.entities[row]
    }

    /// Claim the next free row for `entity`. The row's column bytes are
    /// uninitialized until the caller writes them.
    ///
    /// # Panics
    ///
    /// Panics if the chunk is full.
    pub(crate) fn reserve_row(&mut self, entity: Entity) -> usize {
        assert!(
            !self.is_full(),
            "chunk is full ({} rows); caller must pick a chunk with spare capacity",
            self.capacity
        );
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Fill the hole left at `row` by moving the chunk's last row down into
    /// it, keeping every column dense, and decrement the row count.
    ///
    /// The caller must already have moved out or dropped the values that
    /// occupied `row` -- this is a plain byte move, no destructors run.
    ///
    /// Returns the entity whose row moved (so its location can be updated),
    /// or `None` if `row` was the last row.
    pub(crate) fn fill_hole(&mut self, row: usize) -> Option<Entity> {
        assert!(row < self.entities.len(), "row {row} out of bounds");
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        if row < last {
            for column in &mut self.columns {
                unsafe {
                    column.move_row(last, row);
                }
            }
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Raw pointer to the component at (`slot`, `row`).
    ///
    /// # Panics
    ///
    /// Panics if `slot` or `row` is out of bounds.
    #[inline]
    pub(crate) fn column_ptr(&self, slot: usize, row: usize) -> *const u8 {
        assert!(row < self.entities.len(), "row {row} out of bounds");
        self.columns[slot].ptr_at(row)
    }

    /// Mutable raw pointer to the component at (`slot`, `row`).
    ///
    /// # Panics
    ///
    /// Panics if `slot` or `row` is out of bounds.
    #[inline]
    pub(crate) fn column_ptr_mut(&mut self, slot: usize, row: usize) -> *mut u8 {
        assert!(row < self.entities.len(), "row {row} out of bounds");
        self.columns[slot].ptr_at(row)
    }
}

/// Move one component value between chunks during migration.
///
/// This is the only place that performs raw byte copies across chunk
/// boundaries. Ownership of the value transfers to `dst`; the source bytes
/// are left behind and must be vacated by a subsequent
/// [`Chunk::fill_hole`].
///
/// # Panics
///
/// Panics if either coordinate is out of bounds or the column element sizes
/// disagree.
pub(crate) fn relocate_component(
    src: &Chunk,
    src_slot: usize,
    src_row: usize,
    dst: &mut Chunk,
    dst_slot: usize,
    dst_row: usize,
) {
    assert!(src_row < src.entities.len(), "source row {src_row} out of bounds");
    assert!(dst_row < dst.entities.len(), "destination row {dst_row} out of bounds");
    let size = src.columns[src_slot].item_size;
    assert_eq!(
        size, dst.columns[dst_slot].item_size,
        "column element size mismatch during relocation"
    );
    if size > 0 {
        unsafe {
            ptr::copy_nonoverlapping(
                src.columns[src_slot].ptr_at(src_row),
                dst.columns[dst_slot].ptr_at(dst_row),
                size,
            );
        }
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

    fn pos_info() -> (ComponentRegistry, ComponentInfo) {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position");
        let info = reg.get_info(id).unwrap().clone();
        (reg, info)
    }

    #[test]
    fn reserve_rows_until_full() {
        let (_reg, info) = pos_info();
        let mut chunk = Chunk::new(std::slice::from_ref(&info), 3);
        assert_eq!(chunk.row_count(), 0);
        for i in 0..3 {
            let row = chunk.reserve_row(Entity::new(i + 1, 0));
            assert_eq!(row, i as usize);
        }
        assert!(chunk.is_full());
    }

    #[test]
    #[should_panic(expected = "chunk is full")]
    fn reserve_past_capacity_panics() {
        let (_reg, info) = pos_info();
        let mut chunk = Chunk::new(std::slice::from_ref(&info), 1);
        chunk.reserve_row(Entity::new(1, 0));
        chunk.reserve_row(Entity::new(2, 0));
    }

    #[test]
    fn fill_hole_moves_last_row_down() {
        let (_reg, info) = pos_info();
        let mut chunk = Chunk::new(std::slice::from_ref(&info), 4);
        let e1 = Entity::new(1, 0);
        let e2 = Entity::new(2, 0);
        let e3 = Entity::new(3, 0);
        for (e, v) in [(e1, 1.0f32), (e2, 2.0), (e3, 3.0)] {
            let row = chunk.reserve_row(e);
            unsafe {
                ptr::write(chunk.column_ptr_mut(0, row) as *mut Pos, Pos { x: v, y: 0.0 });
            }
        }

        // Vacate the first row; e3's row must move into it.
        let moved = chunk.fill_hole(0);
        assert_eq!(moved, Some(e3));
        assert_eq!(chunk.row_count(), 2);
        assert_eq!(chunk.entity_at(0), e3);
        assert_eq!(chunk.entity_at(1), e2);
        let got = unsafe { &*(chunk.column_ptr(0, 0) as *const Pos) };
        assert_eq!(got, &Pos { x: 3.0, y: 0.0 });
    }

    #[test]
    fn fill_hole_on_last_row_returns_none() {
        let (_reg, info) = pos_info();
        let mut chunk = Chunk::new(std::slice::from_ref(&info), 4);
        chunk.reserve_row(Entity::new(1, 0));
        assert_eq!(chunk.fill_hole(0), None);
        assert_eq!(chunk.row_count(), 0);
    }

    #[test]
    fn relocate_component_copies_bytes() {
        let (_reg, info) = pos_info();
        let mut src = Chunk::new(std::slice::from_ref(&info), 4);
        let mut dst = Chunk::new(std::slice::from_ref(&info), 4);
        let e = Entity::new(1, 0);
        let row = src.reserve_row(e);
        unsafe {
            ptr::write(src.column_ptr_mut(0, row) as *mut Pos, Pos { x: 7.0, y: 8.0 });
        }
        let dst_row = dst.reserve_row(e);
        relocate_component(&src, 0, row, &mut dst, 0, dst_row);
        let got = unsafe { &*(dst.column_ptr(0, dst_row) as *const Pos) };
        assert_eq!(got, &Pos { x: 7.0, y: 8.0 });
    }

    #[test]
    fn zero_sized_components_take_no_space() {
        #[derive(Debug, Clone, Default)]
        struct Marker;

        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Marker>("marker");
        let info = reg.get_info(id).unwrap().clone();
        let mut chunk = Chunk::new(std::slice::from_ref(&info), 8);
        let row = chunk.reserve_row(Entity::new(1, 0));
        // ZST pointers are dangling but aligned; no allocation backs them.
        assert_eq!(chunk.column_ptr(0, row) as usize, std::mem::align_of::<Marker>());
    }
}
