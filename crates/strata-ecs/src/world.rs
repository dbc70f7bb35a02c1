//! The [`World`] is the top-level container for the storage engine. It owns
//! the entity allocator, the component registry, the archetype directory,
//! and the entity-to-location index, and it implements the migration
//! protocol that moves an entity's row between archetypes when its component
//! set changes.

use std::collections::HashMap;

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::{ComponentRegistry, ComponentTypeId, ComponentVtable};
use crate::entity::{Entity, EntityAllocator};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Entity location
// ---------------------------------------------------------------------------

/// Where an entity's component row lives. This map entry is the single
/// source of truth for row coordinates; an entity with zero components has
/// no location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    /// Owning archetype.
    pub archetype: ArchetypeId,
    /// Chunk index within the archetype.
    pub chunk: usize,
    /// Row index within the chunk.
    pub row: usize,
}

// ---------------------------------------------------------------------------
// VtableRegistry -- maps ComponentTypeId to its ComponentVtable
// ---------------------------------------------------------------------------

/// Stores vtables for registered component types, indexed by ComponentTypeId.
#[derive(Debug, Default)]
struct VtableRegistry {
    vtables: Vec<ComponentVtable>,
}

impl VtableRegistry {
    fn new() -> Self {
        Self {
            vtables: Vec::new(),
        }
    }

    fn register<T: Default + 'static>(&mut self, id: ComponentTypeId) {
        let idx = id.0 as usize;
        if idx >= self.vtables.len() {
            self.vtables.resize(idx + 1, ComponentVtable::new::<()>());
        }
        self.vtables[idx] = ComponentVtable::new::<T>();
    }

    fn get(&self, id: ComponentTypeId) -> &ComponentVtable {
        &self.vtables[id.0 as usize]
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level storage engine container.
///
/// All mutation is synchronous and single-owner: structural changes take
/// `&mut self`, so the borrow checker rules out structural mutation while an
/// iteration borrow is live.
pub struct World {
    /// Entity identity registry.
    pub(crate) allocator: EntityAllocator,
    /// Component type registry.
    pub(crate) registry: ComponentRegistry,
    /// Vtable registry for construct/destroy fns.
    vtable_registry: VtableRegistry,
    /// All archetypes, indexed by `ArchetypeId.0`. Archetypes are cached for
    /// the lifetime of the world and never destroyed.
    pub(crate) archetypes: Vec<Archetype>,
    /// Maps a sorted set of component type IDs to its archetype.
    archetype_index: HashMap<Vec<ComponentTypeId>, ArchetypeId>,
    /// Maps entity -> (archetype, chunk, row).
    locations: HashMap<Entity, EntityLocation>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.allocator.alive_count())
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}

/// Mutably borrow two distinct archetypes at once (migration source and
/// destination).
fn archetype_pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    let (ai, bi) = (a.0 as usize, b.0 as usize);
    assert_ne!(ai, bi, "migration source and destination must differ");
    if ai < bi {
        let (left, right) = archetypes.split_at_mut(bi);
        (&mut left[ai], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(ai);
        (&mut right[0], &mut left[bi])
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            vtable_registry: VtableRegistry::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type under `name`.
    ///
    /// Registration is idempotent per Rust type and must happen before the
    /// type is used with any storage operation.
    pub fn register_component<T>(&mut self, name: &str) -> ComponentTypeId
    where
        T: Default + Send + Sync + 'static,
    {
        let id = self.registry.register::<T>(name);
        self.vtable_registry.register::<T>(id);
        id
    }

    // -- archetype directory ------------------------------------------------

    /// Find or create the unique archetype for a sorted, deduplicated set of
    /// component types. Newly created archetypes allocate their first chunk
    /// eagerly.
    fn get_or_create_archetype(&mut self, type_ids: &[ComponentTypeId]) -> ArchetypeId {
        assert!(
            !type_ids.is_empty(),
            "the empty type set is not a storage target"
        );
        if let Some(&id) = self.archetype_index.get(type_ids) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let infos: Vec<_> = type_ids
            .iter()
            .map(|tid| {
                self.registry
                    .get_info(*tid)
                    .expect("component type not registered")
                    .clone()
            })
            .collect();
        let vtables: Vec<_> = type_ids
            .iter()
            .map(|tid| self.vtable_registry.get(*tid).clone())
            .collect();
        let archetype = Archetype::new(id, type_ids.to_vec(), infos, vtables);
        tracing::debug!(
            archetype = id.0,
            types = type_ids.len(),
            rows_per_chunk = archetype.rows_per_chunk(),
            "created archetype"
        );
        self.archetypes.push(archetype);
        self.archetype_index.insert(type_ids.to_vec(), id);
        id
    }

    /// The archetype currently holding `entity`, or `None` if the entity has
    /// zero components (including stale handles).
    pub fn get_archetype(&self, entity: Entity) -> Option<&Archetype> {
        let loc = self.locations.get(&entity)?;
        Some(&self.archetypes[loc.archetype.0 as usize])
    }

    /// Iterate all archetypes, for tooling and profilers.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Where `entity`'s row currently lives, if it has any components.
    pub fn location_of(&self, entity: Entity) -> Option<EntityLocation> {
        self.locations.get(&entity).copied()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create a new entity with no components. Never fails.
    pub fn spawn_entity(&mut self) -> Entity {
        self.allocator.allocate()
    }

    /// Destroy an entity: drop its component row (if any), compact the
    /// vacated chunk, and recycle the handle.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::EntityNotRegistered(entity));
        }
        if let Some(loc) = self.locations.remove(&entity) {
            let archetype = &mut self.archetypes[loc.archetype.0 as usize];
            unsafe {
                archetype.drop_row_values(loc.chunk, loc.row);
            }
            let moved = archetype.release_row(loc.chunk, loc.row);
            archetype.remove_from_entity_list(entity);
            self.patch_moved_location(moved, loc);
        }
        self.allocator.deallocate(entity);
        Ok(())
    }

    /// Whether `entity` is a live handle.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities (with or without components).
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Total number of archetypes created so far.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // -- migration engine ---------------------------------------------------

    /// Add a component to an entity, migrating its row to the archetype for
    /// the enlarged type set.
    ///
    /// If the entity already has the component this is an idempotent no-op:
    /// the existing value is returned and `value` is dropped.
    pub fn add_component<T: 'static>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<&mut T, EcsError> {
        let type_id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent(std::any::type_name::<T>().to_owned()))?;
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::EntityNotRegistered(entity));
        }

        if self.has_component_id(entity, type_id) {
            let loc = self.locations[&entity];
            let archetype = &mut self.archetypes[loc.archetype.0 as usize];
            let ptr = unsafe { archetype.get_component_raw_mut(loc.chunk, loc.row, type_id) }
                .expect("location index out of sync with storage");
            return Ok(unsafe { &mut *(ptr as *mut T) });
        }

        let ptr = self.add_component_raw(entity, type_id, false)?;
        unsafe {
            std::ptr::write(ptr as *mut T, value);
            Ok(&mut *(ptr as *mut T))
        }
    }

    /// Type-erased component add. Returns a pointer to the component's byte
    /// range in its new row.
    ///
    /// If `instantiate` is true the component is default-constructed via its
    /// vtable; otherwise the slot is uninitialized and the caller must write
    /// a valid value through the returned pointer before any other operation
    /// touches the row. Adding a component the entity already has is an
    /// idempotent no-op returning the existing slot.
    pub fn add_component_raw(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        instantiate: bool,
    ) -> Result<*mut u8, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::EntityNotRegistered(entity));
        }
        if self.registry.get_info(type_id).is_none() {
            return Err(EcsError::UnknownComponent(format!("{type_id:?}")));
        }

        let old_loc = self.locations.get(&entity).copied();

        if let Some(loc) = old_loc {
            if self.archetypes[loc.archetype.0 as usize].has_component(type_id) {
                let archetype = &mut self.archetypes[loc.archetype.0 as usize];
                let ptr = unsafe { archetype.get_component_raw_mut(loc.chunk, loc.row, type_id) }
                    .expect("location index out of sync with storage");
                return Ok(ptr);
            }
        }

        // New type set = old set (if any) plus the added type, re-sorted.
        let mut new_types: Vec<ComponentTypeId> = match old_loc {
            Some(loc) => self.archetypes[loc.archetype.0 as usize]
                .component_types()
                .to_vec(),
            None => Vec::new(),
        };
        new_types.push(type_id);
        new_types.sort();

        let new_arch_id = self.get_or_create_archetype(&new_types);

        let (dst_chunk, dst_row) = match old_loc {
            None => {
                // First component: no relocation, just claim a row.
                let archetype = &mut self.archetypes[new_arch_id.0 as usize];
                let (chunk, row) = archetype.reserve_row(entity);
                archetype.push_entity(entity);
                (chunk, row)
            }
            Some(loc) => {
                let (old_arch, new_arch) =
                    archetype_pair_mut(&mut self.archetypes, loc.archetype, new_arch_id);
                let (dst_chunk, dst_row) = new_arch.reserve_row(entity);
                unsafe {
                    old_arch.relocate_row_to(loc.chunk, loc.row, new_arch, dst_chunk, dst_row);
                }
                let moved = old_arch.release_row(loc.chunk, loc.row);
                old_arch.remove_from_entity_list(entity);
                new_arch.push_entity(entity);
                self.patch_moved_location(moved, loc);
                (dst_chunk, dst_row)
            }
        };

        self.locations.insert(
            entity,
            EntityLocation {
                archetype: new_arch_id,
                chunk: dst_chunk,
                row: dst_row,
            },
        );

        let archetype = &mut self.archetypes[new_arch_id.0 as usize];
        if instantiate {
            unsafe {
                archetype.construct_in_place(dst_chunk, dst_row, type_id);
            }
        }
        let ptr = unsafe { archetype.get_component_raw_mut(dst_chunk, dst_row, type_id) }
            .expect("freshly reserved row must be addressable");
        Ok(ptr)
    }

    /// Remove a component from an entity, migrating its row to the archetype
    /// for the reduced type set. Removing a component the entity does not
    /// have is a no-op.
    pub fn remove_component<T: 'static>(&mut self, entity: Entity) -> Result<(), EcsError> {
        let type_id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent(std::any::type_name::<T>().to_owned()))?;
        self.remove_component_raw(entity, type_id)
    }

    /// Type-erased component removal. The removed value is destructed in
    /// place via its vtable before the row is compacted.
    pub fn remove_component_raw(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::EntityNotRegistered(entity));
        }
        let Some(loc) = self.locations.get(&entity).copied() else {
            return Ok(()); // No components at all.
        };
        if !self.archetypes[loc.archetype.0 as usize].has_component(type_id) {
            return Ok(()); // Nothing to remove.
        }

        let new_types: Vec<ComponentTypeId> = self.archetypes[loc.archetype.0 as usize]
            .component_types()
            .iter()
            .copied()
            .filter(|t| *t != type_id)
            .collect();

        if new_types.is_empty() {
            // Last component: no destination archetype. Destruct, compact,
            // clear the location. The entity stays alive.
            let archetype = &mut self.archetypes[loc.archetype.0 as usize];
            unsafe {
                archetype.drop_component_in_place(loc.chunk, loc.row, type_id);
            }
            let moved = archetype.release_row(loc.chunk, loc.row);
            archetype.remove_from_entity_list(entity);
            self.locations.remove(&entity);
            self.patch_moved_location(moved, loc);
            return Ok(());
        }

        let new_arch_id = self.get_or_create_archetype(&new_types);
        let (old_arch, new_arch) =
            archetype_pair_mut(&mut self.archetypes, loc.archetype, new_arch_id);
        let (dst_chunk, dst_row) = new_arch.reserve_row(entity);
        unsafe {
            old_arch.drop_component_in_place(loc.chunk, loc.row, type_id);
            old_arch.relocate_row_to(loc.chunk, loc.row, new_arch, dst_chunk, dst_row);
        }
        let moved = old_arch.release_row(loc.chunk, loc.row);
        old_arch.remove_from_entity_list(entity);
        new_arch.push_entity(entity);
        self.patch_moved_location(moved, loc);

        self.locations.insert(
            entity,
            EntityLocation {
                archetype: new_arch_id,
                chunk: dst_chunk,
                row: dst_row,
            },
        );
        Ok(())
    }

    /// After hole-filling, the entity that occupied the source chunk's last
    /// row now lives at the vacated coordinates.
    fn patch_moved_location(&mut self, moved: Option<Entity>, vacated: EntityLocation) {
        if let Some(moved_entity) = moved {
            if let Some(loc) = self.locations.get_mut(&moved_entity) {
                loc.row = vacated.row;
            }
        }
    }

    // -- component access ---------------------------------------------------

    /// Get an immutable reference to a component on an entity.
    pub fn get_component<T: 'static>(&self, entity: Entity) -> Option<&T> {
        let loc = self.locations.get(&entity)?;
        let type_id = self.registry.lookup::<T>()?;
        unsafe {
            self.archetypes[loc.archetype.0 as usize].get_component::<T>(loc.chunk, loc.row, type_id)
        }
    }

    /// Get a mutable reference to a component on an entity.
    pub fn get_component_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        let loc = *self.locations.get(&entity)?;
        let type_id = self.registry.lookup::<T>()?;
        unsafe {
            self.archetypes[loc.archetype.0 as usize]
                .get_component_mut::<T>(loc.chunk, loc.row, type_id)
        }
    }

    /// Type-erased component access: raw pointer to the component's byte
    /// range, or `None` if the entity does not have it.
    pub fn get_component_raw(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Option<*mut u8> {
        let loc = *self.locations.get(&entity)?;
        unsafe {
            self.archetypes[loc.archetype.0 as usize].get_component_raw_mut(
                loc.chunk,
                loc.row,
                type_id,
            )
        }
    }

    /// Whether an entity has a given component type.
    pub fn has_component<T: 'static>(&self, entity: Entity) -> bool {
        match self.registry.lookup::<T>() {
            Some(type_id) => self.has_component_id(entity, type_id),
            None => false,
        }
    }

    /// Type-erased form of [`has_component`](Self::has_component).
    pub fn has_component_id(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        match self.locations.get(&entity) {
            Some(loc) => self.archetypes[loc.archetype.0 as usize].has_component(type_id),
            None => false,
        }
    }

    // -- query helpers (used by query.rs) -----------------------------------

    /// All archetype IDs whose component set is a superset of `required`.
    /// Linear scan; no acceleration index.
    pub(crate) fn matching_archetypes(&self, required: &[ComponentTypeId]) -> Vec<ArchetypeId> {
        self.archetypes
            .iter()
            .filter(|arch| required.iter().all(|req| arch.has_component(*req)))
            .map(|arch| arch.id())
            .collect()
    }

    /// Look up the `ComponentTypeId` for a Rust type.
    pub(crate) fn component_type_id<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.registry.lookup::<T>()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
