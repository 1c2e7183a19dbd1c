//! In-memory reference engine.
//!
//! [`InMemoryEngine`] keeps one [`Storage`] per registry. Entities live in a
//! concurrent set and components in a concurrent map keyed by
//! `(entity, component type)`, so readers on other threads never wait for a
//! whole tick, only for the shard they touch.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::{debug, trace};

use engine_component::{AnyValue, ComponentTypeId, Entity, EntityAllocator};

use crate::collector::ExecutionCollector;
use crate::context::SystemContext;
use crate::engine::{ExecutionEngine, ExecutionError, RegistryId};
use crate::options::{ComponentKey, ExecutionOptions};

/// Signature of a system function run once per tick.
pub type SystemFn = dyn Fn(&mut SystemContext<'_>) -> Result<(), String> + Send + Sync;

/// Entity and component storage of one registry.
pub(crate) struct Storage {
    pub(crate) name: String,
    allocator: EntityAllocator,
    entities: DashSet<Entity>,
    components: DashMap<ComponentKey, Box<dyn AnyValue>>,
}

impl Storage {
    fn new(name: String) -> Self {
        Self {
            name,
            allocator: EntityAllocator::new(),
            entities: DashSet::new(),
            components: DashMap::new(),
        }
    }

    fn spawn(&self) -> Entity {
        let entity = self.allocator.allocate();
        self.entities.insert(entity);
        entity
    }

    fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    fn ensure_entity(&self, entity: Entity) -> Result<(), ExecutionError> {
        if self.contains(entity) {
            Ok(())
        } else {
            Err(ExecutionError::EntityNotFound(entity))
        }
    }

    pub(crate) fn get(&self, key: ComponentKey) -> Option<Box<dyn AnyValue>> {
        self.components.get(&key).map(|value| value.clone_value())
    }

    /// Attach a component that must not exist yet.
    fn insert_new(&self, key: ComponentKey, value: &dyn AnyValue) -> Result<(), ExecutionError> {
        self.ensure_entity(key.entity)?;
        match self.components.entry(key) {
            Entry::Occupied(_) => Err(ExecutionError::ComponentExists {
                entity: key.entity,
                type_id: key.type_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(value.clone_value());
                Ok(())
            }
        }
    }

    /// Replace a component that must already exist.
    fn replace(&self, key: ComponentKey, value: &dyn AnyValue) -> Result<(), ExecutionError> {
        match self.components.get_mut(&key) {
            Some(mut slot) => {
                *slot = value.clone_value();
                Ok(())
            }
            None => Err(ExecutionError::ComponentNotFound {
                entity: key.entity,
                type_id: key.type_id,
            }),
        }
    }

    /// Write a component whether or not it exists; returns `true` if a value
    /// was replaced.
    pub(crate) fn upsert(
        &self,
        key: ComponentKey,
        value: Box<dyn AnyValue>,
    ) -> Result<bool, ExecutionError> {
        self.ensure_entity(key.entity)?;
        Ok(self.components.insert(key, value).is_some())
    }

    pub(crate) fn take(&self, key: ComponentKey) -> Result<Box<dyn AnyValue>, ExecutionError> {
        self.components
            .remove(&key)
            .map(|(_, value)| value)
            .ok_or(ExecutionError::ComponentNotFound {
                entity: key.entity,
                type_id: key.type_id,
            })
    }

    pub(crate) fn entities_with(&self, type_id: ComponentTypeId) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .components
            .iter()
            .filter(|entry| entry.key().type_id == type_id)
            .map(|entry| entry.key().entity)
            .collect();
        entities.sort_unstable();
        entities
    }

    fn keys_of(&self, entity: Entity) -> Vec<ComponentKey> {
        let mut keys: Vec<ComponentKey> = self
            .components
            .iter()
            .filter(|entry| entry.key().entity == entity)
            .map(|entry| *entry.key())
            .collect();
        keys.sort_unstable();
        keys
    }
}

/// A system registered with the engine.
struct RegisteredSystem {
    name: String,
    run: Box<SystemFn>,
}

/// Reference [`ExecutionEngine`] storing everything in memory.
///
/// Systems are registered before the engine is shared and run in
/// registration order after the batch of each tick has been applied.
pub struct InMemoryEngine {
    registries: DashMap<RegistryId, Arc<Storage>>,
    names: DashMap<String, RegistryId>,
    next_registry: AtomicU64,
    systems: Vec<RegisteredSystem>,
}

impl InMemoryEngine {
    /// Create an engine with no registries and no systems.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registries: DashMap::new(),
            names: DashMap::new(),
            next_registry: AtomicU64::new(1),
            systems: Vec::new(),
        }
    }

    /// Register a system under `name`.
    pub fn register_system<F>(&mut self, name: impl Into<String>, system: F) -> &mut Self
    where
        F: Fn(&mut SystemContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(system = %name, "registered system");
        self.systems.push(RegisteredSystem {
            name,
            run: Box::new(system),
        });
        self
    }

    /// Builder form of [`InMemoryEngine::register_system`].
    #[must_use]
    pub fn with_system<F>(mut self, name: impl Into<String>, system: F) -> Self
    where
        F: Fn(&mut SystemContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.register_system(name, system);
        self
    }

    /// Returns the number of live registries.
    #[must_use]
    pub fn registry_count(&self) -> usize {
        self.registries.len()
    }

    /// Returns the number of live entities in a registry (0 if it is unknown).
    #[must_use]
    pub fn entity_count(&self, registry: RegistryId) -> usize {
        self.registries
            .get(&registry)
            .map_or(0, |storage| storage.entities.len())
    }

    /// Returns `true` if the entity exists in the registry.
    #[must_use]
    pub fn contains_entity(&self, registry: RegistryId, entity: Entity) -> bool {
        self.registries
            .get(&registry)
            .is_some_and(|storage| storage.contains(entity))
    }

    fn storage(&self, registry: RegistryId) -> Result<Arc<Storage>, ExecutionError> {
        self.registries
            .get(&registry)
            .map(|storage| Arc::clone(storage.value()))
            .ok_or(ExecutionError::RegistryNotFound(registry))
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("registries", &self.registries.len())
            .field(
                "systems",
                &self.systems.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ExecutionEngine for InMemoryEngine {
    fn create_registry(&self, name: &str) -> Result<RegistryId, ExecutionError> {
        let id = match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(ExecutionError::RegistryExists(name.to_string())),
            Entry::Vacant(slot) => {
                let id = RegistryId(self.next_registry.fetch_add(1, Ordering::Relaxed));
                slot.insert(id);
                id
            }
        };
        self.registries
            .insert(id, Arc::new(Storage::new(name.to_string())));
        debug!(registry = %id, name, "created registry");
        Ok(id)
    }

    fn destroy_registry(&self, registry: RegistryId) -> Result<(), ExecutionError> {
        let (_, storage) = self
            .registries
            .remove(&registry)
            .ok_or(ExecutionError::RegistryNotFound(registry))?;
        self.names.remove(&storage.name);
        debug!(registry = %registry, name = %storage.name, "destroyed registry");
        Ok(())
    }

    fn create_entity(&self, registry: RegistryId) -> Result<Entity, ExecutionError> {
        Ok(self.storage(registry)?.spawn())
    }

    fn get_component(
        &self,
        registry: RegistryId,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Option<Box<dyn AnyValue>> {
        self.storage(registry)
            .ok()?
            .get(ComponentKey::new(entity, type_id))
    }

    fn execute_one_tick(
        &self,
        registry: RegistryId,
        options: &ExecutionOptions<'_>,
        collector: &mut dyn ExecutionCollector,
    ) -> Result<(), ExecutionError> {
        let storage = self.storage(registry)?;
        trace!(
            registry = %registry,
            creates = options.create_entities.len(),
            adds = options.add_components.len(),
            updates = options.update_components.len(),
            removes = options.remove_components.len(),
            destroys = options.destroy_entities.len(),
            actions = options.actions.len(),
            "executing tick"
        );

        for spawn in &options.create_entities {
            let entity = storage.spawn();
            collector.on_entity_created(entity);
            for initial in &spawn.components {
                storage.insert_new(ComponentKey::new(entity, initial.type_id), initial.value)?;
                collector.on_component_init(entity, initial.type_id, initial.value);
            }
        }

        for add in &options.add_components {
            storage.insert_new(add.key(), add.value)?;
            collector.on_component_init(add.entity, add.type_id, add.value);
        }

        for update in &options.update_components {
            storage.replace(update.key(), update.value)?;
            collector.on_component_update(update.entity, update.type_id, update.value);
        }

        for key in &options.remove_components {
            let old = storage.take(*key)?;
            collector.on_component_remove(key.entity, key.type_id, &*old);
        }

        for &entity in &options.destroy_entities {
            storage.ensure_entity(entity)?;
            for key in storage.keys_of(entity) {
                if let Ok(old) = storage.take(key) {
                    collector.on_component_remove(entity, key.type_id, &*old);
                }
            }
            storage.entities.remove(&entity);
            collector.on_entity_destroyed(entity);
        }

        for system in &self.systems {
            let mut ctx = SystemContext::new(&storage, &options.actions, &mut *collector);
            (system.run)(&mut ctx).map_err(|message| ExecutionError::System {
                system: system.name.clone(),
                message,
            })?;
        }

        Ok(())
    }
}
