//! Per-tick execution context provided to system functions.

use engine_component::{Action, Component, Entity};

use crate::collector::ExecutionCollector;
use crate::engine::ExecutionError;
use crate::options::{ActionRef, ComponentKey};
use crate::world::Storage;

/// Context provided to a system function on each tick.
///
/// Gives the system the actions pushed for this tick and read/write access to
/// the registry's components. Every write is reported to the tick's
/// [`ExecutionCollector`], exactly like the writes requested by the batch.
pub struct SystemContext<'a> {
    storage: &'a Storage,
    actions: &'a [ActionRef<'a>],
    collector: &'a mut dyn ExecutionCollector,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        storage: &'a Storage,
        actions: &'a [ActionRef<'a>],
        collector: &'a mut dyn ExecutionCollector,
    ) -> Self {
        Self {
            storage,
            actions,
            collector,
        }
    }

    /// Actions of type `A` pushed for this tick, in push order.
    pub fn actions<A: Action>(&self) -> impl Iterator<Item = &A> + '_ {
        let type_id = A::action_type_id();
        self.actions
            .iter()
            .filter(move |action| action.type_id == type_id)
            .filter_map(|action| action.value.downcast_ref::<A>())
    }

    /// A copy of `entity`'s `T`, if it has one.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<T> {
        self.storage
            .get(ComponentKey::of::<T>(entity))
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// All entities currently holding a `T`, in ascending order.
    #[must_use]
    pub fn entities_with<T: Component>(&self) -> Vec<Entity> {
        self.storage.entities_with(T::component_type_id())
    }

    /// Write `entity`'s `T`, attaching it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::EntityNotFound`] if the entity does not exist.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), ExecutionError> {
        let key = ComponentKey::of::<T>(entity);
        let replaced = self.storage.upsert(key, Box::new(value.clone()))?;
        if replaced {
            self.collector
                .on_component_update(entity, key.type_id, &value);
        } else {
            self.collector.on_component_init(entity, key.type_id, &value);
        }
        Ok(())
    }
}
