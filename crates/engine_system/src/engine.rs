//! The execution-engine interface consumed by the tick scheduler.

use std::fmt;

use engine_component::{AnyValue, ComponentTypeId, Entity};

use crate::collector::ExecutionCollector;
use crate::options::ExecutionOptions;

/// Opaque handle to one registry (an isolated set of entities and components).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(pub u64);

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registry({})", self.0)
    }
}

/// Errors reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The registry does not exist (never created, or destroyed).
    #[error("{0} not found")]
    RegistryNotFound(RegistryId),

    /// Another live registry already uses this name.
    #[error("registry name '{0}' is already in use")]
    RegistryExists(String),

    /// The entity does not exist in the registry.
    #[error("{0} not found")]
    EntityNotFound(Entity),

    /// The entity has no component of this type.
    #[error("{entity} has no {type_id}")]
    ComponentNotFound {
        /// Entity addressed.
        entity: Entity,
        /// Component type addressed.
        type_id: ComponentTypeId,
    },

    /// The entity already has a component of this type.
    #[error("{entity} already has {type_id}")]
    ComponentExists {
        /// Entity addressed.
        entity: Entity,
        /// Component type addressed.
        type_id: ComponentTypeId,
    },

    /// A system returned an error.
    #[error("system '{system}' failed: {message}")]
    System {
        /// Name the system was registered under.
        system: String,
        /// Message returned by the system.
        message: String,
    },
}

/// Component storage and system execution, driven by the scheduler.
///
/// Implementations must be callable from several threads: ticks are executed
/// on the scheduler's background thread while callers read components back
/// when flushing events.
pub trait ExecutionEngine: Send + Sync {
    /// Create a new, empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::RegistryExists`] if the name is taken.
    fn create_registry(&self, name: &str) -> Result<RegistryId, ExecutionError>;

    /// Destroy a registry and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::RegistryNotFound`] for unknown registries.
    fn destroy_registry(&self, registry: RegistryId) -> Result<(), ExecutionError>;

    /// Create an entity with no components.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::RegistryNotFound`] for unknown registries.
    fn create_entity(&self, registry: RegistryId) -> Result<Entity, ExecutionError>;

    /// Returns a copy of the current value of a component, if present.
    fn get_component(
        &self,
        registry: RegistryId,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Option<Box<dyn AnyValue>>;

    /// Apply `options` and run every system once.
    ///
    /// `collector` is invoked synchronously, on the calling thread, once per
    /// change.
    ///
    /// # Errors
    ///
    /// Returns the first error hit; changes applied before it are kept.
    fn execute_one_tick(
        &self,
        registry: RegistryId,
        options: &ExecutionOptions<'_>,
        collector: &mut dyn ExecutionCollector,
    ) -> Result<(), ExecutionError>;
}
