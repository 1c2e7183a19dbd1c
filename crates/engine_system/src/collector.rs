//! Callbacks invoked while a tick executes.

use engine_component::{AnyValue, ComponentTypeId, Entity};

/// Receives one notification per change made during a tick.
///
/// Every method has a no-op default, so a collector only overrides the
/// notifications it cares about. Callbacks run on the thread that executes
/// the tick, while the engine is mid-tick; they must not call back into the
/// engine.
pub trait ExecutionCollector {
    /// A component was attached to an entity.
    fn on_component_init(&mut self, _entity: Entity, _type_id: ComponentTypeId, _value: &dyn AnyValue) {}

    /// A component's value was replaced.
    fn on_component_update(&mut self, _entity: Entity, _type_id: ComponentTypeId, _value: &dyn AnyValue) {}

    /// A component was detached; `value` is the last value it held.
    fn on_component_remove(&mut self, _entity: Entity, _type_id: ComponentTypeId, _value: &dyn AnyValue) {}

    /// An entity was created.
    fn on_entity_created(&mut self, _entity: Entity) {}

    /// An entity was destroyed.
    fn on_entity_destroyed(&mut self, _entity: Entity) {}
}

/// Discards every notification.
impl ExecutionCollector for () {}
