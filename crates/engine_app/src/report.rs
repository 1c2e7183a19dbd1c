//! Collectors that log what the scheduler reports.

use tracing::{debug, error, info, warn};

use engine_async::{AsyncCollector, AsyncError, RequestId};
use engine_component::{AnyValue, ComponentTypeId, Entity};
use engine_system::{ExecutionCollector, ExecutionError};

/// Logs asynchronous outcomes and keeps the errors.
#[derive(Debug, Default)]
pub struct EventLog {
    pub errors: Vec<AsyncError>,
    pub created: usize,
}

impl AsyncCollector for EventLog {
    fn on_async_error(&mut self, err: &AsyncError) {
        warn!(kind = %err.kind, requests = ?err.request_ids, "request failed");
        self.errors.push(err.clone());
    }

    fn on_system_execution_error(&mut self, err: &ExecutionError, request_ids: &[RequestId]) {
        error!(error = %err, requests = ?request_ids, "tick failed");
    }

    fn on_entity_created(&mut self, entity: Entity, request_id: RequestId) {
        info!(%entity, request = %request_id, "entity created");
        self.created += 1;
    }
}

/// Logs component changes and counts them.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    pub inits: usize,
    pub updates: usize,
    pub removes: usize,
}

impl ExecutionCollector for ExecutionLog {
    fn on_component_init(&mut self, entity: Entity, type_id: ComponentTypeId, value: &dyn AnyValue) {
        debug!(%entity, component = %type_id, ?value, "component init");
        self.inits += 1;
    }

    fn on_component_update(&mut self, entity: Entity, type_id: ComponentTypeId, value: &dyn AnyValue) {
        debug!(%entity, component = %type_id, ?value, "component update");
        self.updates += 1;
    }

    fn on_component_remove(&mut self, entity: Entity, type_id: ComponentTypeId, value: &dyn AnyValue) {
        debug!(%entity, component = %type_id, ?value, "component remove");
        self.removes += 1;
    }

    fn on_entity_created(&mut self, entity: Entity) {
        info!(%entity, "entity spawned by batch");
    }

    fn on_entity_destroyed(&mut self, entity: Entity) {
        info!(%entity, "entity destroyed");
    }
}
