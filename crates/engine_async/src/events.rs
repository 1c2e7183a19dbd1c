//! Buffered asynchronous outcomes.
//!
//! Errors, engine failures and created entities are queued here as they
//! happen and delivered to the caller's [`AsyncCollector`] when it flushes.

use parking_lot::Mutex;
use tracing::trace;

use engine_component::Entity;
use engine_system::ExecutionError;

use crate::error::{AsyncError, AsyncErrorKind};
use crate::request::RequestId;

/// One queued outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncEvent {
    /// A request failed.
    Error(AsyncError),
    /// The engine failed while executing a tick.
    SystemExecutionError {
        /// The engine's error.
        error: ExecutionError,
        /// Requests whose work was part of the failed tick.
        request_ids: Vec<RequestId>,
    },
    /// An entity requested with `create_entity` now exists.
    EntityCreated {
        /// The new entity.
        entity: Entity,
        /// The request that asked for it.
        request_id: RequestId,
    },
}

impl AsyncEvent {
    /// The error kind carried by the event, if it reports a failure.
    #[must_use]
    pub fn error_kind(&self) -> Option<AsyncErrorKind> {
        match self {
            Self::Error(error) => Some(error.kind),
            Self::SystemExecutionError { .. } => Some(AsyncErrorKind::SystemExecutionError),
            Self::EntityCreated { .. } => None,
        }
    }
}

/// Receives flushed asynchronous outcomes.
///
/// Every method has a no-op default; events for methods a collector does not
/// override are dropped.
pub trait AsyncCollector {
    /// A request failed.
    fn on_async_error(&mut self, _error: &AsyncError) {}

    /// The engine failed while executing a tick.
    fn on_system_execution_error(&mut self, _error: &ExecutionError, _request_ids: &[RequestId]) {}

    /// A requested entity was created.
    fn on_entity_created(&mut self, _entity: Entity, _request_id: RequestId) {}
}

/// Discards every event.
impl AsyncCollector for () {}

/// Queue of [`AsyncEvent`]s shared between the tick thread and callers.
#[derive(Debug, Default)]
pub struct AsyncCallbacks {
    events: Mutex<Vec<AsyncEvent>>,
}

impl AsyncCallbacks {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event.
    pub fn push(&self, event: AsyncEvent) {
        trace!(?event, "queued async event");
        self.events.lock().push(event);
    }

    /// Queue an error.
    pub fn push_error(&self, error: AsyncError) {
        self.push(AsyncEvent::Error(error));
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop every queued event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Move every queued event out.
    pub fn drain(&self) -> Vec<AsyncEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Deliver every queued event to `collector` in queue order, or discard
    /// them all if there is none. Returns the number delivered.
    pub fn invoke(&self, collector: Option<&mut dyn AsyncCollector>) -> usize {
        let events = self.drain();
        let Some(collector) = collector else {
            trace!(discarded = events.len(), "no async collector, dropping events");
            return 0;
        };

        let delivered = events.len();
        for event in events {
            match event {
                AsyncEvent::Error(error) => collector.on_async_error(&error),
                AsyncEvent::SystemExecutionError { error, request_ids } => {
                    collector.on_system_execution_error(&error, &request_ids);
                }
                AsyncEvent::EntityCreated { entity, request_id } => {
                    collector.on_entity_created(entity, request_id);
                }
            }
        }
        delivered
    }
}
