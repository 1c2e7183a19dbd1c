//! Deferred entity creation.

use parking_lot::Mutex;
use tracing::{debug, error};

use engine_system::{ExecutionEngine, ExecutionError, RegistryId};

use crate::events::{AsyncCallbacks, AsyncEvent};
use crate::request::RequestId;

/// Buffers `create_entity` requests until the tick thread fulfils them.
#[derive(Debug, Default)]
pub struct EntityManager {
    requests: Mutex<Vec<RequestId>>,
}

impl EntityManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a creation request.
    pub fn request(&self, request_id: RequestId) {
        self.requests.lock().push(request_id);
    }

    /// Number of requests waiting.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.requests.lock().len()
    }

    /// Drop every waiting request.
    pub fn clear(&self) {
        self.requests.lock().clear();
    }

    /// Create one entity per buffered request, in arrival order, and queue an
    /// [`AsyncEvent::EntityCreated`] for each. Returns how many were created.
    ///
    /// # Errors
    ///
    /// Returns the engine's error. The failed request and every request after
    /// it are reported together as one [`AsyncEvent::SystemExecutionError`].
    pub fn drain_and_create(
        &self,
        engine: &dyn ExecutionEngine,
        registry: RegistryId,
        callbacks: &AsyncCallbacks,
    ) -> Result<usize, ExecutionError> {
        let requests = std::mem::take(&mut *self.requests.lock());

        for (created, &request_id) in requests.iter().enumerate() {
            match engine.create_entity(registry) {
                Ok(entity) => {
                    debug!(%entity, request = %request_id, "created requested entity");
                    callbacks.push(AsyncEvent::EntityCreated { entity, request_id });
                }
                Err(err) => {
                    error!(%registry, request = %request_id, error = %err, "entity creation failed");
                    callbacks.push(AsyncEvent::SystemExecutionError {
                        error: err.clone(),
                        request_ids: requests[created..].to_vec(),
                    });
                    return Err(err);
                }
            }
        }
        Ok(requests.len())
    }
}
