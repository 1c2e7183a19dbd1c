//! The caller-facing handle.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use engine_component::Codec;
use engine_system::{ExecutionCollector, ExecutionEngine, ExecutionOptions};

use crate::config::SchedulerConfig;
use crate::error::{AsyncError, AsyncErrorKind};
use crate::events::{AsyncCallbacks, AsyncCollector};
use crate::execution::ExecutionCallbacks;
use crate::request::{RequestId, RequestIdIssuer};
use crate::session::{Session, SessionState};

/// Submits work to an execution engine and hands back what happened.
///
/// Every request returns a [`RequestId`] immediately; its outcome arrives
/// through [`AsyncScheduler::flush_events`]. The handle is `Sync`, so any
/// number of threads may share it. Dropping it disconnects.
pub struct AsyncScheduler {
    engine: Arc<dyn ExecutionEngine>,
    codec: Arc<Codec>,
    config: SchedulerConfig,
    request_ids: RequestIdIssuer,
    async_callbacks: Arc<AsyncCallbacks>,
    execution_callbacks: Arc<ExecutionCallbacks>,
    session: RwLock<Arc<Session>>,
}

impl AsyncScheduler {
    /// Create a disconnected scheduler with the default configuration.
    #[must_use]
    pub fn new(engine: Arc<dyn ExecutionEngine>, codec: Codec) -> Self {
        Self::with_config(engine, codec, SchedulerConfig::default())
    }

    /// Create a disconnected scheduler.
    #[must_use]
    pub fn with_config(engine: Arc<dyn ExecutionEngine>, codec: Codec, config: SchedulerConfig) -> Self {
        let codec = Arc::new(codec);
        let async_callbacks = Arc::new(AsyncCallbacks::new());
        let execution_callbacks = Arc::new(ExecutionCallbacks::new());
        let session = Session::new(
            Arc::clone(&engine),
            Arc::clone(&codec),
            Arc::clone(&async_callbacks),
            Arc::clone(&execution_callbacks),
            &config,
        );
        Self {
            engine,
            codec,
            config,
            request_ids: RequestIdIssuer::new(),
            async_callbacks,
            execution_callbacks,
            session: RwLock::new(Arc::new(session)),
        }
    }

    fn session(&self) -> Arc<Session> {
        Arc::clone(&*self.session.read())
    }

    /// Open a new session described by `connection_string`.
    ///
    /// The previous session, if it has stopped, is disconnected and replaced.
    /// While it is still running the request is denied.
    pub fn connect(&self, connection_string: &str) -> RequestId {
        let request_id = self.request_ids.next_id();

        let mut active = self.session.write();
        if active.state() != SessionState::Disconnected {
            debug!(request = %request_id, "already connected");
            self.async_callbacks.push_error(AsyncError::single(
                AsyncErrorKind::PermissionDenied,
                request_id,
            ));
            return request_id;
        }

        active.disconnect();
        let session = Arc::new(Session::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.codec),
            Arc::clone(&self.async_callbacks),
            Arc::clone(&self.execution_callbacks),
            &self.config,
        ));
        session.connect(request_id, connection_string);
        *active = session;
        request_id
    }

    /// Disconnect the active session. Pending work and unflushed events are
    /// dropped.
    pub fn disconnect(&self) {
        self.session().disconnect();
    }

    /// Ask for a new entity; the outcome is an entity-created event.
    pub fn create_entity(&self) -> RequestId {
        let request_id = self.request_ids.next_id();
        self.session().create_entity_request(request_id);
        request_id
    }

    /// Queue a batch for the next tick that has not begun validation.
    pub fn enqueue_execution_options(&self, options: &ExecutionOptions<'_>) -> RequestId {
        let request_id = self.request_ids.next_id();
        self.session()
            .enqueue_execution_options(request_id, options);
        request_id
    }

    /// Index of the next tick of the active session.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.session().current_tick()
    }

    /// State of the active session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session().state()
    }

    /// Deliver buffered outcomes: asynchronous events first, then execution
    /// notifications. A missing collector discards its events.
    ///
    /// While disconnected, a connect refused for its host is reported here
    /// once as [`AsyncErrorKind::PermissionDenied`].
    pub fn flush_events(
        &self,
        execution: Option<&mut dyn ExecutionCollector>,
        asynchronous: Option<&mut dyn AsyncCollector>,
    ) {
        let session = self.session();
        session.announce_rejection();
        self.async_callbacks.invoke(asynchronous);

        match session.registry() {
            Some(registry) => {
                self.execution_callbacks
                    .invoke(execution, &*self.engine, registry, &self.codec);
            }
            None => self.execution_callbacks.clear(),
        }
    }
}

impl Drop for AsyncScheduler {
    fn drop(&mut self) {
        self.session.get_mut().disconnect();
    }
}

impl std::fmt::Debug for AsyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncScheduler")
            .field("config", &self.config)
            .field("issued", &self.request_ids.issued())
            .field("session", &*self.session.read())
            .finish_non_exhaustive()
    }
}
