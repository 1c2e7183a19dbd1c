//! Connection lifecycle and the background tick thread.
//!
//! A [`Session`] is single-use: it connects at most once, runs one tick
//! thread while connected and tears everything down on
//! [`Session::disconnect`]. Callers only ever touch its queues; the engine is
//! driven from the tick thread alone.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use engine_component::Codec;
use engine_system::{ExecutionEngine, ExecutionOptions, NativeOptions, RegistryId};

use crate::config::SchedulerConfig;
use crate::connection::ConnectionString;
use crate::entity::EntityManager;
use crate::error::{AsyncError, AsyncErrorKind};
use crate::events::{AsyncCallbacks, AsyncEvent};
use crate::execution::{ExecutionCallbacks, ExecutionRecorder};
use crate::request::RequestId;
use crate::serialized::SerializedOptions;
use crate::tick::{TickManager, ValidatedOptions};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Not connected, either never or no longer.
    Disconnected = 0,
    /// A connect call is creating the registry.
    Connecting = 1,
    /// The tick thread is running.
    Connected = 2,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// State shared between callers and the tick thread.
struct Shared {
    state: AtomicU8,
    running: AtomicBool,
    engine: Arc<dyn ExecutionEngine>,
    codec: Arc<Codec>,
    ticks: TickManager,
    entities: EntityManager,
    async_callbacks: Arc<AsyncCallbacks>,
    execution_callbacks: Arc<ExecutionCallbacks>,
    sleep_lock: Mutex<()>,
    wakeup: Condvar,
}

impl Shared {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the running flag and wake the tick thread if it is sleeping.
    fn stop(&self) {
        let _guard = self.sleep_lock.lock();
        self.running.store(false, Ordering::Release);
        self.wakeup.notify_all();
    }

    /// Sleep for `duration` unless stopped first. Returns whether the loop
    /// should keep going.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.sleep_lock.lock();
        while self.is_running() {
            if self.wakeup.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_running()
    }

    fn run(&self, registry: RegistryId, tick_rate: Duration) {
        info!(%registry, tick_rate_ms = tick_rate.as_millis() as u64, "tick loop started");
        let mut last_execution = Duration::ZERO;

        while self.is_running() {
            let validation = self.ticks.validate_pending();
            let tick = self.ticks.current_tick();

            if last_execution > tick_rate {
                warn!(
                    tick,
                    elapsed_ms = last_execution.as_millis() as u64,
                    budget_ms = tick_rate.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
            if !self.sleep(tick_rate.saturating_sub(last_execution)) {
                break;
            }

            if let Err(err) = validation {
                error!(tick, error = %err, "validation failed, stopping tick loop");
                self.async_callbacks.push_error(err);
                break;
            }

            let start = Instant::now();
            let batch = self.ticks.consume_validated().unwrap_or_default();
            if self.run_tick(registry, tick, batch).is_break() {
                break;
            }
            last_execution = start.elapsed();
        }

        self.running.store(false, Ordering::Release);
        self.set_state(SessionState::Disconnected);
        info!(%registry, tick = self.ticks.current_tick(), "tick loop stopped");
    }

    fn run_tick(&self, registry: RegistryId, tick: u64, batch: ValidatedOptions) -> ControlFlow<()> {
        let native = batch
            .options
            .to_native(&self.codec)
            .unwrap_or_else(|err| {
                warn!(tick, error = %err, "cannot restore batch, executing without it");
                self.async_callbacks.push_error(AsyncError::new(
                    AsyncErrorKind::SerializationFailure,
                    batch.request_ids.iter().copied(),
                ));
                NativeOptions::default()
            });

        if self
            .entities
            .drain_and_create(&*self.engine, registry, &self.async_callbacks)
            .is_err()
        {
            return ControlFlow::Break(());
        }

        let mut recorder = ExecutionRecorder::new(&self.codec);
        let result = self
            .engine
            .execute_one_tick(registry, &native.as_options(), &mut recorder);
        debug!(tick, requests = batch.request_ids.len(), notifications = recorder.len(), "tick executed");
        self.execution_callbacks.commit(recorder);

        if let Err(err) = result {
            error!(tick, error = %err, "engine failed, stopping tick loop");
            self.async_callbacks.push(AsyncEvent::SystemExecutionError {
                error: err,
                request_ids: batch.request_ids,
            });
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// One connection to an execution engine.
pub struct Session {
    shared: Arc<Shared>,
    accepted_host: String,
    spent: AtomicBool,
    rejected: Mutex<Option<RequestId>>,
    registry: Mutex<Option<RegistryId>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a disconnected session. Queued outcomes go to the given
    /// buffers.
    #[must_use]
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        codec: Arc<Codec>,
        async_callbacks: Arc<AsyncCallbacks>,
        execution_callbacks: Arc<ExecutionCallbacks>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(SessionState::Disconnected as u8),
                running: AtomicBool::new(false),
                engine,
                codec,
                ticks: TickManager::new(),
                entities: EntityManager::new(),
                async_callbacks,
                execution_callbacks,
                sleep_lock: Mutex::new(()),
                wakeup: Condvar::new(),
            }),
            accepted_host: config.accepted_host.clone(),
            spent: AtomicBool::new(false),
            rejected: Mutex::new(None),
            registry: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Returns `true` while the tick thread is running.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// The session's registry, from a successful connect until disconnect.
    #[must_use]
    pub fn registry(&self) -> Option<RegistryId> {
        *self.registry.lock()
    }

    /// Index of the next tick to execute; 0 before the first connect.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.shared.ticks.current_tick()
    }

    /// Connect according to `connection_string`.
    ///
    /// A host other than the accepted one queues nothing; the first such
    /// request is remembered and reported by [`Session::announce_rejection`].
    /// A bad option queues [`AsyncErrorKind::InvalidConnectionString`]; a
    /// session that is connected or was connected before queues
    /// [`AsyncErrorKind::PermissionDenied`].
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn the tick thread.
    pub fn connect(&self, request_id: RequestId, connection_string: &str) {
        let connection = ConnectionString::parse(connection_string);
        if connection.host() != self.accepted_host {
            debug!(request = %request_id, host = connection.host(), "ignoring connection to unknown host");
            let mut rejected = self.rejected.lock();
            if rejected.is_none() {
                *rejected = Some(request_id);
            }
            return;
        }

        if self.spent.load(Ordering::Acquire) {
            warn!(request = %request_id, "session already used");
            self.deny(request_id);
            return;
        }

        let config = match connection.session_config() {
            Ok(config) => config,
            Err(err) => {
                warn!(request = %request_id, error = %err, "invalid connection string");
                self.shared.async_callbacks.push_error(AsyncError::single(
                    AsyncErrorKind::InvalidConnectionString,
                    request_id,
                ));
                return;
            }
        };

        if self
            .shared
            .state
            .compare_exchange(
                SessionState::Disconnected as u8,
                SessionState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!(request = %request_id, state = ?self.state(), "session is not disconnected");
            self.deny(request_id);
            return;
        }

        let name = config
            .registry_name
            .unwrap_or_else(|| format!("session-{}", Uuid::new_v4()));
        let registry = match self.shared.engine.create_registry(&name) {
            Ok(registry) => registry,
            Err(err) => {
                error!(request = %request_id, error = %err, "cannot create registry");
                self.shared.async_callbacks.push(AsyncEvent::SystemExecutionError {
                    error: err,
                    request_ids: vec![request_id],
                });
                self.shared.set_state(SessionState::Disconnected);
                return;
            }
        };

        self.spent.store(true, Ordering::Release);
        *self.rejected.lock() = None;
        *self.registry.lock() = Some(registry);
        self.shared.running.store(true, Ordering::Release);
        self.shared.set_state(SessionState::Connected);

        let shared = Arc::clone(&self.shared);
        let tick_rate = config.tick_rate;
        let handle = thread::Builder::new()
            .name("engine-tick".to_string())
            .spawn(move || shared.run(registry, tick_rate))
            .expect("failed to spawn tick thread");
        *self.thread.lock() = Some(handle);

        info!(request = %request_id, %registry, name = %name, "session connected");
    }

    /// Queue one [`AsyncErrorKind::PermissionDenied`] for a connect that was
    /// refused for its host and not reported yet. Does nothing while
    /// connected.
    pub fn announce_rejection(&self) {
        if self.state() != SessionState::Disconnected {
            return;
        }
        let rejected = self.rejected.lock().take();
        if let Some(request_id) = rejected {
            debug!(request = %request_id, "reporting refused connection");
            self.deny(request_id);
        }
    }

    /// Snapshot `options` and queue it for the next tick that has not begun
    /// validation.
    pub fn enqueue_execution_options(&self, request_id: RequestId, options: &ExecutionOptions<'_>) {
        if !self.is_connected() {
            self.deny(request_id);
            return;
        }

        match SerializedOptions::from_options(options, &self.shared.codec) {
            Ok(owned) => self.shared.ticks.add_pending(request_id, owned),
            Err(err) => {
                warn!(request = %request_id, error = %err, "cannot snapshot execution options");
                self.shared.async_callbacks.push_error(AsyncError::single(
                    AsyncErrorKind::SerializationFailure,
                    request_id,
                ));
            }
        }
    }

    /// Queue an entity creation for the next tick.
    pub fn create_entity_request(&self, request_id: RequestId) {
        if !self.is_connected() {
            self.deny(request_id);
            return;
        }
        self.shared.entities.request(request_id);
    }

    /// Stop and join the tick thread, drop all queued work and buffered
    /// events, and destroy the registry. Does nothing more once done.
    pub fn disconnect(&self) {
        self.shared.stop();
        *self.rejected.lock() = None;

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("tick thread panicked");
            }
        }

        let registry = self.registry.lock().take();
        if let Some(registry) = registry {
            self.shared.ticks.clear();
            self.shared.entities.clear();
            self.shared.async_callbacks.clear();
            self.shared.execution_callbacks.clear();
            if let Err(err) = self.shared.engine.destroy_registry(registry) {
                warn!(%registry, error = %err, "cannot destroy registry");
            }
            info!(%registry, "session disconnected");
        }
        self.shared.set_state(SessionState::Disconnected);
    }

    fn deny(&self, request_id: RequestId) {
        self.shared.async_callbacks.push_error(AsyncError::single(
            AsyncErrorKind::PermissionDenied,
            request_id,
        ));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("registry", &self.registry())
            .field("tick", &self.current_tick())
            .finish_non_exhaustive()
    }
}
