//! # engine_async
//!
//! Asynchronous, tick-based front end to an [`ExecutionEngine`].
//!
//! Callers submit batches of mutations and entity-creation requests at any
//! time; a background thread owned by the [`Session`] validates everything
//! submitted for the current tick, rejects conflicting batches, applies the
//! merged result through the engine at a fixed cadence, and buffers what
//! happened. Outcomes never come back as return values: every call yields a
//! [`RequestId`] and results are pulled with [`AsyncScheduler::flush_events`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use engine_async::AsyncScheduler;
//! use engine_component::Codec;
//! use engine_system::InMemoryEngine;
//!
//! let scheduler = AsyncScheduler::new(Arc::new(InMemoryEngine::new()), Codec::new());
//! scheduler.connect("good?tick_rate=25");
//! scheduler.create_entity();
//! std::thread::sleep(std::time::Duration::from_millis(100));
//! scheduler.flush_events(None, None);
//! scheduler.disconnect();
//! ```
//!
//! [`ExecutionEngine`]: engine_system::ExecutionEngine

pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod events;
pub mod execution;
pub mod request;
pub mod scheduler;
pub mod serialized;
pub mod session;
pub mod tick;

pub use config::SchedulerConfig;
pub use connection::{ConnectionString, SessionConfig};
pub use entity::EntityManager;
pub use error::{AsyncError, AsyncErrorKind, ConnectionStringError};
pub use events::{AsyncCallbacks, AsyncCollector, AsyncEvent};
pub use execution::{ExecutionCallbacks, ExecutionRecorder};
pub use request::{RequestId, RequestIdIssuer};
pub use scheduler::AsyncScheduler;
pub use serialized::{ConflictKind, MergeConflict, SerializedOptions};
pub use session::{Session, SessionState};
pub use tick::{TickManager, ValidatedOptions};
