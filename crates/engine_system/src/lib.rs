//! # engine_system
//!
//! The component-storage and system-execution side of the engine, as seen by
//! the tick scheduler.
//!
//! This crate provides:
//!
//! - [`ExecutionEngine`] — the narrow interface the scheduler drives: create
//!   registries and entities, read components, execute one tick.
//! - [`ExecutionOptions`] — one tick's worth of borrowed mutations, and
//!   [`NativeOptions`], the owned form that lends them out.
//! - [`ExecutionCollector`] — callbacks invoked while a tick executes.
//! - [`InMemoryEngine`] — a reference engine that stores components in
//!   concurrent maps and runs registered systems through a [`SystemContext`].
//!
//! ## Usage
//!
//! ```rust
//! use engine_system::{ExecutionEngine, InMemoryEngine, NativeOptions};
//!
//! let engine = InMemoryEngine::new();
//! let registry = engine.create_registry("demo").unwrap();
//! let entity = engine.create_entity(registry).unwrap();
//!
//! let mut batch = NativeOptions::new();
//! batch.destroy_entity(entity);
//! engine.execute_one_tick(registry, &batch.as_options(), &mut ()).unwrap();
//! ```

pub mod collector;
pub mod context;
pub mod engine;
pub mod options;
pub mod world;

pub use collector::ExecutionCollector;
pub use context::SystemContext;
pub use engine::{ExecutionEngine, ExecutionError, RegistryId};
pub use options::{
    ActionRef, ComponentKey, ComponentRef, EntitySpawn, ExecutionOptions, InitialComponent,
    NativeOptions, NativeSpawn,
};
pub use world::InMemoryEngine;
