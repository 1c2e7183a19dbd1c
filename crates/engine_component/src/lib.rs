//! # engine_component
//!
//! The "C" in ECS — defines what a component and an action are, how values of
//! either are held type-erased by the engine, and how they are serialised
//! while they wait to be applied.
//!
//! This crate provides:
//!
//! - [`Component`] and [`Action`] traits — the contract all ECS data must satisfy.
//! - [`Entity`] — lightweight `u64` entity identifiers.
//! - [`EntityAllocator`] — thread-safe, monotonically increasing ID allocator.
//! - [`AnyValue`] — the type-erased form in which the engine stores values.
//! - [`Codec`] — per-type size/serialise/deserialise lookups keyed by type ID.

pub mod action;
pub mod codec;
pub mod component;
pub mod entity;
pub mod error;
pub mod value;

pub use action::{Action, ActionTypeId};
pub use codec::{Codec, decode, encode};
pub use component::{Component, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use error::CodecError;
pub use value::{AnyValue, TypeMeta};
