//! Type-erased component and action values.
//!
//! The engine stores every component as a `Box<dyn AnyValue>` and hands out
//! `&dyn AnyValue` references while a tick executes. [`TypeMeta`] holds the
//! per-type function pointers needed to turn such a reference into MessagePack
//! bytes and back without knowing the concrete type.

use std::any::Any;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{decode, encode};
use crate::error::CodecError;

/// A value the engine can hold without knowing its concrete type.
///
/// Implemented for every `Clone + Debug + Send + Sync + 'static` type.
pub trait AnyValue: Any + fmt::Debug + Send + Sync {
    /// Borrow as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Clone into a new box.
    fn clone_value(&self) -> Box<dyn AnyValue>;
}

impl<T: Any + Clone + fmt::Debug + Send + Sync> AnyValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_value(&self) -> Box<dyn AnyValue> {
        Box::new(self.clone())
    }
}

impl dyn AnyValue {
    /// Returns the value as `T` if that is its concrete type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

/// Metadata about a component or action type, used for type-erased
/// serialisation.
#[derive(Debug, Clone)]
pub struct TypeMeta {
    /// The human-readable name of the type (e.g. `"Transform3D"`).
    pub name: &'static str,
    /// In-memory size of one instance in bytes; `0` for tag types.
    pub size: usize,
    /// Serialise an erased value of this type to MessagePack bytes.
    pub serialize_fn: fn(&dyn AnyValue) -> Result<Vec<u8>, CodecError>,
    /// Deserialise MessagePack bytes into a freshly boxed value of this type.
    pub deserialize_fn: fn(&[u8]) -> Result<Box<dyn AnyValue>, CodecError>,
}

impl TypeMeta {
    /// Build the metadata for a concrete type `T`.
    #[must_use]
    pub fn of<T>(name: &'static str) -> Self
    where
        T: Clone + fmt::Debug + Send + Sync + 'static + Serialize + DeserializeOwned,
    {
        Self {
            name,
            size: std::mem::size_of::<T>(),
            serialize_fn: |value: &dyn AnyValue| {
                let typed = value
                    .downcast_ref::<T>()
                    .ok_or(CodecError::TypeMismatch {
                        expected: std::any::type_name::<T>(),
                    })?;
                encode(typed)
            },
            deserialize_fn: |bytes: &[u8]| {
                let value: T = decode(bytes)?;
                Ok(Box::new(value) as Box<dyn AnyValue>)
            },
        }
    }

    /// Returns `true` for zero-sized tag types.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}
