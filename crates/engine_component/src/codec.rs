//! MessagePack codec for component and action payloads.
//!
//! The [`Codec`] is a registry of [`TypeMeta`] keyed by type ID. It answers
//! three questions for an erased value: how large the type is, how to turn a
//! borrowed value into owned bytes, and how to turn those bytes back into a
//! boxed value. All payloads use MessagePack with named fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionTypeId};
use crate::component::{Component, ComponentTypeId};
use crate::error::CodecError;
use crate::value::{AnyValue, TypeMeta};

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec_named(value).map_err(CodecError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CodecError> {
    rmp_serde::from_slice(bytes).map_err(CodecError::Decode)
}

/// Registry of serialisable component and action types.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    components: HashMap<ComponentTypeId, TypeMeta>,
    actions: HashMap<ActionTypeId, TypeMeta>,
}

impl Codec {
    /// Create an empty codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register component type `T`.
    pub fn register_component<T: Component>(&mut self) -> &mut Self {
        self.components.insert(T::component_type_id(), T::meta());
        self
    }

    /// Register action type `T`.
    pub fn register_action<T: Action>(&mut self) -> &mut Self {
        self.actions.insert(T::action_type_id(), T::meta());
        self
    }

    /// Builder form of [`Codec::register_component`].
    #[must_use]
    pub fn with_component<T: Component>(mut self) -> Self {
        self.register_component::<T>();
        self
    }

    /// Builder form of [`Codec::register_action`].
    #[must_use]
    pub fn with_action<T: Action>(mut self) -> Self {
        self.register_action::<T>();
        self
    }

    /// Returns the metadata for a component type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownComponent`] if the type was never registered.
    pub fn component_meta(&self, type_id: ComponentTypeId) -> Result<&TypeMeta, CodecError> {
        self.components
            .get(&type_id)
            .ok_or(CodecError::UnknownComponent(type_id))
    }

    /// Returns the metadata for an action type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownAction`] if the type was never registered.
    pub fn action_meta(&self, type_id: ActionTypeId) -> Result<&TypeMeta, CodecError> {
        self.actions
            .get(&type_id)
            .ok_or(CodecError::UnknownAction(type_id))
    }

    /// In-memory size of a component type; `0` for tags.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownComponent`] for unregistered types.
    pub fn size_of_component(&self, type_id: ComponentTypeId) -> Result<usize, CodecError> {
        Ok(self.component_meta(type_id)?.size)
    }

    /// In-memory size of an action type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownAction`] for unregistered types.
    pub fn size_of_action(&self, type_id: ActionTypeId) -> Result<usize, CodecError> {
        Ok(self.action_meta(type_id)?.size)
    }

    /// Snapshot a borrowed component value into owned bytes.
    ///
    /// # Errors
    ///
    /// Fails for unregistered types, mismatched values or encoder errors.
    pub fn serialize_component(
        &self,
        type_id: ComponentTypeId,
        value: &dyn AnyValue,
    ) -> Result<Vec<u8>, CodecError> {
        (self.component_meta(type_id)?.serialize_fn)(value)
    }

    /// Restore a component value from its snapshot.
    ///
    /// # Errors
    ///
    /// Fails for unregistered types or malformed bytes.
    pub fn deserialize_component(
        &self,
        type_id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<Box<dyn AnyValue>, CodecError> {
        (self.component_meta(type_id)?.deserialize_fn)(bytes)
    }

    /// Snapshot a borrowed action value into owned bytes.
    ///
    /// # Errors
    ///
    /// Fails for unregistered types, mismatched values or encoder errors.
    pub fn serialize_action(
        &self,
        type_id: ActionTypeId,
        value: &dyn AnyValue,
    ) -> Result<Vec<u8>, CodecError> {
        (self.action_meta(type_id)?.serialize_fn)(value)
    }

    /// Restore an action value from its snapshot.
    ///
    /// # Errors
    ///
    /// Fails for unregistered types or malformed bytes.
    pub fn deserialize_action(
        &self,
        type_id: ActionTypeId,
        bytes: &[u8],
    ) -> Result<Box<dyn AnyValue>, CodecError> {
        (self.action_meta(type_id)?.deserialize_fn)(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Counter {
        value: u32,
    }

    impl Component for Counter {
        fn type_name() -> &'static str {
            "Counter"
        }
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Increment {
        by: u32,
    }

    impl Action for Increment {
        fn type_name() -> &'static str {
            "Increment"
        }
    }

    fn codec() -> Codec {
        Codec::new()
            .with_component::<Counter>()
            .with_action::<Increment>()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let bytes = encode(&Counter { value: 42 }).unwrap();
        let restored: Counter = decode(&bytes).unwrap();
        assert_eq!(restored, Counter { value: 42 });
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<Counter, _> = decode(&[0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_component_snapshot_roundtrip() {
        let codec = codec();
        let id = Counter::component_type_id();
        let bytes = codec.serialize_component(id, &Counter { value: 5 }).unwrap();
        let restored = codec.deserialize_component(id, &bytes).unwrap();
        assert_eq!(restored.downcast_ref::<Counter>(), Some(&Counter { value: 5 }));
        assert_eq!(codec.size_of_component(id).unwrap(), 4);
    }

    #[test]
    fn test_action_snapshot_roundtrip() {
        let codec = codec();
        let id = Increment::action_type_id();
        let bytes = codec.serialize_action(id, &Increment { by: 2 }).unwrap();
        let restored = codec.deserialize_action(id, &bytes).unwrap();
        assert_eq!(restored.downcast_ref::<Increment>(), Some(&Increment { by: 2 }));
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        let codec = Codec::new();
        assert!(matches!(
            codec.size_of_component(ComponentTypeId(1)),
            Err(CodecError::UnknownComponent(ComponentTypeId(1)))
        ));
        assert!(matches!(
            codec.size_of_action(ActionTypeId(1)),
            Err(CodecError::UnknownAction(ActionTypeId(1)))
        ));
    }
}
