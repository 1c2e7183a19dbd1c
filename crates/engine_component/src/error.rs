//! Codec error types.

use crate::action::ActionTypeId;
use crate::component::ComponentTypeId;

/// Errors raised while snapshotting or restoring component and action values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a value to MessagePack.
    #[error("failed to encode value: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a value from MessagePack.
    #[error("failed to decode value: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// No component type with this ID was registered with the codec.
    #[error("unknown component type {0}")]
    UnknownComponent(ComponentTypeId),

    /// No action type with this ID was registered with the codec.
    #[error("unknown action type {0}")]
    UnknownAction(ActionTypeId),

    /// The erased value handed to the codec is not of the registered type.
    #[error("value is not a {expected}")]
    TypeMismatch {
        /// Rust type name the codec expected.
        expected: &'static str,
    },
}
