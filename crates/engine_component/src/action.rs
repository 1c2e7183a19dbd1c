//! One-shot inputs consumed by systems during a single tick.
//!
//! Actions share the component naming scheme: an [`ActionTypeId`] is the
//! FNV-1a 64-bit hash of the action's name. The two ID spaces are distinct
//! types, so a component and an action may share a name.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::component::fnv1a;
use crate::value::TypeMeta;

/// A unique identifier for an action type, derived from its string name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ActionTypeId(pub u64);

impl ActionTypeId {
    /// Compute the [`ActionTypeId`] from an action's string name.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a(name))
    }

    /// Compute the [`ActionTypeId`] for a Rust action type `T`.
    #[must_use]
    pub fn of<T: Action>() -> Self {
        Self::from_name(T::type_name())
    }
}

impl fmt::Display for ActionTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action:{:016x}", self.0)
    }
}

/// An input pushed to the systems of one tick and then discarded.
pub trait Action: Clone + fmt::Debug + Send + Sync + 'static + Serialize + DeserializeOwned {
    /// A human-readable name for this action type.
    fn type_name() -> &'static str;

    /// Returns the [`ActionTypeId`] for this action.
    fn action_type_id() -> ActionTypeId {
        ActionTypeId::from_name(Self::type_name())
    }

    /// Returns the [`TypeMeta`] the codec uses for this action type.
    fn meta() -> TypeMeta {
        TypeMeta::of::<Self>(Self::type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComponentTypeId;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Jump {
        height: u32,
    }

    impl Action for Jump {
        fn type_name() -> &'static str {
            "Jump"
        }
    }

    #[test]
    fn test_action_type_id_uses_same_hash_as_components() {
        assert_eq!(Jump::action_type_id().0, ComponentTypeId::from_name("Jump").0);
        assert_eq!(ActionTypeId::of::<Jump>(), Jump::action_type_id());
    }
}
