//! Error types of the scheduler.
//!
//! Nothing here is returned from caller-facing calls. [`AsyncError`]s are
//! queued and delivered by `flush_events`; [`ConnectionStringError`] is
//! turned into an [`AsyncErrorKind::InvalidConnectionString`] event.

use std::fmt;

use crate::request::RequestId;

/// What went wrong with one or more requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncErrorKind {
    /// The operation needs a connected session.
    PermissionDenied,
    /// The host was accepted but the options were missing or invalid.
    InvalidConnectionString,
    /// A batch conflicted with itself or with another batch of the same tick.
    ExecutionMergeFailure,
    /// The engine failed while executing a tick.
    SystemExecutionError,
    /// A payload could not be snapshotted or restored by the codec.
    SerializationFailure,
}

impl fmt::Display for AsyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PermissionDenied => "permission denied",
            Self::InvalidConnectionString => "invalid connection string",
            Self::ExecutionMergeFailure => "execution merge failure",
            Self::SystemExecutionError => "system execution error",
            Self::SerializationFailure => "serialization failure",
        };
        f.write_str(name)
    }
}

/// A queued error and the requests it applies to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (requests {request_ids:?})")]
pub struct AsyncError {
    /// The error kind.
    pub kind: AsyncErrorKind,
    /// Requests affected; may be empty.
    pub request_ids: Vec<RequestId>,
}

impl AsyncError {
    /// Create an error for any number of requests.
    #[must_use]
    pub fn new(kind: AsyncErrorKind, request_ids: impl IntoIterator<Item = RequestId>) -> Self {
        Self {
            kind,
            request_ids: request_ids.into_iter().collect(),
        }
    }

    /// Create an error for exactly one request.
    #[must_use]
    pub fn single(kind: AsyncErrorKind, request_id: RequestId) -> Self {
        Self::new(kind, [request_id])
    }
}

/// Problems with the options of an accepted connection string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionStringError {
    /// An option segment had no `=`.
    #[error("malformed option '{0}', expected key=value")]
    MalformedOption(String),

    /// A required option is absent.
    #[error("missing required option '{0}'")]
    MissingOption(&'static str),

    /// An option could not be parsed or is out of range.
    #[error("option '{key}' has invalid value '{value}'")]
    InvalidValue {
        /// The option key.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}
