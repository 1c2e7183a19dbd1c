//! Request identifiers.
//!
//! Every caller-facing operation is answered with a [`RequestId`] at once;
//! whatever happens to the request later is reported through events tagged
//! with that ID.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one caller-facing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request({})", self.0)
    }
}

/// Issues strictly increasing request IDs from any number of threads.
///
/// IDs start at 1. Wrapping past `u64::MAX` is not handled.
#[derive(Debug)]
pub struct RequestIdIssuer {
    next: AtomicU64,
}

impl RequestIdIssuer {
    /// Create an issuer whose first ID is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Issue a fresh ID.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of IDs issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for RequestIdIssuer {
    fn default() -> Self {
        Self::new()
    }
}
