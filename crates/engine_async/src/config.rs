//! Scheduler configuration.

/// Host a connection string must name for [`AsyncScheduler::connect`] to
/// succeed, unless overridden.
///
/// [`AsyncScheduler::connect`]: crate::AsyncScheduler::connect
pub const DEFAULT_ACCEPTED_HOST: &str = "good";

/// Configuration for an [`AsyncScheduler`](crate::AsyncScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Connections to any other host are silently ignored.
    pub accepted_host: String,
}

impl SchedulerConfig {
    /// Create a config accepting [`DEFAULT_ACCEPTED_HOST`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            accepted_host: DEFAULT_ACCEPTED_HOST.to_string(),
        }
    }

    /// Override the accepted host.
    #[must_use]
    pub fn with_accepted_host(mut self, host: impl Into<String>) -> Self {
        self.accepted_host = host.into();
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
