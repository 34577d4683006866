//! Transaction manager configuration.

use std::time::Duration;

/// Configuration for a [`crate::TransactionManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Timeout applied by `start_short` when none is given.
    pub default_short_timeout: Duration,

    /// Upper bound accepted for an explicit short timeout.
    ///
    /// Longer requests are clamped to this value.
    pub max_short_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_short_timeout: Duration::from_secs(30),
            max_short_timeout: Duration::from_secs(24 * 60 * 60), // 1 day
        }
    }
}

impl ManagerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default short transaction timeout.
    #[must_use]
    pub const fn default_short_timeout(mut self, timeout: Duration) -> Self {
        self.default_short_timeout = timeout;
        self
    }

    /// Sets the maximum short transaction timeout.
    #[must_use]
    pub const fn max_short_timeout(mut self, timeout: Duration) -> Self {
        self.max_short_timeout = timeout;
        self
    }
}
