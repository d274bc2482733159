//! Configuration for the billing core.
//!
//! External calls (payment provider, notification backend) are bounded with
//! explicit deadlines so a hung collaborator can never block an operation
//! indefinitely. Use the builder methods to customize behavior.

use std::time::Duration;

/// Configuration for managers and the reminder scheduler.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Deadline for a single payment-provider call.
    pub provider_timeout: Duration,
    /// Deadline for a single notification dispatch.
    pub notify_timeout: Duration,
    /// Cadence of the periodic reminder scheduler loop.
    pub scheduler_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(10),
            scheduler_interval: Duration::from_secs(3600),
        }
    }
}

impl CoreConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payment-provider call deadline.
    ///
    /// Values are clamped to at least one second.
    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout.max(Duration::from_secs(1));
        self
    }

    /// Set the notification dispatch deadline.
    ///
    /// Values are clamped to at least one second.
    #[must_use]
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout.max(Duration::from_secs(1));
        self
    }

    /// Set the reminder scheduler cadence.
    #[must_use]
    pub fn with_scheduler_interval(mut self, interval: Duration) -> Self {
        self.scheduler_interval = interval;
        self
    }
}
