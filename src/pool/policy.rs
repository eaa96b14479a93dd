use std::time::Duration;

/// Default retry budget for the resilient policy
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Default pause between failover attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// How many failovers a single call may trigger, and how far apart
///
/// `max_retries == 0` is the fail-fast configuration: the first failure is
/// returned to the caller as-is and no rotation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rotation-and-retry cycles allowed before giving up
    pub max_retries: u32,

    /// Pause before each retry
    pub retry_interval: Duration,
}

impl RetryPolicy {
    /// Rotate and retry up to [`DEFAULT_MAX_RETRIES`] times
    pub fn resilient() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Surface the first failure immediately
    pub fn fail_fast() -> Self {
        Self {
            max_retries: 0,
            retry_interval: Duration::ZERO,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn is_fail_fast(&self) -> bool {
        self.max_retries == 0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::resilient()
    }
}
