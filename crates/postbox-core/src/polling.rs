//! Polling and leasing configuration, shared by the outbox poller and the
//! inbox processor.

use std::time::Duration;

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_LOCKING_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_LOCK_AGE: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Sleep between two lease attempts.
    pub polling_interval: Duration,
    /// How often the reaper looks for stale leases.
    pub locking_interval: Duration,
    /// A lease older than this is released by the reaper.
    pub max_lock_age: Duration,
    /// Rows with `attempts >= max_retries` are never leased again.
    pub max_retries: u32,
    /// Delay applied by mark-for-retry.
    pub retry_interval: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            locking_interval: DEFAULT_LOCKING_INTERVAL,
            max_lock_age: DEFAULT_MAX_LOCK_AGE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl PollingPolicy {
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_lock(mut self, interval: Duration, max_age: Duration) -> Self {
        self.locking_interval = interval;
        self.max_lock_age = max_age;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_interval: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_interval = retry_interval;
        self
    }
}
