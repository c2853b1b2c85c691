//! Pool configuration options

use std::time::Duration;

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use connpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(20)
///     .with_acquire_timeout(Duration::from_secs(5))
///     .with_close_timeout(Duration::from_secs(30));
///
/// assert_eq!(config.capacity, 20);
/// assert_eq!(config.acquire_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Number of resources created up front; never changes afterwards
    pub capacity: usize,

    /// Upper bound for `acquire` and `acquire_async`; `None` waits forever
    pub acquire_timeout: Option<Duration>,

    /// Upper bound for `close` to wait on checked-out resources; `None` waits forever
    pub close_timeout: Option<Duration>,

    /// Resources held longer than this are reported by the health status
    pub long_hold_threshold: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            capacity: 10,
            acquire_timeout: None,
            close_timeout: None,
            long_hold_threshold: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pooled resources
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Bound how long an acquisition may wait
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Bound how long `close` waits for outstanding resources
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Set the hold time after which a checked-out resource is flagged
    pub fn with_long_hold_threshold(mut self, threshold: Duration) -> Self {
        self.long_hold_threshold = Some(threshold);
        self
    }
}
