//! Health monitoring for resource pools

use std::time::Duration;

/// Point-in-time health of a resource pool
///
/// # Examples
///
/// ```
/// use connpool::{Resource, ResourcePool};
///
/// struct Conn;
/// impl Resource for Conn {}
///
/// let pool = ResourcePool::new(3, || Ok::<_, std::io::Error>(Conn)).unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.available_resources, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle resources
    pub available_resources: usize,

    /// Checked-out resources
    pub active_resources: usize,

    /// Callers blocked in an acquisition
    pub waiting_callers: usize,

    /// Fixed capacity
    pub total_capacity: usize,

    /// Whether `close` has been called
    pub is_closed: bool,

    /// Longest time any currently checked-out resource has been held
    pub longest_hold: Option<Duration>,

    /// Warning messages
    pub warnings: Vec<String>,
}

/// Inputs sampled from a live pool
pub(crate) struct HealthSample {
    pub available: usize,
    pub active: usize,
    pub waiting: usize,
    pub capacity: usize,
    pub closed: bool,
    pub longest_hold: Option<Duration>,
    pub long_hold_threshold: Option<Duration>,
}

impl HealthStatus {
    pub(crate) fn from_sample(sample: HealthSample) -> Self {
        let utilization = if sample.capacity > 0 {
            sample.active as f64 / sample.capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if sample.closed {
            warnings.push("Pool is closed".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if sample.waiting > 0 {
            warnings.push(format!("{} caller(s) waiting for a resource", sample.waiting));
        }

        if let (Some(held), Some(threshold)) = (sample.longest_hold, sample.long_hold_threshold)
            && held > threshold
        {
            warnings.push(format!("Resource held for {:?}, longer than {:?}", held, threshold));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            available_resources: sample.available,
            active_resources: sample.active,
            waiting_callers: sample.waiting,
            total_capacity: sample.capacity,
            is_closed: sample.closed,
            longest_hold: sample.longest_hold,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
