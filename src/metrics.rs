//! Metrics collection and export for resource pools

use crossbeam::utils::CachePadded;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use crate::errors::{PoolError, PoolResult};

/// Metrics data for a pool
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
/// {
///     let _conn = pool.acquire().unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_acquired, 1);
///     assert_eq!(metrics.active_resources, 1);
/// }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total successful acquisitions
    pub total_acquired: usize,

    /// Total resources handed back
    pub total_released: usize,

    /// Acquisitions that had to wait for a release
    pub wait_events: usize,

    /// Acquisitions or closes that hit their deadline
    pub timeouts: usize,

    /// Acquisitions rejected because the pool was closed
    pub closed_rejections: usize,

    /// Resources destroyed so far
    pub destroyed_resources: usize,

    /// Currently checked-out resources
    pub active_resources: usize,

    /// Currently idle resources
    pub available_resources: usize,

    /// Callers currently blocked in an acquisition
    pub waiting_callers: usize,

    /// Checked-out share of capacity (0.0 to 1.0)
    pub utilization: f64,

    /// Fixed pool capacity
    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("wait_events".to_string(), self.wait_events.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("closed_rejections".to_string(), self.closed_rejections.to_string());
        metrics.insert("destroyed_resources".to_string(), self.destroyed_resources.to_string());
        metrics.insert("active_resources".to_string(), self.active_resources.to_string());
        metrics.insert("available_resources".to_string(), self.available_resources.to_string());
        metrics.insert("waiting_callers".to_string(), self.waiting_callers.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use connpool::{Resource, ResourcePool};
    /// use std::collections::HashMap;
    ///
    /// struct Conn;
    /// impl Resource for Conn {}
    ///
    /// let pool = ResourcePool::new(3, || Ok::<_, std::io::Error>(Conn)).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("my_pool", Some(&tags)).unwrap();
    /// assert!(output.contains("connpool_resources_active"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        let registry = Registry::new();
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());
        let export_err = |e: prometheus::Error| PoolError::MetricsExport(e.to_string());

        let gauges = [
            ("connpool_resources_active", "Current checked-out resources", metrics.active_resources),
            ("connpool_resources_available", "Current idle resources", metrics.available_resources),
            ("connpool_callers_waiting", "Callers blocked in acquire", metrics.waiting_callers),
            ("connpool_capacity", "Fixed pool capacity", metrics.capacity),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help)).map_err(export_err)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(export_err)?;
        }

        let utilization = Gauge::with_opts(opts("connpool_utilization", "Pool utilization ratio"))
            .map_err(export_err)?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization)).map_err(export_err)?;

        let counters = [
            ("connpool_acquired_total", "Total successful acquisitions", metrics.total_acquired),
            ("connpool_released_total", "Total released resources", metrics.total_released),
            ("connpool_wait_events_total", "Acquisitions that waited", metrics.wait_events),
            ("connpool_timeouts_total", "Operations that timed out", metrics.timeouts),
            ("connpool_closed_rejections_total", "Acquisitions rejected after close", metrics.closed_rejections),
            ("connpool_destroyed_total", "Destroyed resources", metrics.destroyed_resources),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help)).map_err(export_err)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(export_err)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(export_err)?;
        String::from_utf8(buffer).map_err(|e| PoolError::MetricsExport(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_acquired: CachePadded<AtomicUsize>,
    pub total_released: CachePadded<AtomicUsize>,
    pub wait_events: AtomicUsize,
    pub timeouts: AtomicUsize,
    pub closed_rejections: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics(
        &self,
        active: usize,
        available: usize,
        waiting: usize,
        capacity: usize,
    ) -> PoolMetrics {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            wait_events: self.wait_events.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            closed_rejections: self.closed_rejections.load(Ordering::Relaxed),
            destroyed_resources: self.destroyed.load(Ordering::Relaxed),
            active_resources: active,
            available_resources: available,
            waiting_callers: waiting,
            utilization,
            capacity,
        }
    }
}
