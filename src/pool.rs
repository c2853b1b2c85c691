//! Core resource pool implementation

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::health::{HealthSample, HealthStatus};
use crate::metrics::PoolMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;
use crate::metrics::MetricsTracker;
use crate::resource::Resource;

use dashmap::DashMap;
use log::{debug, info, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

struct Slot<R> {
    id: usize,
    resource: R,
}

/// Everything guarded by the pool mutex.
///
/// `available.len() + outstanding` equals the capacity until teardown starts;
/// after that `destroyed` counts up to the capacity.
struct State<R> {
    available: VecDeque<Slot<R>>,
    outstanding: usize,
    destroyed: usize,
    closed: bool,
}

struct Shared<R: Resource> {
    state: Mutex<State<R>>,
    // one wakeup per released resource
    resource_ready: Condvar,
    drained: Condvar,
    async_ready: Notify,
    active: DashMap<usize, Instant>,
    waiting: AtomicUsize,
    metrics: MetricsTracker,
    config: PoolConfiguration,
}

/// Counts a caller as waiting for as long as it lives.
struct WaitGuard<'a>(&'a AtomicUsize);

impl<'a> WaitGuard<'a> {
    fn new(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::Relaxed);
        Self(waiting)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<R: Resource> Shared<R> {
    /// Pop an idle resource, waiting on the condvar until `deadline` if needed.
    fn check_out(&self, deadline: Option<Instant>, timeout: Duration) -> PoolResult<Slot<R>> {
        let mut state = self.state.lock();
        let mut wait: Option<WaitGuard<'_>> = None;

        loop {
            if state.closed {
                self.metrics.closed_rejections.fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::PoolClosed);
            }

            if let Some(slot) = state.available.pop_front() {
                state.outstanding += 1;
                drop(state);
                self.mark_checked_out(slot.id);
                return Ok(slot);
            }

            if wait.is_none() {
                self.metrics.wait_events.fetch_add(1, Ordering::Relaxed);
                wait = Some(WaitGuard::new(&self.waiting));
            }

            match deadline {
                None => self.resource_ready.wait(&mut state),
                Some(deadline) => {
                    let timed_out = self.resource_ready.wait_until(&mut state, deadline).timed_out();
                    if timed_out && state.available.is_empty() && !state.closed {
                        self.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                        debug!("acquire timed out after {:?}", timeout);
                        return Err(PoolError::Timeout(timeout));
                    }
                }
            }
        }
    }

    fn try_check_out(&self) -> PoolResult<Option<Slot<R>>> {
        let mut state = self.state.lock();
        if state.closed {
            self.metrics.closed_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::PoolClosed);
        }

        let slot = state.available.pop_front();
        if slot.is_some() {
            state.outstanding += 1;
        }
        drop(state);

        if let Some(ref slot) = slot {
            self.mark_checked_out(slot.id);
        }
        Ok(slot)
    }

    fn mark_checked_out(&self, id: usize) {
        self.active.insert(id, Instant::now());
        self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
    }

    /// Hand a resource back. After close the resource is destroyed instead.
    fn check_in(&self, slot: Slot<R>) -> PoolResult<()> {
        if let Some((id, acquired_at)) = self.active.remove(&slot.id) {
            trace!("resource {} released after {:?}", id, acquired_at.elapsed());
        }
        self.metrics.total_released.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        state.outstanding -= 1;
        if state.closed {
            drop(state);
            debug!("resource {} returned to a closed pool, destroying it", slot.id);
            self.destroy(slot);
            return Err(PoolError::PoolClosed);
        }

        // append before signalling so a woken waiter never finds the queue empty
        state.available.push_back(slot);
        drop(state);
        self.resource_ready.notify_one();
        self.async_ready.notify_one();
        Ok(())
    }

    fn destroy(&self, slot: Slot<R>) {
        trace!("destroying resource {}", slot.id);
        slot.resource.close();
        self.metrics.destroyed.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        state.destroyed += 1;
        if state.destroyed == self.config.capacity {
            self.drained.notify_all();
        }
    }

    /// Mark the pool closed, wake every waiter and destroy the idle resources.
    fn close_idle(&self) {
        let (idle, first_close, outstanding) = {
            let mut state = self.state.lock();
            let first_close = !state.closed;
            state.closed = true;
            (std::mem::take(&mut state.available), first_close, state.outstanding)
        };

        if first_close {
            info!("closing pool: {} idle, {} checked out", idle.len(), outstanding);
        }

        self.resource_ready.notify_all();
        self.async_ready.notify_waiters();

        if outstanding > 0 {
            debug!("{} resource(s) still checked out, destroying them on release", outstanding);
        }
        for slot in idle {
            self.destroy(slot);
        }
    }

    fn shutdown(&self, timeout: Option<Duration>) -> PoolResult<()> {
        self.close_idle();

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while state.destroyed < self.config.capacity {
            match deadline {
                None => self.drained.wait(&mut state),
                Some(deadline) => {
                    let timed_out = self.drained.wait_until(&mut state, deadline).timed_out();
                    if timed_out && state.destroyed < self.config.capacity {
                        self.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "close gave up after {:?} with {} resource(s) still checked out",
                            timeout.unwrap_or_default(),
                            state.outstanding
                        );
                        return Err(PoolError::Timeout(timeout.unwrap_or_default()));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A checked-out resource that returns to its pool when dropped
pub struct PooledResource<R: Resource> {
    slot: Option<Slot<R>>,
    shared: Arc<Shared<R>>,
    acquired_at: Instant,
}

impl<R: Resource> PooledResource<R> {
    fn new(slot: Slot<R>, shared: Arc<Shared<R>>) -> Self {
        Self {
            slot: Some(slot),
            shared,
            acquired_at: Instant::now(),
        }
    }

    /// Stable identifier of the underlying resource within its pool
    pub fn id(&self) -> usize {
        self.slot.as_ref().map(|s| s.id).expect("Resource already released")
    }

    /// Time since this resource was acquired
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Return the resource to the pool now.
    ///
    /// Fails with [`PoolError::PoolClosed`] if the pool was closed in the
    /// meantime; the resource is destroyed in that case.
    pub fn release(mut self) -> PoolResult<()> {
        match self.slot.take() {
            Some(slot) => self.shared.check_in(slot),
            None => Ok(()),
        }
    }
}

impl<R: Resource> Deref for PooledResource<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.slot.as_ref().expect("Resource already released").resource
    }
}

impl<R: Resource> DerefMut for PooledResource<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot.as_mut().expect("Resource already released").resource
    }
}

impl<R: Resource> Drop for PooledResource<R> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take()
            && let Err(e) = self.shared.check_in(slot)
        {
            debug!("release on drop: {}", e);
        }
    }
}

/// Thread-safe pool of a fixed number of eagerly created resources
///
/// # Examples
///
/// ```
/// use connpool::{Resource, ResourcePool};
///
/// struct Conn(usize);
/// impl Resource for Conn {}
///
/// let mut next = 0;
/// let pool = ResourcePool::new(2, || {
///     next += 1;
///     Ok::<_, std::io::Error>(Conn(next))
/// })
/// .unwrap();
///
/// {
///     let conn = pool.acquire().unwrap();
///     assert!(conn.0 == 1 || conn.0 == 2);
///     assert_eq!(pool.available_count(), 1);
/// }
///
/// assert_eq!(pool.available_count(), 2);
/// pool.close().unwrap();
/// ```
pub struct ResourcePool<R: Resource> {
    shared: Arc<Shared<R>>,
}

impl<R: Resource> ResourcePool<R> {
    /// Create a pool of `capacity` resources built by `factory`
    pub fn new<F, E>(capacity: usize, factory: F) -> PoolResult<Self>
    where
        F: FnMut() -> Result<R, E>,
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self::with_config(PoolConfiguration::new().with_capacity(capacity), factory)
    }

    /// Create a pool from a configuration.
    ///
    /// The factory is called exactly `config.capacity` times. If any call
    /// fails, every resource created so far is closed and the error returned.
    pub fn with_config<F, E>(config: PoolConfiguration, mut factory: F) -> PoolResult<Self>
    where
        F: FnMut() -> Result<R, E>,
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        if config.capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }

        let mut resources = Vec::with_capacity(config.capacity);
        for index in 0..config.capacity {
            match factory() {
                Ok(resource) => resources.push(resource),
                Err(e) => {
                    let err = PoolError::construction(index, e);
                    warn!("{}; closing {} resource(s) created so far", err, resources.len());
                    for resource in resources {
                        resource.close();
                    }
                    return Err(err);
                }
            }
        }

        Self::from_resources(resources, config)
    }

    /// Create a pool around already-created resources. The capacity is the
    /// number of resources given.
    pub fn from_resources(resources: Vec<R>, config: PoolConfiguration) -> PoolResult<Self> {
        if resources.is_empty() {
            return Err(PoolError::InvalidCapacity);
        }

        let capacity = resources.len();
        let available = resources
            .into_iter()
            .enumerate()
            .map(|(id, resource)| Slot { id, resource })
            .collect();

        debug!("created pool with {} resource(s)", capacity);

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    available,
                    outstanding: 0,
                    destroyed: 0,
                    closed: false,
                }),
                resource_ready: Condvar::new(),
                drained: Condvar::new(),
                async_ready: Notify::new(),
                active: DashMap::with_capacity(capacity),
                waiting: AtomicUsize::new(0),
                metrics: MetricsTracker::new(),
                config: PoolConfiguration { capacity, ..config },
            }),
        })
    }

    /// Get a resource, blocking until one is idle.
    ///
    /// Waits at most `acquire_timeout` if the configuration sets one.
    /// Returns [`PoolError::PoolClosed`] as soon as the pool is closed.
    pub fn acquire(&self) -> PoolResult<PooledResource<R>> {
        match self.shared.config.acquire_timeout {
            Some(timeout) => self.acquire_timeout(timeout),
            None => self.wrap(self.shared.check_out(None, Duration::ZERO)),
        }
    }

    /// Get a resource, waiting at most `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> PoolResult<PooledResource<R>> {
        self.wrap(self.shared.check_out(Some(Instant::now() + timeout), timeout))
    }

    /// Get a resource, waiting until `deadline` at the latest
    pub fn acquire_until(&self, deadline: Instant) -> PoolResult<PooledResource<R>> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.wrap(self.shared.check_out(Some(deadline), timeout))
    }

    /// Get a resource only if one is idle right now.
    ///
    /// `Ok(None)` means every resource is checked out; a closed pool is
    /// reported as [`PoolError::PoolClosed`].
    pub fn try_acquire(&self) -> PoolResult<Option<PooledResource<R>>> {
        let slot = self.shared.try_check_out()?;
        Ok(slot.map(|slot| PooledResource::new(slot, Arc::clone(&self.shared))))
    }

    /// Get a resource without blocking the executor thread.
    ///
    /// Bounded by `acquire_timeout` if configured. Dropping the future
    /// abandons the wait without consuming a resource.
    pub async fn acquire_async(&self) -> PoolResult<PooledResource<R>> {
        match self.shared.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.wait_async())
                .await
                .map_err(|_| {
                    self.shared.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                    debug!("async acquire timed out after {:?}", timeout);
                    PoolError::Timeout(timeout)
                })?,
            None => self.wait_async().await,
        }
    }

    /// Like [`acquire_async`](Self::acquire_async), but gives up with
    /// [`PoolError::Cancelled`] once `cancel` completes.
    pub async fn acquire_or_cancel<C>(&self, cancel: C) -> PoolResult<PooledResource<R>>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            result = self.acquire_async() => result,
            _ = cancel => {
                debug!("acquire cancelled by caller");
                Err(PoolError::Cancelled)
            }
        }
    }

    async fn wait_async(&self) -> PoolResult<PooledResource<R>> {
        let mut wait: Option<WaitGuard<'_>> = None;
        loop {
            let notified = self.shared.async_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(slot) = self.shared.try_check_out()? {
                return Ok(PooledResource::new(slot, Arc::clone(&self.shared)));
            }

            if wait.is_none() {
                self.shared.metrics.wait_events.fetch_add(1, Ordering::Relaxed);
                wait = Some(WaitGuard::new(&self.shared.waiting));
            }
            notified.await;
        }
    }

    /// Return a resource to this pool.
    ///
    /// A resource checked out from a different pool is rejected with
    /// [`PoolError::ForeignResource`] and goes back to the pool it came from.
    pub fn release(&self, resource: PooledResource<R>) -> PoolResult<()> {
        if !Arc::ptr_eq(&self.shared, &resource.shared) {
            warn!("rejected release of resource {} from another pool", resource.id());
            drop(resource);
            return Err(PoolError::ForeignResource);
        }
        resource.release()
    }

    /// Close the pool.
    ///
    /// Further acquisitions fail with [`PoolError::PoolClosed`]. Idle
    /// resources are destroyed at once; checked-out ones are destroyed as
    /// they are released, and this call blocks until all of them have been
    /// (or `close_timeout` passes). Calling it again never destroys a
    /// resource twice.
    pub fn close(&self) -> PoolResult<()> {
        self.shared.shutdown(self.shared.config.close_timeout)
    }

    /// Close the pool, waiting at most `timeout` for outstanding resources.
    /// The pool stays closed if the wait times out.
    pub fn close_timeout(&self, timeout: Duration) -> PoolResult<()> {
        self.shared.shutdown(Some(timeout))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Get available count
    pub fn available_count(&self) -> usize {
        self.shared.state.lock().available.len()
    }

    /// Get checked-out count
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().outstanding
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let (available, active) = self.counts();
        self.shared.metrics.get_metrics(
            active,
            available,
            self.shared.waiting.load(Ordering::Relaxed),
            self.shared.config.capacity,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        let (available, active, closed) = {
            let state = self.shared.state.lock();
            (state.available.len(), state.outstanding, state.closed)
        };
        let longest_hold = self
            .shared
            .active
            .iter()
            .map(|entry| entry.value().elapsed())
            .max();

        HealthStatus::from_sample(HealthSample {
            available,
            active,
            waiting: self.shared.waiting.load(Ordering::Relaxed),
            capacity: self.shared.config.capacity,
            closed,
            longest_hold,
            long_hold_threshold: self.shared.config.long_hold_threshold,
        })
    }

    fn counts(&self) -> (usize, usize) {
        let state = self.shared.state.lock();
        (state.available.len(), state.outstanding)
    }

    fn wrap(&self, slot: PoolResult<Slot<R>>) -> PoolResult<PooledResource<R>> {
        slot.map(|slot| PooledResource::new(slot, Arc::clone(&self.shared)))
    }
}

impl<R: Resource> Drop for ResourcePool<R> {
    fn drop(&mut self) {
        // outstanding guards keep the shared state alive and destroy their own resource
        self.shared.close_idle();
    }
}
