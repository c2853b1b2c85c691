use connpool::{PoolConfiguration, PoolError, Resource, ResourcePool};

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Shared bookkeeping for every connection a test creates
#[derive(Default)]
struct Tracker {
    created: AtomicUsize,
    closed: AtomicUsize,
    close_calls_per_id: parking_lot::Mutex<Vec<usize>>,
}

struct TestConn {
    id: usize,
    tracker: Arc<Tracker>,
}

impl Resource for TestConn {
    fn close(self) {
        self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        self.tracker.close_calls_per_id.lock()[self.id] += 1;
    }
}

fn tracked_pool(config: PoolConfiguration) -> (ResourcePool<TestConn>, Arc<Tracker>) {
    let tracker = Arc::new(Tracker::default());
    *tracker.close_calls_per_id.lock() = vec![0; config.capacity];

    let factory_tracker = Arc::clone(&tracker);
    let pool = ResourcePool::with_config(config, move || {
        let id = factory_tracker.created.fetch_add(1, Ordering::SeqCst);
        Ok::<_, io::Error>(TestConn {
            id,
            tracker: Arc::clone(&factory_tracker),
        })
    })
    .unwrap();
    (pool, tracker)
}

fn pool_of(capacity: usize) -> (ResourcePool<TestConn>, Arc<Tracker>) {
    tracked_pool(PoolConfiguration::new().with_capacity(capacity))
}

#[test]
fn capacity_is_never_exceeded_under_contention() {
    const CAPACITY: usize = 10;
    let (pool, tracker) = pool_of(CAPACITY);
    let live = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..CAPACITY * 10 {
            s.spawn(|_| {
                for _ in 0..5 {
                    let conn = pool.acquire().unwrap();
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    assert!(now <= CAPACITY);
                    thread::sleep(Duration::from_micros(200));
                    live.fetch_sub(1, Ordering::SeqCst);
                    drop(conn);
                }
            });
        }
    })
    .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    assert_eq!(pool.available_count(), CAPACITY);
    assert_eq!(tracker.created.load(Ordering::SeqCst), CAPACITY);

    let metrics = pool.get_metrics();
    assert_eq!(metrics.total_acquired, CAPACITY * 10 * 5);
    assert_eq!(metrics.total_released, CAPACITY * 10 * 5);
}

#[test]
fn sequential_cycles_return_every_resource() {
    let (pool, _) = pool_of(4);

    for _ in 0..50 {
        let conn = pool.acquire().unwrap();
        assert_eq!(pool.available_count(), 3);
        conn.release().unwrap();
        assert_eq!(pool.available_count(), 4);
    }

    let held: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
    let ids: HashSet<usize> = held.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(pool.available_count(), 0);
}

#[test]
fn second_acquire_waits_for_release() {
    let (pool, _) = pool_of(1);
    let pool = Arc::new(pool);
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let start = Instant::now();
            let conn = pool.acquire().unwrap();
            (start.elapsed(), conn.id)
        })
    };

    thread::sleep(Duration::from_millis(100));
    let held_id = held.id;
    pool.release(held).unwrap();

    let (waited, id) = waiter.join().unwrap();
    assert!(waited >= Duration::from_millis(80), "waited only {:?}", waited);
    assert_eq!(id, held_id);
    assert_eq!(pool.get_metrics().wait_events, 1);
}

#[test]
fn acquire_after_close_fails_promptly() {
    let (pool, tracker) = pool_of(3);
    pool.close().unwrap();

    let start = Instant::now();
    assert!(matches!(pool.acquire(), Err(PoolError::PoolClosed)));
    assert!(matches!(
        pool.acquire_timeout(Duration::from_secs(5)),
        Err(PoolError::PoolClosed)
    ));
    assert!(matches!(pool.try_acquire(), Err(PoolError::PoolClosed)));
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(tracker.closed.load(Ordering::SeqCst), 3);
    assert_eq!(pool.get_metrics().closed_rejections, 3);
}

#[test]
fn close_wakes_blocked_waiters() {
    let (pool, _) = pool_of(1);
    let held = pool.acquire().unwrap();

    crossbeam::scope(|s| {
        let waiters: Vec<_> = (0..3).map(|_| s.spawn(|_| pool.acquire().map(|c| c.id))).collect();

        thread::sleep(Duration::from_millis(50));
        let closer = s.spawn(|_| pool.close());

        for waiter in waiters {
            assert!(matches!(waiter.join().unwrap(), Err(PoolError::PoolClosed)));
        }

        // close is still draining the checked-out resource
        thread::sleep(Duration::from_millis(20));
        assert!(matches!(held.release(), Err(PoolError::PoolClosed)));
        closer.join().unwrap().unwrap();
    })
    .unwrap();
}

#[test]
fn close_drains_outstanding_resources() {
    let (pool, tracker) = pool_of(3);
    let pool = Arc::new(pool);
    let held = pool.acquire().unwrap();

    let closer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let start = Instant::now();
            pool.close().unwrap();
            start.elapsed()
        })
    };

    thread::sleep(Duration::from_millis(100));
    // idle ones are gone, the borrowed one is still usable
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 2);
    assert!(pool.is_closed());
    assert!(held.held_for() >= Duration::from_millis(100));

    drop(held);
    let waited = closer.join().unwrap();
    assert!(waited >= Duration::from_millis(80));
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 3);
}

#[test]
fn close_twice_destroys_each_resource_once() {
    let (pool, tracker) = pool_of(5);
    let conn = pool.acquire().unwrap();
    drop(conn);

    pool.close().unwrap();
    pool.close().unwrap();
    drop(pool);

    assert_eq!(tracker.closed.load(Ordering::SeqCst), 5);
    assert!(tracker.close_calls_per_id.lock().iter().all(|&calls| calls == 1));
}

#[test]
fn close_timeout_leaves_pool_closed() {
    let (pool, tracker) = pool_of(2);
    let held = pool.acquire().unwrap();

    let result = pool.close_timeout(Duration::from_millis(30));
    assert!(matches!(result, Err(PoolError::Timeout(_))));
    assert!(pool.is_closed());

    assert!(matches!(held.release(), Err(PoolError::PoolClosed)));
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 2);
    pool.close().unwrap();
}

#[test]
fn failed_construction_leaves_nothing_open() {
    for failing_call in 1..=4 {
        let tracker = Arc::new(Tracker::default());
        *tracker.close_calls_per_id.lock() = vec![0; 4];

        let factory_tracker = Arc::clone(&tracker);
        let result = ResourcePool::new(4, move || {
            let id = factory_tracker.created.fetch_add(1, Ordering::SeqCst);
            if id + 1 == failing_call {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "dial failed"));
            }
            Ok(TestConn {
                id,
                tracker: Arc::clone(&factory_tracker),
            })
        });

        match result {
            Err(PoolError::ConstructionFailed { index, source }) => {
                assert_eq!(index, failing_call - 1);
                assert_eq!(source.to_string(), "dial failed");
            }
            _ => panic!("construction should fail at call {}", failing_call),
        }
        assert_eq!(tracker.created.load(Ordering::SeqCst), failing_call);
        assert_eq!(tracker.closed.load(Ordering::SeqCst), failing_call - 1);
    }
}

#[test]
fn factory_is_called_exactly_capacity_times() {
    let (pool, tracker) = pool_of(7);
    assert_eq!(tracker.created.load(Ordering::SeqCst), 7);
    assert_eq!(pool.capacity(), 7);
    assert_eq!(pool.available_count(), 7);
}

#[test]
fn foreign_release_is_rejected() {
    let (first, _) = pool_of(2);
    let (second, _) = pool_of(2);

    let conn = second.acquire().unwrap();
    assert!(matches!(first.release(conn), Err(PoolError::ForeignResource)));

    assert_eq!(first.available_count(), 2);
    assert_eq!(second.available_count(), 2);
    assert_eq!(second.active_count(), 0);
}

#[test]
fn from_resources_uses_given_set() {
    let tracker = Arc::new(Tracker::default());
    *tracker.close_calls_per_id.lock() = vec![0; 2];
    let resources = (0..2)
        .map(|id| TestConn {
            id,
            tracker: Arc::clone(&tracker),
        })
        .collect();

    let pool = ResourcePool::from_resources(resources, PoolConfiguration::default()).unwrap();
    assert_eq!(pool.capacity(), 2);

    pool.close().unwrap();
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 2);
}

#[test]
fn acquire_until_respects_deadline() {
    let (pool, _) = pool_of(1);
    let _held = pool.acquire().unwrap();

    let deadline = Instant::now() + Duration::from_millis(40);
    assert!(matches!(pool.acquire_until(deadline), Err(PoolError::Timeout(_))));
    assert!(Instant::now() >= deadline);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_acquire_waits_for_release() {
    let (pool, _) = pool_of(1);
    let pool = Arc::new(pool);
    let held = pool.acquire_async().await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            let start = Instant::now();
            let conn = pool.acquire_async().await.unwrap();
            (start.elapsed(), conn.id)
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let held_id = held.id;
    drop(held);

    let (waited, id) = waiter.await.unwrap();
    assert!(waited >= Duration::from_millis(40));
    assert_eq!(id, held_id);
}

#[tokio::test]
async fn async_acquire_times_out() {
    let config = PoolConfiguration::new()
        .with_capacity(1)
        .with_acquire_timeout(Duration::from_millis(20));
    let (pool, _) = tracked_pool(config);
    let _held = pool.acquire().unwrap();

    assert!(matches!(pool.acquire_async().await, Err(PoolError::Timeout(_))));
    assert_eq!(pool.get_metrics().waiting_callers, 0);
}

#[tokio::test]
async fn async_waiter_gets_release_before_close() {
    let (pool, _) = pool_of(1);
    let pool = Arc::new(pool);
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire_async().await.map(|c| c.id) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    drop(held);
    // resource went back to the waiter before close
    assert!(waiter.await.unwrap().is_ok());

    assert!(pool.close_timeout(Duration::from_secs(1)).is_ok());
    assert!(matches!(pool.acquire_async().await, Err(PoolError::PoolClosed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_wakes_async_waiter() {
    let (pool, tracker) = pool_of(1);
    let pool = Arc::new(pool);
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire_async().await.map(|c| c.id) })
    };
    while pool.get_metrics().waiting_callers == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let closer = {
        let pool = Arc::clone(&pool);
        tokio::task::spawn_blocking(move || pool.close())
    };

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("async waiter was not woken by close")
        .unwrap();
    assert!(matches!(result, Err(PoolError::PoolClosed)));

    assert!(matches!(held.release(), Err(PoolError::PoolClosed)));
    closer.await.unwrap().unwrap();
    assert_eq!(tracker.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn metrics_track_lifecycle() {
    let (pool, _) = pool_of(2);
    {
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        let metrics = pool.get_metrics();
        assert_eq!(metrics.active_resources, 2);
        assert_eq!(metrics.available_resources, 0);
        assert!((metrics.utilization - 1.0).abs() < f64::EPSILON);
    }
    pool.close().unwrap();

    let metrics = pool.get_metrics();
    assert_eq!(metrics.total_acquired, 2);
    assert_eq!(metrics.total_released, 2);
    assert_eq!(metrics.destroyed_resources, 2);
    assert_eq!(pool.export_metrics()["destroyed_resources"], "2");
}
