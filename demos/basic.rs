//! Basic usage examples for ResourcePool

use connpool::{PoolConfiguration, PoolError, Resource, ResourcePool};
use std::io;
use std::time::Duration;

#[derive(Debug)]
struct Connection {
    id: usize,
}

impl Resource for Connection {
    fn close(self) {
        println!("   Closing connection {}", self.id);
    }
}

fn connections(capacity: usize) -> ResourcePool<Connection> {
    let mut next = 0;
    ResourcePool::new(capacity, || {
        next += 1;
        Ok::<_, io::Error>(Connection { id: next })
    })
    .unwrap()
}

fn main() {
    println!("=== connpool - Basic Examples ===\n");

    // Example 1: Scoped acquisition
    simple_pool();

    // Example 2: Pool with configuration
    configured_pool();

    // Example 3: Try and timeout
    try_methods();

    // Example 4: Factory failure
    failing_factory();

    // Example 5: Metrics and health
    metrics_and_health();
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = connections(3);

    {
        let conn = pool.acquire().unwrap();
        println!("   Got connection: {}", conn.id);
        // Returned when dropped
    }

    println!("   Available after return: {}\n", pool.available_count());
}

fn configured_pool() {
    println!("2. Configured Pool:");

    let config = PoolConfiguration::new()
        .with_capacity(5)
        .with_acquire_timeout(Duration::from_millis(100));

    let mut next = 0;
    let pool = ResourcePool::with_config(config, || {
        next += 1;
        Ok::<_, io::Error>(Connection { id: next })
    })
    .unwrap();

    {
        let _conn1 = pool.acquire().unwrap();
        let _conn2 = pool.acquire().unwrap();
        println!("   Active connections: {}", pool.active_count());
        println!("   Available connections: {}", pool.available_count());
    }

    println!("   After return - Available: {}\n", pool.available_count());
}

fn try_methods() {
    println!("3. Try and Timeout:");
    let pool = connections(1);

    let conn1 = pool.try_acquire().unwrap();
    assert!(conn1.is_some());
    println!("   First try: Success");

    assert!(pool.try_acquire().unwrap().is_none());
    println!("   Second try: None (all connections checked out)");

    match pool.acquire_timeout(Duration::from_millis(50)) {
        Err(PoolError::Timeout(after)) => println!("   Timed out after {:?}", after),
        other => println!("   Unexpected: {:?}", other.map(|c| c.id)),
    }

    drop(conn1);

    assert!(pool.try_acquire().unwrap().is_some());
    println!("   Third try: Success\n");
}

fn failing_factory() {
    println!("4. Factory Failure:");
    let mut dialed = 0;
    let result = ResourcePool::new(3, || {
        dialed += 1;
        if dialed == 3 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"));
        }
        Ok(Connection { id: dialed })
    });

    match result {
        Err(e) => println!("   Pool not created: {}\n", e),
        Ok(_) => println!("   Pool created\n"),
    }
}

fn metrics_and_health() {
    println!("5. Metrics and Health:");
    let pool = connections(5);

    {
        let _conn1 = pool.acquire().unwrap();
        let _conn2 = pool.acquire().unwrap();

        let health = pool.get_health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   Active: {}, Available: {}", health.active_resources, health.available_resources);
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }

    pool.close().unwrap();
    println!("   Closed after draining");
}
