//! Sharing a pool between tokio tasks

use connpool::{PoolConfiguration, PoolError, Resource, ResourcePool};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Connection {
    id: usize,
}

impl Resource for Connection {}

impl Connection {
    async fn query(&self, cost: Duration) -> usize {
        tokio::time::sleep(cost).await;
        self.id
    }
}

#[tokio::main]
async fn main() {
    println!("=== connpool - Async Usage ===\n");

    concurrent_tasks().await;
    timeout_and_cancel().await;
}

async fn concurrent_tasks() {
    println!("1. Concurrent Tasks:");
    let mut next = 0;
    let pool = Arc::new(
        ResourcePool::new(4, || {
            next += 1;
            Ok::<_, io::Error>(Connection { id: next })
        })
        .unwrap(),
    );

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..20 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire_async().await?;
            let id = conn.query(Duration::from_millis(10)).await;
            Ok::<_, PoolError>((task, id))
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok((task, id))) => println!("   Task {:2} used connection {}", task, id),
            Ok(Err(e)) => println!("   Task failed: {}", e),
            Err(e) => println!("   Task panicked: {}", e),
        }
    }

    println!("   20 tasks over 4 connections took {:?}", start.elapsed());
    println!("   Waits: {}\n", pool.get_metrics().wait_events);
}

async fn timeout_and_cancel() {
    println!("2. Timeout and Cancellation:");
    let config = PoolConfiguration::new()
        .with_capacity(1)
        .with_acquire_timeout(Duration::from_millis(50));
    let pool = ResourcePool::with_config(config, || Ok::<_, io::Error>(Connection { id: 1 })).unwrap();

    let held = pool.acquire_async().await.unwrap();

    match pool.acquire_async().await {
        Err(e) => println!("   Second acquire: {}", e),
        Ok(_) => println!("   Second acquire: Success"),
    }

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tx.send(());
    });
    let cancelled = pool
        .acquire_or_cancel(async {
            let _ = rx.await;
        })
        .await;
    if let Err(e) = cancelled {
        println!("   Cancellable acquire: {}", e);
    }

    drop(held);
    println!("   Available after return: {}", pool.available_count());
}
