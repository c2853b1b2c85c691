//! Dialing a connection per request versus sharing a pool of ten.
//!
//! The "server" below accepts a limited number of simultaneous connections,
//! each dial costs a millisecond and each query ten. Without a pool, enough
//! concurrent requests exhaust the server; with a pool they queue instead.

use connpool::{PoolError, Resource, ResourcePool};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const DIAL_COST: Duration = Duration::from_millis(1);
const QUERY_COST: Duration = Duration::from_millis(10);
const SERVER_MAX_CONNECTIONS: usize = 200;
const POOL_SIZE: usize = 10;

#[derive(Debug)]
struct DialError(usize);

impl fmt::Display for DialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection reset by peer ({} connections open)", self.0)
    }
}

impl std::error::Error for DialError {}

#[derive(Clone, Default)]
struct Server {
    open: Arc<AtomicUsize>,
}

impl Server {
    fn dial(&self) -> Result<Connection, DialError> {
        thread::sleep(DIAL_COST);
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        if open > SERVER_MAX_CONNECTIONS {
            self.open.fetch_sub(1, Ordering::SeqCst);
            return Err(DialError(open - 1));
        }
        Ok(Connection {
            open: Arc::clone(&self.open),
        })
    }
}

struct Connection {
    open: Arc<AtomicUsize>,
}

impl Connection {
    fn query(&self) {
        thread::sleep(QUERY_COST);
    }
}

impl Resource for Connection {
    fn close(self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

fn without_pool(server: &Server, requests: usize) -> usize {
    let failures = AtomicUsize::new(0);
    crossbeam::scope(|s| {
        for _ in 0..requests {
            s.spawn(|_| match server.dial() {
                Ok(conn) => {
                    conn.query();
                    conn.close();
                }
                Err(_) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    })
    .expect("benchmark thread panicked");
    failures.into_inner()
}

fn with_pool(server: &Server, requests: usize) -> Result<usize, PoolError> {
    let pool = ResourcePool::new(POOL_SIZE, || server.dial())?;
    let failures = AtomicUsize::new(0);
    crossbeam::scope(|s| {
        for _ in 0..requests {
            s.spawn(|_| match pool.acquire() {
                Ok(conn) => conn.query(),
                Err(_) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    })
    .expect("benchmark thread panicked");
    pool.close()?;
    Ok(failures.into_inner())
}

fn main() {
    let server = Server::default();

    println!("Without a pool:");
    for requests in [10, 100, 1000] {
        let start = Instant::now();
        let failures = without_pool(&server, requests);
        println!(
            "   {:5} requests -> {:?} ({} failed to connect)",
            requests,
            start.elapsed(),
            failures
        );
    }

    println!("\nWith a pool of {}:", POOL_SIZE);
    for requests in [10, 100, 1000] {
        let start = Instant::now();
        match with_pool(&server, requests) {
            Ok(failures) => println!(
                "   {:5} requests -> {:?} ({} failed)",
                requests,
                start.elapsed(),
                failures
            ),
            Err(e) => println!("   {:5} requests -> pool error: {}", requests, e),
        }
    }

    println!("\nConnections still open: {}", server.open.load(Ordering::SeqCst));
}
