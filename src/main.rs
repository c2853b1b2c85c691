// This is just a binary wrapper - the actual library is in lib.rs
// Run demos with: cargo run --example basic

use connpool::{PoolError, Resource, ResourcePool};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Session {
    id: usize,
}

impl Resource for Session {
    fn close(self) {
        println!("  Closed session {}", self.id);
    }
}

fn main() -> Result<(), PoolError> {
    println!("=== connpool ===");
    println!("See demos/ directory for usage examples");
    println!("Run: cargo run --example benchmark");
    println!();

    println!("Quick Demo:");
    let mut next_id = 0;
    let pool = Arc::new(ResourcePool::new(2, || {
        next_id += 1;
        Ok::<_, PoolError>(Session { id: next_id })
    })?);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || -> Result<(), PoolError> {
                let session = pool.acquire()?;
                println!("  Worker {} got session {}", worker, session.id);
                thread::sleep(Duration::from_millis(10));
                session.release()
            })
        })
        .collect();

    for worker in workers {
        if let Ok(Err(e)) = worker.join() {
            println!("  Worker failed: {}", e);
        }
    }

    println!("  Available after work: {}", pool.available_count());
    pool.close()?;
    println!("  Closed: {}", pool.is_closed());
    Ok(())
}
