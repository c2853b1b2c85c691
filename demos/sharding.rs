//! Online/offline indicator over two shards.
//!
//! Each user's heartbeats land on the shard picked by `user_id % shards`,
//! and every shard has its own pool of connections.

use connpool::{PoolError, Resource, ResourcePool, ShardedPool};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stand-in for one database: user id -> last heartbeat (unix seconds)
type Table = Arc<DashMap<u64, u64>>;

struct Connection {
    table: Table,
}

impl Resource for Connection {}

impl Connection {
    fn record_heartbeat(&self, user_id: u64, at: u64) {
        self.table.insert(user_id, at);
    }

    fn last_heartbeat(&self, user_id: u64) -> Option<u64> {
        self.table.get(&user_id).map(|at| *at)
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn is_online(shards: &ShardedPool<Connection>, user_id: u64) -> Result<bool, PoolError> {
    let conn = shards.acquire(user_id)?;
    Ok(conn
        .last_heartbeat(user_id)
        .is_some_and(|at| now().saturating_sub(at) <= HEARTBEAT_TIMEOUT.as_secs()))
}

fn main() -> Result<(), PoolError> {
    println!("=== connpool - Sharded Heartbeats ===\n");

    let tables: Vec<Table> = vec![Arc::default(), Arc::default()];
    let pools = tables
        .iter()
        .map(|table| {
            ResourcePool::new(4, || {
                Ok::<_, PoolError>(Connection {
                    table: Arc::clone(table),
                })
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let shards = ShardedPool::new(pools)?;

    for user_id in 1..=6u64 {
        let conn = shards.acquire(user_id)?;
        let at = if user_id == 4 { now() - 120 } else { now() };
        conn.record_heartbeat(user_id, at);
        println!("   user {} -> shard {}", user_id, shards.shard_index(user_id));
    }

    println!();
    for user_id in 1..=7u64 {
        println!("   user {} online: {}", user_id, is_online(&shards, user_id)?);
    }

    for (index, table) in tables.iter().enumerate() {
        println!("   shard {} holds {} user(s)", index, table.len());
    }

    shards.close()
}
