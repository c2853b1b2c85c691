//! Routing keys across several independent pools

use crate::errors::{PoolError, PoolResult};
use crate::pool::{PooledResource, ResourcePool};
use crate::resource::Resource;

use log::debug;

/// Index of the shard that owns `key`. Always the same for the same
/// key and shard count.
///
/// # Panics
///
/// Panics if `shard_count` is zero.
pub fn shard_index(key: u64, shard_count: usize) -> usize {
    assert!(shard_count > 0, "shard_index needs at least one shard");
    (key % shard_count as u64) as usize
}

/// A fixed set of pools, one per shard, selected by key
///
/// # Examples
///
/// ```
/// use connpool::{Resource, ResourcePool, ShardedPool};
///
/// struct Conn(&'static str);
/// impl Resource for Conn {}
///
/// let shards = ShardedPool::new(vec![
///     ResourcePool::new(2, || Ok::<_, std::io::Error>(Conn("primary"))).unwrap(),
///     ResourcePool::new(2, || Ok::<_, std::io::Error>(Conn("secondary"))).unwrap(),
/// ])
/// .unwrap();
///
/// assert_eq!(shards.acquire(42).unwrap().0, "primary");
/// assert_eq!(shards.acquire(7).unwrap().0, "secondary");
/// ```
pub struct ShardedPool<R: Resource> {
    shards: Vec<ResourcePool<R>>,
}

impl<R: Resource> ShardedPool<R> {
    pub fn new(shards: Vec<ResourcePool<R>>) -> PoolResult<Self> {
        if shards.is_empty() {
            return Err(PoolError::NoShards);
        }
        Ok(Self { shards })
    }

    /// Number of shards
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn shard_index(&self, key: u64) -> usize {
        shard_index(key, self.shards.len())
    }

    /// The pool responsible for `key`
    pub fn pool_for(&self, key: u64) -> &ResourcePool<R> {
        &self.shards[self.shard_index(key)]
    }

    /// Acquire a resource from the shard owning `key`
    pub fn acquire(&self, key: u64) -> PoolResult<PooledResource<R>> {
        self.pool_for(key).acquire()
    }

    pub fn shards(&self) -> &[ResourcePool<R>] {
        &self.shards
    }

    /// Close every shard. All shards are closed even if one fails; the first
    /// error is returned.
    pub fn close(&self) -> PoolResult<()> {
        let mut first_err = None;
        for (index, shard) in self.shards.iter().enumerate() {
            if let Err(e) = shard.close() {
                debug!("closing shard {} failed: {}", index, e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
