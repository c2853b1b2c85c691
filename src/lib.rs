//! # connpool
//!
//! Bounded, blocking pool for expensive stateful resources such as database
//! sessions. A fixed number of resources is created up front and shared by
//! any number of threads or tasks.
//!
//! ## Features
//!
//! - Eager construction with rollback if the factory fails
//! - Blocking, deadline-bounded and async acquisition
//! - Automatic return of resources via RAII (Drop trait)
//! - Draining shutdown: every resource is closed exactly once
//! - Metrics, Prometheus export and health status
//! - Key-based routing over several pools
//!
//! ## Quick Start
//!
//! ```rust
//! use connpool::{Resource, ResourcePool};
//!
//! struct Session {
//!     id: usize,
//! }
//!
//! impl Resource for Session {}
//!
//! let mut next_id = 0;
//! let pool = ResourcePool::new(3, || {
//!     next_id += 1;
//!     Ok::<_, std::io::Error>(Session { id: next_id })
//! })
//! .unwrap();
//!
//! {
//!     let session = pool.acquire().unwrap();
//!     println!("Got session {}", session.id);
//!     // Session automatically returned when `session` goes out of scope
//! }
//!
//! pool.close().unwrap();
//! ```

mod config;
mod errors;
mod health;
mod metrics;
mod pool;
mod resource;
mod shard;

pub use config::PoolConfiguration;
pub use errors::{FactoryError, PoolError, PoolResult};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{PooledResource, ResourcePool};
pub use resource::Resource;
pub use shard::{ShardedPool, shard_index};
