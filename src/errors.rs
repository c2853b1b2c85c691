//! Error types for the resource pool

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by a resource factory.
pub type FactoryError = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool capacity must be at least 1")]
    InvalidCapacity,

    #[error("Failed to create resource #{index}: {source}")]
    ConstructionFailed {
        index: usize,
        #[source]
        source: FactoryError,
    },

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Resource does not belong to this pool")]
    ForeignResource,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Sharded pool needs at least one shard")]
    NoShards,

    #[error("Failed to export metrics: {0}")]
    MetricsExport(String),
}

impl PoolError {
    pub(crate) fn construction<E>(index: usize, err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        PoolError::ConstructionFailed {
            index,
            source: Arc::from(err.into()),
        }
    }

    /// Whether the error means the pool will never hand out a resource again
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::PoolClosed)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
