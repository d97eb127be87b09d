//! Error types for the pool registry

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("no pool registered for key {0}")]
    PoolNotFound(String),

    #[error("pool is at maximum capacity ({max_size}) with no inactive instance")]
    PoolExhausted { max_size: usize },

    #[error("instance is not active in the target pool")]
    NotOwned,

    #[error("instance resource is still locked by a held guard")]
    InstanceBusy,

    #[error("pool has been disposed")]
    PoolDisposed,

    #[error("invalid pool spec: {0}")]
    InvalidSpec(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
