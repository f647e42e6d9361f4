//! Errors raised by cache backends.
//!
//! These never leave [`CacheService`](crate::CacheService): it logs and
//! counts them, then degrades to a miss.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid key pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Value at '{key}' is not an integer")]
    NotAnInteger { key: String },

    #[error("Cannot encode cached value: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
