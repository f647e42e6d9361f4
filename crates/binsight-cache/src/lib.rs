//! Ephemeral cache overlay for Binsight.
//!
//! ## Architecture
//!
//! - [`CacheBackend`]: local in-process store or Redis, chosen by
//!   [`create_cache_backend`]
//! - [`CacheService`]: the overlay operations (status, message, analytics and
//!   detection caching, rate counters, connection tracking, critical scans)
//! - [`RateLimitPolicy`]: allow/deny decisions on top of the rate counters
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable or disabled, the local backend is used. Backend
//! failures never reach callers: reads become misses and writes report
//! `false`.

mod backend;
mod config;
mod error;
pub mod keys;
mod local;
mod rate_limit;
mod service;

pub use backend::{CacheBackend, create_cache_backend};
pub use config::{CacheConfig, RateLimitConfig, RedisConfig};
pub use error::{CacheError, CacheResult};
pub use local::{LocalStore, glob_to_regex};
pub use rate_limit::{FailureMode, RateDecision, RateLimitPolicy};
pub use service::{CacheService, DEFAULT_RATE_WINDOW};
