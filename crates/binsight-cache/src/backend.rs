//! Cache backends: process-local or Redis.

use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::error::CacheResult;
use crate::local::LocalStore;

/// Key-value store behind the cache overlay.
///
/// ## Modes
///
/// - **Local**: single-instance, entries live in this process
/// - **Redis**: shared across instances through a pooled Redis connection
///
/// Both modes store UTF-8 strings with millisecond TTLs.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<LocalStore>),

    /// Multi-instance: Redis
    Redis(Pool),
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CacheBackend").field(&self.mode()).finish()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(LocalStore::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(pool: Pool) -> Self {
        CacheBackend::Redis(pool)
    }

    /// Returns `"local"` or `"redis"`.
    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis(_) => "redis",
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            CacheBackend::Local(store) => Ok(store.get(key)),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                Ok(conn.get(key).await?)
            }
        }
    }

    /// Stores `value` under `key` for `ttl` (PSETEX).
    pub async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        match self {
            CacheBackend::Local(store) => {
                store.set_ex(key, value, ttl);
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl)).await?;
                Ok(())
            }
        }
    }

    /// Atomically increments the counter at `key`, creating it at 1.
    pub async fn incr(&self, key: &str) -> CacheResult<i64> {
        match self {
            CacheBackend::Local(store) => store.incr(key),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                Ok(conn.incr(key, 1i64).await?)
            }
        }
    }

    /// Sets the expiry of `key` (PEXPIRE). Returns false if the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        match self {
            CacheBackend::Local(store) => Ok(store.expire(key, ttl)),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
                Ok(conn.pexpire(key, millis).await?)
            }
        }
    }

    /// Lists keys matching a glob pattern (KEYS). Linear in the key space.
    pub async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        match self {
            CacheBackend::Local(store) => store.keys(pattern),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                Ok(conn.keys(pattern).await?)
            }
        }
    }

    /// Reads several keys at once (MGET). Missing keys are `None`.
    pub async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            CacheBackend::Local(store) => Ok(store.mget(keys)),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                Ok(conn.mget(keys).await?)
            }
        }
    }

    /// Deletes keys (DEL) and returns how many existed.
    pub async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        match self {
            CacheBackend::Local(store) => Ok(store.del(keys)),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                Ok(conn.del(keys).await?)
            }
        }
    }

    /// Health check: the local backend is always available, Redis when a
    /// pooled connection can be obtained.
    pub async fn is_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => true,
            CacheBackend::Redis(pool) => pool.get().await.is_ok(),
        }
    }
}

/// Creates the cache backend described by `config`.
///
/// Falls back to the local backend when Redis is disabled, the pool cannot be
/// built, or no connection can be established.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Some(Duration::from_millis(config.timeout_ms));
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size.max(1));
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::new_local();
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            CacheBackend::new_redis(pool)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            CacheBackend::new_local()
        }
    }
}
