use binsight_cache::{CacheConfig, RateLimitConfig, RedisConfig};
use binsight_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub postgres: PostgresConfig,
    /// Where document collections are stored
    #[serde(default)]
    pub documents: DocumentsConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache overlay TTLs and thresholds
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Storage validations
        if self.postgres.url.trim().is_empty() {
            return Err("postgres.url must not be empty".into());
        }
        if self.postgres.pool_size == 0 {
            return Err("postgres.pool_size must be > 0".into());
        }
        if self.redis.enabled && self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        // Cache validations
        let ttls = [
            ("status_ttl_secs", self.cache.status_ttl_secs),
            ("message_ttl_secs", self.cache.message_ttl_secs),
            ("analytics_ttl_secs", self.cache.analytics_ttl_secs),
            ("detection_ttl_secs", self.cache.detection_ttl_secs),
            ("connection_ttl_secs", self.cache.connection_ttl_secs),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, ttl)| *ttl == 0) {
            return Err(format!("cache.{name} must be > 0"));
        }
        if self.cache.critical_fill_threshold > 100 {
            return Err("cache.critical_fill_threshold must be within 0..=100".into());
        }
        if self.cache.message_topic_root.is_empty() {
            return Err("cache.message_topic_root must not be empty".into());
        }
        // Rate limit validations
        if self.rate_limit.per_minute == 0 {
            return Err("rate_limit.per_minute must be > 0".into());
        }
        if self.rate_limit.burst < self.rate_limit.per_minute {
            return Err("rate_limit.burst must be >= rate_limit.per_minute".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentsConfig {
    #[serde(default)]
    pub backend: DocumentBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// File read when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "binsight.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        // A missing file is fine; defaults and the environment still apply.
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., BINSIGHT__REDIS__URL=redis://cache:6379/0
        builder = builder.add_source(
            Environment::with_prefix("BINSIGHT")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
