// Tracing initialization with a configurable and reloadable log level.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::{LogFormat, LoggingConfig};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

pub fn init_tracing(logging: &LoggingConfig) {
    // Prefer RUST_LOG from env, otherwise use the configured level.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(&logging.level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let registry = tracing_subscriber::registry().with(reload_layer);
    let _ = match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
}

/// Apply a new logging level at runtime if the reload handle is configured.
///
/// Returns false when tracing was not initialised here or `level` does not parse.
pub fn apply_logging_level(level: &str) -> bool {
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return false;
    };
    match EnvFilter::try_new(level) {
        Ok(filter) => handle.modify(|f| *f = filter).is_ok(),
        Err(e) => {
            tracing::warn!(level, error = %e, "Ignoring invalid log level");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_level_after_init() {
        assert!(!apply_logging_level("debug"));

        init_tracing(&LoggingConfig {
            level: "info".into(),
            format: LogFormat::Pretty,
        });
        assert!(apply_logging_level("warn"));
        assert!(apply_logging_level("binsight_cache=debug,info"));
        assert!(!apply_logging_level("binsight=loud"));
    }
}
