use std::env;
use std::process::ExitCode;

use anyhow::Context;
use binsight_service::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use binsight_service::{AppConfig, DataLayer, observability};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From BINSIGHT_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (binsight.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (BINSIGHT_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; only report files that exist but fail to load.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    observability::init_tracing(&cfg.logging);
    tracing::info!(path = %config_path, source = %source, "Configuration loaded");

    match run(&cfg).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Data layer startup failed");
            ExitCode::FAILURE
        }
    }
}

/// Connects every store and reports its health. Returns false if the
/// relational store is unreachable.
async fn run(cfg: &AppConfig) -> anyhow::Result<bool> {
    let layer = DataLayer::connect(cfg)
        .await
        .context("failed to connect to PostgreSQL")?;

    let health = layer.health().await;
    tracing::info!(
        relational = health.relational,
        documents = health.documents,
        cache.mode = health.cache_mode,
        cache.available = health.cache_available,
        "Health summary"
    );

    let critical = layer.status_reader().critical_bins().await;
    if critical.is_empty() {
        tracing::info!(
            threshold = cfg.cache.critical_fill_threshold,
            "No critical bins"
        );
    } else {
        tracing::warn!(
            threshold = cfg.cache.critical_fill_threshold,
            count = critical.len(),
            bins = ?critical,
            "Critical bins"
        );
    }

    layer.close().await;
    Ok(health.relational)
}

fn resolve_config_path() -> (String, ConfigSource) {
    let args: Vec<String> = env::args().skip(1).collect();
    let from_cli = args.iter().enumerate().find_map(|(i, arg)| {
        match arg.strip_prefix("--config") {
            Some("") => args.get(i + 1).cloned(),
            Some(rest) => rest.strip_prefix('=').map(str::to_string),
            None => None,
        }
    });
    if let Some(path) = from_cli {
        return (path, ConfigSource::CliArgument);
    }

    match env::var("BINSIGHT_CONFIG") {
        Ok(path) if !path.is_empty() => (path, ConfigSource::EnvironmentVariable),
        _ => (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default),
    }
}
