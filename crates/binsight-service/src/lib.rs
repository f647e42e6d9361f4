//! # binsight-service
//!
//! Wiring for the Binsight data-access layer: configuration loading, tracing
//! setup, the [`DataLayer`] that owns every store client, and read-through
//! status lookups. The `binsight` binary uses it to check that every store
//! is reachable.

pub mod config;
pub mod data_layer;
pub mod observability;
pub mod status;

pub use config::{AppConfig, DocumentBackend, LogFormat};
pub use data_layer::{DataLayer, HealthReport, Store};
pub use status::StatusReader;
