//! # binsight-core
//!
//! Shared data-model contracts for the Binsight data-access layer.
//!
//! Both durable stores are addressed through two structural contracts:
//!
//! - [`Record`]: a row in the relational store with an `i64` primary key `id`.
//! - [`Document`]: a schema-free document in a named collection keyed by `_id`.
//!
//! Payloads for create/update calls and exact-match filters are plain
//! [`FieldMap`]s so that the repositories stay generic over the model shape.
//!
//! The concrete waste-bin models live in [`models`].

pub mod error;
pub mod id;
pub mod models;
pub mod record;

pub use error::{CoreError, Result};
pub use id::{IdError, generate_id, validate_document_id};
pub use record::{Document, FieldMap, Record, RecordId, field_map};
