use thiserror::Error;

/// Errors raised while converting between models and field maps.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Expected a JSON object for {model}, got {found}")]
    NotAnObject { model: &'static str, found: String },

    #[error("Invalid document ID: {0}")]
    InvalidId(#[from] crate::id::IdError),
}

impl CoreError {
    /// Create a new NotAnObject error
    pub fn not_an_object(model: &'static str, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Self::NotAnObject {
            model,
            found: found.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
