use thiserror::Error;

/// Maximum accepted length of a caller-supplied document `_id`.
pub const MAX_DOCUMENT_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("document id must not be empty")]
    Empty,
    #[error("document id exceeds {MAX_DOCUMENT_ID_LEN} bytes")]
    TooLong,
    #[error("document id contains control characters")]
    ControlCharacter,
}

/// Generates a new document `_id`.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates a caller-supplied document `_id`.
pub fn validate_document_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.len() > MAX_DOCUMENT_ID_LEN {
        return Err(IdError::TooLong);
    }
    if id.chars().any(char::is_control) {
        return Err(IdError::ControlCharacter);
    }
    Ok(())
}
