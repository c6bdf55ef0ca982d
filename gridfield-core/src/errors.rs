use thiserror::Error;

/// Error type for field assembly and field-list queries.
#[derive(Error, Debug)]
pub enum FieldError {
    /// Coordinates and values cannot be reconciled into a grid shape
    #[error("Cannot resolve geometry: {0}")]
    Geometry(String),
    #[error("Cannot construct field: {message}")]
    FieldConstruction {
        message: String,
        #[source]
        source: Option<Box<FieldError>>,
    },
    #[error("Required metadata key '{0}' is missing")]
    MissingMetadata(String),
    #[error("Metadata key '{key}' has an invalid value: {message}")]
    InvalidMetadata { key: String, message: String },
    #[error("Fields do not share a common shape. Expected {expected}, got {found}")]
    ShapeMismatch { expected: String, found: String },
    #[error("Metadata key '{0}' is not present on any field")]
    KeyNotFound(String),
    #[error("Index {index} is out of range for a field list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FieldError {
    pub(crate) fn construction(message: impl Into<String>) -> Self {
        FieldError::FieldConstruction {
            message: message.into(),
            source: None,
        }
    }
}

/// Convenience type for `Result<T, FieldError>`.
pub type FieldResult<T> = Result<T, FieldError>;
