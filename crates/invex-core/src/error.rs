//! Error types for the invex-core library.

use thiserror::Error;

/// Main error type for the invex library.
#[derive(Error, Debug)]
pub enum InvexError {
    /// Record validation error (strict mode only).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Schema loading error.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while checking a record against its schema.
///
/// Outside strict mode violations are only recorded in the record
/// metadata, so this is the single fatal outcome of validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The record violated the schema and strict mode is enabled.
    #[error("validation failed at {path}: {message}")]
    Strict { path: String, message: String },
}

/// Errors related to loading a schema descriptor.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The schema document is not valid JSON.
    #[error("failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),

    /// A `pattern` keyword holds an invalid regular expression.
    #[error("invalid pattern for {field}: {reason}")]
    InvalidPattern { field: String, reason: String },

    /// A keyword the schema engine cannot enforce.
    #[error("unsupported schema keyword '{keyword}' at {field}")]
    UnsupportedKeyword { field: String, keyword: String },

    /// A supported keyword holds a value of the wrong shape.
    #[error("invalid value for schema keyword '{keyword}' at {field}")]
    InvalidKeyword { field: String, keyword: String },

    /// The schema root is not a JSON object.
    #[error("schema root must be an object")]
    NotAnObject,
}

/// Result type for the invex library.
pub type Result<T> = std::result::Result<T, InvexError>;
