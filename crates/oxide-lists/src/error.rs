//! Error types for list declarations.

use thiserror::Error;

/// Errors raised while declaring or materializing lists.
#[derive(Debug, Error)]
pub enum ListError {
    /// Two lists share the same key.
    #[error("list '{0}' is declared more than once")]
    DuplicateList(String),

    /// Two fields of one list share the same path.
    #[error("field '{field}' is declared more than once on list '{list}'")]
    DuplicateField {
        /// List key.
        list: String,
        /// Field path.
        field: String,
    },

    /// A field attribute has an unusable value.
    #[error("invalid attribute '{attribute}' on field '{field}': {message}")]
    InvalidAttribute {
        /// Field path.
        field: String,
        /// Attribute name.
        attribute: String,
        /// What is wrong with it.
        message: String,
    },

    /// The field has no column representation of its own.
    #[error("field '{0}' cannot be materialized as a column")]
    NotMaterializable(String),

    /// The declaration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The declaration file is not valid JSON for a list registry.
    #[error("invalid list declarations: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for declaration operations.
pub type Result<T> = std::result::Result<T, ListError>;
