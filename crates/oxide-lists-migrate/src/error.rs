//! Error types for the migration engine.

use std::path::PathBuf;

use oxide_lists::error::ListError;

/// Errors that can occur while planning or applying modifications.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The declarations or the plan inputs make a run impossible.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A modification could not be applied to the database.
    #[error("Failed to apply '{modification}': {source}")]
    StructuralConflict {
        /// Description of the offending modification.
        modification: String,
        /// Underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// A persisted plan artifact could not be parsed.
    #[error("Failed to parse '{path}': {source}")]
    Artifact {
        /// Path to the artifact.
        path: PathBuf,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// Another run stored a snapshot after this plan was computed.
    #[error("Schema history moved from snapshot {expected:?} to {found:?} since the plan was computed")]
    ConcurrentRun {
        /// Snapshot the plan was diffed against.
        expected: Option<i64>,
        /// Latest snapshot found at save time.
        found: Option<i64>,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Declaration error raised by a list or field.
    #[error("List error: {0}")]
    List(#[from] ListError),

    /// IO error (reading/writing plan artifacts).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// Builds a [`MigrateError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wraps this error with the modification that caused it.
    #[must_use]
    pub fn while_applying(self, modification: impl Into<String>) -> Self {
        Self::StructuralConflict {
            modification: modification.into(),
            source: Box::new(self),
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
