//! Core Error Types
//!
//! Defines the foundational error types used across the CodeViz workspace.
//! These error types are dependency-free (only thiserror + serde_json) to keep
//! the core crate lightweight.
//!
//! The main application crate extends these with additional error variants
//! (e.g., Sqlite, ForeignKey, ExternalTool) that require heavier dependencies.

use thiserror::Error;

/// Core error type for the CodeViz workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed path or value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Path syntax errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
