//! Error Handling
//!
//! Unified error types for the data core.
//! Uses thiserror for ergonomic error definitions.

use codeviz_core::CoreError;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed path or value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing project, node, snapshot or baseline
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dangling project or parent reference
    #[error("Foreign key error: {0}")]
    ForeignKey(String),

    /// Commit failed; the transaction was rolled back
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Sync divergence that the caller must resolve
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External tool exited non-zero
    #[error("{tool} failed (exit {exit_code}): {stderr}")]
    ExternalTool {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    /// Stored row failed an integrity check on read
    #[error("Corrupted row: {0}")]
    Corruption(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a foreign key error
    pub fn foreign_key(msg: impl Into<String>) -> Self {
        Self::ForeignKey(msg.into())
    }

    /// Create a transaction error
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an external tool error from a failed invocation
    pub fn external_tool(tool: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable kind, used in hook reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::ForeignKey(_) => "foreign_key",
            AppError::Transaction(_) => "transaction",
            AppError::Conflict(_) => "conflict",
            AppError::ExternalTool { .. } => "external_tool",
            AppError::Corruption(_) => "corruption",
            AppError::Database(_) | AppError::Sqlite(_) => "database",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) | CoreError::Parse(msg) => AppError::Validation(msg),
            CoreError::Serialization(e) => AppError::Serialization(e),
        }
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::database(format!("Failed to get connection: {}", err))
    }
}

/// Convert AppError to a string suitable for front-end command responses
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
