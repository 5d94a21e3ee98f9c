//! Change Log Models
//!
//! Append-only audit records, one per node mutation.

use codeviz_core::NodeValue;
use serde::{Deserialize, Serialize};

use super::project::Metadata;
use crate::utils::error::{AppError, AppResult};

/// Kind of node mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "CREATE",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "CREATE" => Ok(ChangeOperation::Create),
            "UPDATE" => Ok(ChangeOperation::Update),
            "DELETE" => Ok(ChangeOperation::Delete),
            other => Err(AppError::corruption(format!(
                "unknown change operation {:?}",
                other
            ))),
        }
    }
}

/// A row of `changes_log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Monotonic id
    pub id: i64,
    pub project_id: String,
    /// `None` once the node row is gone, or for administrative events
    pub node_id: Option<String>,
    pub operation: ChangeOperation,
    pub old_value: Option<NodeValue>,
    pub new_value: Option<NodeValue>,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ChangeLogEntry {
    /// The node path recorded at mutation time.
    pub fn path(&self) -> Option<&str> {
        self.metadata.get("path").and_then(|v| v.as_str())
    }

    /// Name of the administrative event, if this row is one.
    pub fn event(&self) -> Option<&str> {
        self.metadata.get("event").and_then(|v| v.as_str())
    }
}

/// Insert request for a change-log row
#[derive(Debug, Clone)]
pub struct NewChange {
    pub project_id: String,
    pub node_id: Option<String>,
    pub operation: ChangeOperation,
    pub old_value: Option<NodeValue>,
    pub new_value: Option<NodeValue>,
    pub metadata: Metadata,
}
