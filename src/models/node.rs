//! Node Models
//!
//! Persisted nodes of the hierarchical document tree. Parent links are ids
//! resolved through the store, never in-memory references.

use codeviz_core::NodeValue;
use serde::{Deserialize, Serialize};

use super::project::Metadata;

/// A persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Parent node id; `None` for top-level nodes
    pub parent_id: Option<String>,
    /// Canonical path, unique within the project
    pub path: String,
    pub value: NodeValue,
    /// Type tag (`string`, `file`, ...); unset for structural nodes
    pub node_type: Option<String>,
    /// Language tag for nodes projected from source files
    pub language: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert request for a new node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNode {
    /// Pre-assigned id; generated when `None`
    pub id: Option<String>,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub path: String,
    pub value: NodeValue,
    pub node_type: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewNode {
    pub fn new(project_id: impl Into<String>, path: impl Into<String>, value: NodeValue) -> Self {
        Self {
            project_id: project_id.into(),
            path: path.into(),
            value,
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Partial node update. `Some(None)` clears an optional tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePatch {
    pub value: Option<NodeValue>,
    pub node_type: Option<Option<String>>,
    pub language: Option<Option<String>>,
    pub metadata: Option<Metadata>,
}

impl NodePatch {
    pub fn value(value: NodeValue) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.node_type.is_none()
            && self.language.is_none()
            && self.metadata.is_none()
    }
}
