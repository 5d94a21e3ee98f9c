//! Project Models
//!
//! A project owns a forest of nodes, its snapshots, and its change log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form, string-keyed metadata attached to projects, nodes and log rows.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A persisted project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier (UUID v4)
    pub id: String,
    /// Display name
    pub name: String,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Partial project update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    /// Replaces the whole metadata map when set
    pub metadata: Option<Metadata>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.metadata.is_none()
    }
}
