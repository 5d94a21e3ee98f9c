//! Snapshot Models
//!
//! Immutable point-in-time captures of a project's full node set.

use serde::{Deserialize, Serialize};

use super::node::Node;

/// A persisted snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub project_id: String,
    pub description: String,
    /// Node rows at capture time, ordered by path
    pub nodes: Vec<Node>,
    pub created_at: String,
}

/// Snapshot listing entry (without the captured rows)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub project_id: String,
    pub description: String,
    pub node_count: usize,
    pub created_at: String,
}

/// Outcome of a deadline-bounded snapshot capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCapture {
    /// `None` when the deadline expired and nothing was persisted
    pub snapshot_id: Option<String>,
    /// Rows serialized before completion or expiry
    pub node_count: usize,
    pub complete: bool,
}

/// Outcome of a deadline-bounded snapshot restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub snapshot_id: String,
    pub project_id: String,
    /// Rows restored; zero when the restore was rolled back
    pub nodes_restored: usize,
    pub complete: bool,
}
