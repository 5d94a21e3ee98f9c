//! Sync Models
//!
//! Baselines, conflict records and per-cycle results of the git
//! synchronization engine.

use serde::{Deserialize, Serialize};

/// Last-known-synchronized state of one repository file.
///
/// `fingerprint` is the SHA-256 of the content that was identical in the
/// node and on disk when the path last synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBaseline {
    pub project_id: String,
    /// Repo-relative path with `/` separators
    pub file_path: String,
    /// Canonical node path the file maps to
    pub node_path: String,
    pub fingerprint: String,
    pub language: String,
    pub updated_at: String,
}

/// Why a path is conflicted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Reported by git for an in-progress merge/rebase
    Merge,
    /// Node and file both changed since the baseline and differ
    Diverged,
}

/// A conflicted path, produced by a sync operation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Repo-relative file path
    pub path: String,
    pub kind: ConflictKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_path: Option<String>,
    /// Conflict-marker regions found in the file (merge conflicts only)
    pub regions: u32,
}

impl ConflictRecord {
    pub fn diverged(path: impl Into<String>, node_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ConflictKind::Diverged,
            node_path: Some(node_path.into()),
            regions: 0,
        }
    }

    pub fn merge(path: impl Into<String>, regions: u32) -> Self {
        Self {
            path: path.into(),
            kind: ConflictKind::Merge,
            node_path: None,
            regions,
        }
    }
}

/// Phase of a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Scanning,
    Diffing,
}

/// Terminal per-path state of a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    NoChange,
    Applying,
    Conflicted,
}

/// What happened to one path during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOutcome {
    pub path: String,
    pub state: PathState,
}

/// Options for `sync_from_git`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Only import files that are unmapped or whose content moved since the
    /// baseline
    pub incremental: bool,
}

/// Result of importing a repository into the node store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncFromResult {
    /// Text files examined
    pub files_processed: usize,
    /// Files that are not valid UTF-8 and were not projected
    pub binary_files: Vec<String>,
    /// Files over the configured size limit
    pub skipped_files: Vec<String>,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub conflicts: Vec<ConflictRecord>,
    /// `false` when the scan deadline expired
    pub complete: bool,
}

/// Result of exporting the node store into the working tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncToResult {
    /// `false` whenever any conflict is present
    pub success: bool,
    pub files_written: usize,
    /// Nodes updated from externally changed files
    pub nodes_updated: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub outcomes: Vec<PathOutcome>,
}

/// Canonical conflict resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Keep node content, overwrite the file
    Ours,
    /// Adopt file content into the node
    Theirs,
    /// Caller supplies merged content
    Manual,
}

/// A resolution offered for a conflicted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStrategy {
    pub kind: ResolutionKind,
    pub path: String,
    pub description: String,
}

/// A chosen resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ours,
    Theirs,
    Manual(String),
}
