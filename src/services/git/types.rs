//! Git Sync Types
//!
//! Data returned by the VCS port and the sync engine. All types serialize
//! with serde so they can be handed to the CLI or the visualizer as JSON.

use serde::{Deserialize, Serialize};

use crate::models::ConflictRecord;

// ---------------------------------------------------------------------------
// Repository Scan
// ---------------------------------------------------------------------------

/// A single commit from `git log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full SHA-1 hash.
    pub sha: String,
    /// Abbreviated SHA.
    pub short_sha: String,
    pub author_name: String,
    /// Author date in ISO-8601 format.
    pub date: String,
    /// Subject line.
    pub message: String,
}

/// A local branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Branch name (e.g. "main", "feature/xyz").
    pub name: String,
    /// Whether this is the currently checked-out branch.
    pub is_head: bool,
    /// SHA of the branch tip.
    pub tip_sha: String,
}

/// Result of `scan_repository`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Repo-relative file paths (tracked plus untracked-not-ignored), sorted.
    pub files: Vec<String>,
    pub branches: Vec<BranchInfo>,
    /// Newest first.
    pub commits: Vec<CommitInfo>,
    /// `false` when the scan deadline expired before every step ran.
    pub complete: bool,
}

// ---------------------------------------------------------------------------
// Merge State
// ---------------------------------------------------------------------------

/// Kind of in-progress merge-like operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStateKind {
    /// No merge in progress.
    #[default]
    None,
    Merging,
    Rebasing,
    CherryPicking,
    Reverting,
}

impl MergeStateKind {
    pub fn in_progress(&self) -> bool {
        !matches!(self, MergeStateKind::None)
    }
}

/// Result of merging a branch into the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeBranchResult {
    pub success: bool,
    /// Unmerged paths left by a conflicting merge.
    pub conflicts: Vec<ConflictRecord>,
    /// Failure reason for non-conflict errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Conflict Markers
// ---------------------------------------------------------------------------

/// A single conflict region within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    pub ours: String,
    pub theirs: String,
    /// Common ancestor content (diff3 style). None for 2-way conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<String>,
    /// Start line (1-based) in the original file.
    pub start_line: u32,
    /// End line (1-based) in the original file.
    pub end_line: u32,
}

/// Which side of a marker region to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSide {
    Ours,
    Theirs,
}

// ---------------------------------------------------------------------------
// Branch Views
// ---------------------------------------------------------------------------

/// Stable external identifier for a branch-scoped node set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchView {
    pub branch: String,
    pub view_id: String,
    pub is_head: bool,
}

/// Result of `switch_branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchBranchResult {
    pub branch: String,
    /// Node paths hidden because their file is absent on the branch.
    pub unavailable: Vec<String>,
}
