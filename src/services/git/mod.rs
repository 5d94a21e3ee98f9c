//! Git Synchronization
//!
//! Two-way projection between a git working tree and a project's node
//! store, built on the `VcsPort` abstraction. `GitCli` drives the real
//! `git` binary.

pub mod conflict;
pub mod engine;
pub mod language;
pub mod types;
pub mod vcs;

#[cfg(test)]
pub(crate) mod fake;

pub use conflict::{has_conflict_markers, parse_conflicts, resolve_markers};
pub use engine::{branch_view_id, export_path, map_files, GitSyncEngine, LOG_LIMIT};
pub use language::{detect_language, extension_for, DEFAULT_LANGUAGE};
pub use types::*;
pub use vcs::{GitCli, GitResult, MergeOutcome, VcsPort};
