//! Integration Tests Module
//!
//! End-to-end tests for the CodeViz data core: file-backed persistence,
//! the node store over a real database, and git synchronization against
//! the real `git` binary (skipped when git is unavailable).

// Projects, change log, snapshots, cascades and batches on a file database
mod persistence_test;

// Node store behavior across reopen, watchers and snapshots
mod node_store_test;

// Import/export, conflicts, branches and hooks with real git
mod sync_test;
