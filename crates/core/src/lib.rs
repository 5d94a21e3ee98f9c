//! CodeViz Core
//!
//! Foundational types for the CodeViz Desktop workspace. This crate has zero
//! dependencies on application-level code (database, git, configuration).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `value` - Closed tagged node value (`NodeValue`) and its conversion set
//! - `path` - Canonical dotted/bracket node paths (`NodePath`)

pub mod error;
pub mod path;
pub mod value;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Node Paths ─────────────────────────────────────────────────────────
pub use path::NodePath;

// ── Node Values ────────────────────────────────────────────────────────
pub use value::{NodeValue, ValueKind};
