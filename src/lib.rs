//! CodeViz Desktop - Data Core
//!
//! The data layer behind the 3D code visualizer:
//! - Node store: a path-addressed tree of typed values with watchers
//! - Storage layer (SQLite projects, nodes, change log, snapshots, sync
//!   baselines; JSON config)
//! - Git synchronization engine and hooks
//! - Data models and utilities

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use codeviz_core::{NodePath, NodeValue, ValueKind};
pub use models::settings::{AppConfig, SettingsUpdate};
pub use services::{GitSyncEngine, NodeStore};
pub use storage::{ConfigService, Database};
pub use utils::error::{AppError, AppResult};
