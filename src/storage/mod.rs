//! Storage Layer
//!
//! Handles all data persistence: the SQLite database (projects, nodes,
//! change log, snapshots, sync baselines) and the JSON config file.

pub mod baselines;
pub mod config;
pub mod database;
pub mod nodes;
pub mod snapshots;

pub use config::*;
pub use database::*;
