//! Data Models
//!
//! Contains the data structures persisted by the storage layer and returned
//! by the node store and sync engine.

pub mod change;
pub mod node;
pub mod project;
pub mod settings;
pub mod snapshot;
pub mod sync;

pub use change::*;
pub use node::*;
pub use project::*;
pub use settings::*;
pub use snapshot::*;
pub use sync::*;
