//! Utilities
//!
//! Common utilities used throughout the data core.

pub mod deadline;
pub mod error;
pub mod hash;
pub mod locks;
pub mod paths;

pub use deadline::Deadline;
pub use error::*;
pub use hash::fingerprint;
pub use locks::LockRegistry;
pub use paths::*;
