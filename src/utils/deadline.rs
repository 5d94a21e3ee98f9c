//! Deadlines
//!
//! Caller-supplied time bounds for long operations (repository scans,
//! snapshot capture and restore). An expired deadline makes the operation
//! return a partial result marked incomplete instead of blocking.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No time bound.
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
        }
    }

    /// `None` or zero milliseconds means unbounded.
    pub fn from_millis(millis: Option<u64>) -> Self {
        match millis {
            Some(ms) if ms > 0 => Self::after(Duration::from_millis(ms)),
            _ => Self::none(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.map(|at| Instant::now() >= at).unwrap_or(false)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}
