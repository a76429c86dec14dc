//! Injected dependencies.
//!
//! All external facts the pure domain needs (currently just time) are
//! abstracted behind traits and injected, so the recalculator's date
//! stamping stays deterministic under test.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time for testability.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
