//! # Coursetrack Testing
//!
//! Testing utilities for the Coursetrack engine:
//!
//! - [`memory::InMemoryPrimaryStore`]: implements all three primary-store
//!   traits over a `HashMap`/`Vec`, with the same uniqueness and revision
//!   semantics as the PostgreSQL backend
//! - [`memory::InMemoryMirrorStore`]: merge-upsert mirror with an
//!   availability toggle for exercising the best-effort projection path
//! - [`clock::FixedClock`]: deterministic time for date-stamping assertions
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use coursetrack_testing::{test_clock, InMemoryMirrorStore, InMemoryPrimaryStore};
//!
//! let primary = Arc::new(InMemoryPrimaryStore::default());
//! let mirror = Arc::new(InMemoryMirrorStore::default());
//! let clock = Arc::new(test_clock());
//! // Hand the Arcs to ActivityEngine::new(...)
//! ```

pub mod clock;
pub mod memory;

pub use clock::{test_clock, FixedClock};
pub use memory::{InMemoryMirrorStore, InMemoryPrimaryStore};
