//! # Coursetrack Engine
//!
//! The activity ingestion engine: the component that accepts an activity
//! event, persists it, classifies it by kind, and - depending on kind -
//! mutates downstream aggregates while keeping the secondary mirror store
//! eventually consistent.
//!
//! ## Control flow
//!
//! ```text
//! caller
//!   └─► ActivityEngine::record_activity
//!         1. persist Activity (durability boundary)
//!         2. MirrorProjector::project (best effort, never fails the call)
//!         3. kind dispatch
//!              course_purchase   → ledger row, mirror it
//!              course_enrollment → seed CourseProgress if absent, mirror it
//!              quiz_completion   → attempt + recalc, mirror progress
//!              lesson_completion → lesson + recalc, mirror progress
//!              anything else     → no side effects
//!         4. return the persisted Activity
//! ```
//!
//! Progress mutations run inside a bounded optimistic-concurrency retry loop
//! ([`retry::RetryPolicy`]) keyed on the aggregate revision, so concurrent
//! completions for the same (learner, course) pair don't lose updates.

pub mod engine;
pub mod projector;
pub mod query;
pub mod retry;

pub use engine::ActivityEngine;
pub use projector::MirrorProjector;
pub use retry::RetryPolicy;
