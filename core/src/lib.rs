//! # Coursetrack Core
//!
//! Domain model and store abstractions for the Coursetrack activity-tracking
//! and course-progress engine.
//!
//! This crate contains everything that is independent of any concrete storage
//! backend or runtime:
//!
//! - **Activities**: immutable facts describing learner actions ([`activity`])
//! - **Course progress**: the per-learner-per-course mutable aggregate ([`progress`])
//! - **Financial ledger**: write-once transaction rows ([`ledger`])
//! - **Typed payloads**: narrowed views over the free-form activity `data` ([`payload`])
//! - **Recalculator**: pure progress-derivation functions ([`recalc`])
//! - **Store traits**: the primary-store and mirror-store seams ([`store`], [`mirror`])
//! - **Error taxonomy**: [`error::EngineError`] and friends
//!
//! ## Architecture
//!
//! The ingestion engine (in `coursetrack-engine`) depends only on the traits
//! defined here. Concrete backends live in sibling crates:
//!
//! - `coursetrack-postgres`: production sqlx/PostgreSQL implementations
//! - `coursetrack-testing`: in-memory implementations for tests
//!
//! ## Design Principles
//!
//! - The activity record store is append-only; no update or delete operations
//!   exist on [`store::ActivityStore`].
//! - Progress derivation is pure: [`recalc`] functions take the aggregate and a
//!   timestamp and never perform I/O.
//! - The mirror store is a convenience projection. Its failure never affects
//!   the primary path, which is why [`mirror::MirrorError`] does not appear in
//!   [`error::EngineError`].

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod activity;
pub mod environment;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod mirror;
pub mod payload;
pub mod progress;
pub mod recalc;
pub mod store;

pub use activity::{Activity, ActivityDraft, ActivityKind, ActivityStatus, Origin};
pub use error::EngineError;
pub use ids::{ActivityId, CourseId, LearnerId, LessonId, ModuleId, QuizId, TransactionId};
pub use ledger::{Transaction, TransactionKind, TransactionStatus};
pub use progress::{CourseProgress, ModuleProgress, Revision, VersionedProgress};
