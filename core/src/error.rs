//! Error taxonomy of the ingestion engine.
//!
//! The taxonomy distinguishes *where* in the pipeline a failure happened,
//! because callers need to know whether the activity fact survived:
//!
//! - [`EngineError::Persistence`]: step 1 (the durability boundary) failed.
//!   Nothing was recorded; the caller may resubmit the whole event.
//! - Every other variant occurs *after* the fact is durably recorded. Only
//!   its projection into derived aggregates is incomplete, and callers can
//!   retry derivation without re-submitting the raw event.
//!
//! Mirror failures have no variant here: the projector logs and swallows
//! them.

use crate::activity::ActivityKind;
use crate::ids::{CourseId, LearnerId, ModuleId};
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by `record_activity` and the query façade.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The activity fact itself could not be persisted. The event is lost
    /// and may be resubmitted.
    #[error("activity persistence failed: {0}")]
    Persistence(#[source] StoreError),

    /// A derivation read/write failed after the activity was recorded.
    #[error("derivation failed after the activity was recorded: {0}")]
    Derivation(#[source] StoreError),

    /// No progress aggregate exists for the (learner, course) pair a
    /// completion activity referenced. Retryable: the caller should verify
    /// enrollment happened and replay derivation.
    #[error("no course progress for learner {learner} in course {course}")]
    ProgressNotFound {
        /// The learner the activity referenced.
        learner: LearnerId,
        /// The course the activity referenced.
        course: CourseId,
    },

    /// The referenced module is not part of the progress aggregate.
    #[error("module {module} not found in course {course}")]
    ModuleNotFound {
        /// The module the activity referenced.
        module: ModuleId,
        /// The course whose aggregate was inspected.
        course: CourseId,
    },

    /// The activity payload could not be narrowed to the shape its kind's
    /// handler requires.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// The activity kind being dispatched.
        kind: ActivityKind,
        /// Why narrowing failed.
        reason: String,
    },

    /// The optimistic-concurrency retry budget was exhausted while updating
    /// the progress aggregate.
    #[error("gave up updating course progress after {attempts} conflicting attempts")]
    ConflictExhausted {
        /// How many attempts were made.
        attempts: usize,
    },
}

impl EngineError {
    /// Whether the activity fact was durably recorded despite the error.
    ///
    /// `false` only for [`EngineError::Persistence`]; every other variant is
    /// raised after the durability boundary.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}
