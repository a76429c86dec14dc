//! Activity facts: the immutable source of truth.
//!
//! Every meaningful learner action is recorded as an [`Activity`]. Activities
//! are append-only: once persisted they are never mutated or deleted by this
//! engine. Derived state (course progress, ledger rows, mirror snapshots) is
//! computed *from* activities, never the other way around.

use crate::ids::{ActivityId, CourseId, LearnerId, LessonId, QuizId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of activity kinds this engine understands.
///
/// Kinds outside the dispatch table (`course_completion`, `quiz_start`, ...)
/// are persisted and mirrored but receive no type-specific post-processing.
/// An unrecognized wire value deserializes to [`ActivityKind::Unknown`] so a
/// misbehaving caller can never crash the core; the fact is still recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A new account was created.
    Signup,
    /// The learner logged in.
    Login,
    /// The learner logged out.
    Logout,
    /// The learner viewed a course page.
    CourseView,
    /// A course was purchased; may carry transaction details.
    CoursePurchase,
    /// The learner enrolled in a course; seeds the progress aggregate.
    CourseEnrollment,
    /// A course was completed.
    CourseCompletion,
    /// A quiz was started.
    QuizStart,
    /// A quiz was submitted for grading.
    QuizSubmission,
    /// A quiz was completed; records an attempt and recomputes progress.
    QuizCompletion,
    /// A lesson was started.
    LessonStart,
    /// A lesson was completed; recomputes progress.
    LessonCompletion,
    /// The learner updated their profile.
    ProfileUpdate,
    /// A standalone payment event.
    Payment,
    /// The learner requested a refund.
    RefundRequest,
    /// The learner opened a support request.
    SupportRequest,
    /// Catch-all for wire values outside the enumerated set.
    #[serde(other)]
    Unknown,
}

impl ActivityKind {
    /// The snake_case wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::CourseView => "course_view",
            Self::CoursePurchase => "course_purchase",
            Self::CourseEnrollment => "course_enrollment",
            Self::CourseCompletion => "course_completion",
            Self::QuizStart => "quiz_start",
            Self::QuizSubmission => "quiz_submission",
            Self::QuizCompletion => "quiz_completion",
            Self::LessonStart => "lesson_start",
            Self::LessonCompletion => "lesson_completion",
            Self::ProfileUpdate => "profile_update",
            Self::Payment => "payment",
            Self::RefundRequest => "refund_request",
            Self::SupportRequest => "support_request",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of the action an activity describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// The action has begun but not finished.
    Started,
    /// The action finished successfully (the default).
    #[default]
    Completed,
    /// The action failed.
    Failed,
    /// The action is awaiting an external outcome.
    Pending,
    /// The action was cancelled.
    Cancelled,
}

/// Origin metadata supplied by the caller-facing layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Caller IP address, if known.
    pub ip: Option<String>,
    /// Caller user-agent string, if known.
    pub user_agent: Option<String>,
}

impl Origin {
    /// Origin metadata with both fields populated.
    #[must_use]
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// Caller-supplied input to `record_activity`.
///
/// Only the learner id and the kind are required; everything else defaults.
/// The engine stamps the id and timestamp when the draft is persisted.
///
/// # Example
///
/// ```
/// use coursetrack_core::activity::{ActivityDraft, ActivityKind};
/// use coursetrack_core::ids::{CourseId, LearnerId};
/// use serde_json::json;
///
/// let draft = ActivityDraft::new(LearnerId::new("u1"), ActivityKind::LessonCompletion)
///     .with_course(CourseId::new("c1"))
///     .with_data(json!({ "lessonId": "l1", "moduleId": "m1", "timeSpent": 120 }));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityDraft {
    /// The learner who performed the action.
    pub learner_id: LearnerId,
    /// What kind of action this is.
    pub kind: ActivityKind,
    /// Free-form structured payload; narrowed per kind at dispatch.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Course the action relates to, if any.
    pub course_id: Option<CourseId>,
    /// Quiz the action relates to, if any.
    pub quiz_id: Option<QuizId>,
    /// Lesson the action relates to, if any.
    pub lesson_id: Option<LessonId>,
    /// Status of the described action; defaults to `completed`.
    #[serde(default)]
    pub status: ActivityStatus,
    /// Caller origin metadata.
    #[serde(default)]
    pub origin: Origin,
    /// Duration of the action in seconds, if measured.
    pub duration_secs: Option<u64>,
}

impl ActivityDraft {
    /// Create a draft with the required fields; everything else defaults.
    #[must_use]
    pub fn new(learner_id: LearnerId, kind: ActivityKind) -> Self {
        Self {
            learner_id,
            kind,
            data: serde_json::Value::Null,
            course_id: None,
            quiz_id: None,
            lesson_id: None,
            status: ActivityStatus::default(),
            origin: Origin::default(),
            duration_secs: None,
        }
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Associate the draft with a course.
    #[must_use]
    pub fn with_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    /// Associate the draft with a quiz.
    #[must_use]
    pub fn with_quiz(mut self, quiz_id: QuizId) -> Self {
        self.quiz_id = Some(quiz_id);
        self
    }

    /// Associate the draft with a lesson.
    #[must_use]
    pub fn with_lesson(mut self, lesson_id: LessonId) -> Self {
        self.lesson_id = Some(lesson_id);
        self
    }

    /// Override the default `completed` status.
    #[must_use]
    pub const fn with_status(mut self, status: ActivityStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach origin metadata.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Record how long the action took.
    #[must_use]
    pub const fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// A persisted, immutable activity fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Activity {
    /// System-generated identity.
    pub id: ActivityId,
    /// The learner who performed the action.
    pub learner_id: LearnerId,
    /// What kind of action this is.
    pub kind: ActivityKind,
    /// Free-form structured payload.
    pub data: serde_json::Value,
    /// Course the action relates to, if any.
    pub course_id: Option<CourseId>,
    /// Quiz the action relates to, if any.
    pub quiz_id: Option<QuizId>,
    /// Lesson the action relates to, if any.
    pub lesson_id: Option<LessonId>,
    /// Status of the described action.
    pub status: ActivityStatus,
    /// Caller origin metadata.
    pub origin: Origin,
    /// Duration of the action in seconds, if measured.
    pub duration_secs: Option<u64>,
    /// When the engine recorded the fact.
    pub recorded_at: DateTime<Utc>,
}

impl Activity {
    /// Materialize a draft into a persistable fact.
    #[must_use]
    pub fn from_draft(draft: ActivityDraft, id: ActivityId, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            learner_id: draft.learner_id,
            kind: draft.kind,
            data: draft.data,
            course_id: draft.course_id,
            quiz_id: draft.quiz_id,
            lesson_id: draft.lesson_id,
            status: draft.status,
            origin: draft.origin,
            duration_secs: draft.duration_secs,
            recorded_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names_are_snake_case() {
        let json = serde_json::to_string(&ActivityKind::CourseEnrollment).unwrap();
        assert_eq!(json, "\"course_enrollment\"");
        let back: ActivityKind = serde_json::from_str("\"lesson_completion\"").unwrap();
        assert_eq!(back, ActivityKind::LessonCompletion);
    }

    #[test]
    fn unrecognized_kind_deserializes_to_unknown() {
        let kind: ActivityKind = serde_json::from_str("\"vr_headset_calibration\"").unwrap();
        assert_eq!(kind, ActivityKind::Unknown);
    }

    #[test]
    fn status_defaults_to_completed() {
        assert_eq!(ActivityStatus::default(), ActivityStatus::Completed);
    }

    #[test]
    fn draft_defaults() {
        let draft = ActivityDraft::new(LearnerId::new("u1"), ActivityKind::Login);
        assert_eq!(draft.status, ActivityStatus::Completed);
        assert!(draft.course_id.is_none());
        assert!(draft.data.is_null());
    }

    #[test]
    fn draft_to_activity_preserves_fields() {
        let draft = ActivityDraft::new(LearnerId::new("u1"), ActivityKind::CourseView)
            .with_course(CourseId::new("c1"))
            .with_origin(Origin::new("10.0.0.1", "test-agent"))
            .with_duration_secs(30);
        let id = ActivityId::generate();
        let now = Utc::now();
        let activity = Activity::from_draft(draft, id, now);
        assert_eq!(activity.id, id);
        assert_eq!(activity.recorded_at, now);
        assert_eq!(activity.course_id, Some(CourseId::new("c1")));
        assert_eq!(activity.origin.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(activity.duration_secs, Some(30));
    }
}
