//! The course-progress aggregate: one mutable rollup per (learner, course).
//!
//! The aggregate is created when the learner enrolls and mutated by quiz and
//! lesson completions. All derivation of percentages and completion state is
//! done by the pure functions in [`crate::recalc`]; this module only defines
//! the shape and a few structural helpers.

use crate::ids::{CourseId, LearnerId, LessonId, ModuleId, QuizId};
use crate::payload::CourseModuleSeed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Passing threshold applied when a quiz payload doesn't supply one.
pub const DEFAULT_PASSING_SCORE: u8 = 70;

/// Aggregate revision for optimistic concurrency control.
///
/// Revisions start at 0 on insert and are bumped by the store on every
/// successful update. An update carrying a stale revision fails with
/// `StoreError::RevisionConflict`, and the engine reloads and retries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    /// The revision of a freshly inserted aggregate.
    #[must_use]
    pub const fn initial() -> Self {
        Self(0)
    }

    /// Wrap a raw revision number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The revision after one successful update.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The raw revision number.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A progress aggregate together with its store revision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionedProgress {
    /// The aggregate itself.
    pub progress: CourseProgress,
    /// Revision to pass back on update.
    pub revision: Revision,
}

/// Completion state of a module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// No lesson or quiz in the module has been touched.
    #[default]
    NotStarted,
    /// Progress is strictly between 0 and 100.
    InProgress,
    /// Every lesson is completed and every quiz is passed.
    Completed,
}

/// Completion state of a lesson.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    /// Not yet completed.
    #[default]
    NotStarted,
    /// Completed at least once.
    Completed,
}

/// One graded attempt at a quiz.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizAttempt {
    /// 1-based attempt counter.
    pub attempt_number: u32,
    /// When the attempt started, if the client tracked it.
    pub started_at: Option<DateTime<Utc>>,
    /// When the attempt was recorded.
    pub completed_at: DateTime<Utc>,
    /// Score achieved, 0-100.
    pub score: u8,
    /// Seconds spent on the attempt.
    pub time_spent_secs: u64,
    /// Per-question answers, kept verbatim.
    pub answers: serde_json::Value,
}

/// Quiz sub-record: attempt history plus derived best score and pass flag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizProgress {
    /// Quiz id.
    pub id: QuizId,
    /// Human-readable name.
    pub name: String,
    /// All attempts, in submission order.
    pub attempts: Vec<QuizAttempt>,
    /// Highest score across attempts; monotonically non-decreasing.
    pub best_score: u8,
    /// Whether `best_score >= passing_score`.
    pub passed: bool,
    /// Threshold for passing this quiz.
    pub passing_score: u8,
}

impl QuizProgress {
    /// An untouched quiz record, as seeded at enrollment.
    #[must_use]
    pub fn seeded(id: QuizId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attempts: Vec::new(),
            best_score: 0,
            passed: false,
            passing_score: DEFAULT_PASSING_SCORE,
        }
    }
}

/// Lesson sub-record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LessonProgress {
    /// Lesson id.
    pub id: LessonId,
    /// Human-readable name.
    pub name: String,
    /// Completion state.
    pub status: LessonStatus,
    /// Set the first time the lesson is completed; never overwritten.
    pub completed_at: Option<DateTime<Utc>>,
    /// Accumulated seconds spent across sittings.
    pub time_spent_secs: u64,
}

impl LessonProgress {
    /// An untouched lesson record, as seeded at enrollment.
    #[must_use]
    pub fn seeded(id: LessonId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: LessonStatus::NotStarted,
            completed_at: None,
            time_spent_secs: 0,
        }
    }
}

/// Module sub-record: lessons, quizzes and the derived module percentage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleProgress {
    /// Module id.
    pub id: ModuleId,
    /// Human-readable name.
    pub name: String,
    /// Derived completion state.
    pub status: ModuleStatus,
    /// Derived percentage, 0-100.
    pub progress: u8,
    /// Set the first time progress leaves 0; never overwritten.
    pub started_at: Option<DateTime<Utc>>,
    /// Set the first time progress reaches 100; never overwritten.
    pub completed_at: Option<DateTime<Utc>>,
    /// Accumulated seconds spent across all lessons and quizzes.
    pub time_spent_secs: u64,
    /// Lessons in course order.
    pub lessons: Vec<LessonProgress>,
    /// Quizzes in course order.
    pub quizzes: Vec<QuizProgress>,
}

impl ModuleProgress {
    /// An untouched module record, as seeded at enrollment.
    #[must_use]
    pub fn seeded(id: ModuleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ModuleStatus::NotStarted,
            progress: 0,
            started_at: None,
            completed_at: None,
            time_spent_secs: 0,
            lessons: Vec::new(),
            quizzes: Vec::new(),
        }
    }

    /// Number of completed lessons.
    #[must_use]
    pub fn completed_lessons(&self) -> usize {
        self.lessons
            .iter()
            .filter(|l| l.status == LessonStatus::Completed)
            .count()
    }

    /// Number of passed quizzes.
    #[must_use]
    pub fn passed_quizzes(&self) -> usize {
        self.quizzes.iter().filter(|q| q.passed).count()
    }
}

/// A certificate issued for the course.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Certificate {
    /// Certificate id.
    pub id: String,
    /// When the certificate was issued.
    pub issued_at: DateTime<Utc>,
    /// Where the rendered certificate can be fetched.
    pub url: Option<String>,
}

/// A piece of instructor feedback attached to the course progress.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstructorFeedback {
    /// Who wrote the feedback.
    pub author: String,
    /// The feedback text.
    pub message: String,
    /// When it was written.
    pub created_at: DateTime<Utc>,
}

/// The per-learner-per-course progress aggregate.
///
/// Exactly one exists per (learner, course) pair; the store's uniqueness
/// constraint enforces this even under racing enrollments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CourseProgress {
    /// The enrolled learner.
    pub learner_id: LearnerId,
    /// The course being tracked.
    pub course_id: CourseId,
    /// When the learner enrolled.
    pub enrolled_at: DateTime<Utc>,
    /// Last time any activity touched this aggregate.
    pub last_accessed_at: DateTime<Utc>,
    /// Set the first time overall progress reaches 100; never overwritten.
    pub completed_at: Option<DateTime<Utc>>,
    /// Mean of module percentages, rounded to the nearest integer.
    pub overall_progress: u8,
    /// Modules in course order.
    pub modules: Vec<ModuleProgress>,
    /// Certificates issued for this course.
    pub certificates: Vec<Certificate>,
    /// Instructor feedback entries.
    pub feedback: Vec<InstructorFeedback>,
}

impl CourseProgress {
    /// A fresh aggregate with no modules.
    #[must_use]
    pub fn new(learner_id: LearnerId, course_id: CourseId, now: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            course_id,
            enrolled_at: now,
            last_accessed_at: now,
            completed_at: None,
            overall_progress: 0,
            modules: Vec::new(),
            certificates: Vec::new(),
            feedback: Vec::new(),
        }
    }

    /// Seed a fresh aggregate from the enrollment payload's course skeleton.
    ///
    /// Every module, lesson and quiz starts untouched; quizzes get the
    /// default passing score until a completion payload overrides it.
    #[must_use]
    pub fn from_seed(
        learner_id: LearnerId,
        course_id: CourseId,
        seeds: &[CourseModuleSeed],
        now: DateTime<Utc>,
    ) -> Self {
        let mut progress = Self::new(learner_id, course_id, now);
        progress.modules = seeds
            .iter()
            .map(|seed| {
                let mut module = ModuleProgress::seeded(seed.id.clone(), seed.name.clone());
                module.lessons = seed
                    .lessons
                    .iter()
                    .map(|l| LessonProgress::seeded(LessonId::new(l.id.clone()), l.name.clone()))
                    .collect();
                module.quizzes = seed
                    .quizzes
                    .iter()
                    .map(|q| QuizProgress::seeded(QuizId::new(q.id.clone()), q.name.clone()))
                    .collect();
                module
            })
            .collect();
        progress
    }

    /// Index of the module with the given id, if present.
    #[must_use]
    pub fn module_index(&self, module_id: &ModuleId) -> Option<usize> {
        self.modules.iter().position(|m| &m.id == module_id)
    }
}
