//! Pure progress recalculation.
//!
//! These functions derive module and overall completion percentages and state
//! transitions from lesson/quiz sub-records. They take the current time as an
//! argument and perform no I/O, which keeps them deterministic and idempotent:
//! applying them twice to the same state with no new data changes nothing.
//!
//! # Formulas
//!
//! - module progress = `round(100 * (completed lessons + passed quizzes)
//!   / (lessons + quizzes))`, or 0 when the module is empty
//! - overall progress = mean of module percentages, rounded to the nearest
//!   integer, or 0 with no modules
//!
//! Completion and start dates are stamped the first time a threshold is
//! crossed and never overwritten afterwards.

use crate::payload::{LessonCompletionPayload, QuizCompletionPayload};
use crate::progress::{
    CourseProgress, LessonProgress, LessonStatus, ModuleProgress, ModuleStatus, QuizAttempt,
    QuizProgress,
};
use chrono::{DateTime, Utc};

/// Record a quiz attempt on a module.
///
/// If the quiz is not yet present on the module it is appended first (quizzes
/// can reach the aggregate ahead of a catalog refresh). The attempt number is
/// one past the prior attempt count, the best score is monotonically
/// non-decreasing, and the pass flag is recomputed against the (possibly
/// payload-supplied) passing threshold.
///
/// Callers must follow up with [`recalculate_module`].
pub fn record_quiz_attempt(
    module: &mut ModuleProgress,
    payload: &QuizCompletionPayload,
    now: DateTime<Utc>,
) {
    let position = match module.quizzes.iter().position(|q| q.id == payload.quiz_id) {
        Some(position) => position,
        None => {
            let name = payload
                .quiz_name
                .clone()
                .unwrap_or_else(|| payload.quiz_id.to_string());
            module
                .quizzes
                .push(QuizProgress::seeded(payload.quiz_id.clone(), name));
            module.quizzes.len() - 1
        },
    };
    let quiz = &mut module.quizzes[position];

    if let Some(threshold) = payload.passing_score {
        quiz.passing_score = threshold;
    }

    let score = payload.score.min(100);
    let attempt_number = u32::try_from(quiz.attempts.len()).unwrap_or(u32::MAX) + 1;
    quiz.attempts.push(QuizAttempt {
        attempt_number,
        started_at: payload.start_time,
        completed_at: now,
        score,
        time_spent_secs: payload.time_spent,
        answers: payload.answers.clone(),
    });

    quiz.best_score = quiz.best_score.max(score);
    quiz.passed = quiz.best_score >= quiz.passing_score;
    module.time_spent_secs += payload.time_spent;
}

/// Mark a lesson completed on a module, accumulating time spent.
///
/// An unknown lesson id is appended as a completed lesson. Re-completing an
/// already-completed lesson only accumulates the newly reported duration;
/// the original completion date is kept.
///
/// Callers must follow up with [`recalculate_module`].
pub fn complete_lesson(
    module: &mut ModuleProgress,
    payload: &LessonCompletionPayload,
    now: DateTime<Utc>,
) {
    match module
        .lessons
        .iter_mut()
        .find(|l| l.id == payload.lesson_id)
    {
        Some(lesson) => {
            if lesson.status != LessonStatus::Completed {
                lesson.status = LessonStatus::Completed;
            }
            if lesson.completed_at.is_none() {
                lesson.completed_at = Some(now);
            }
            lesson.time_spent_secs += payload.time_spent;
        },
        None => {
            let name = payload
                .lesson_name
                .clone()
                .unwrap_or_else(|| payload.lesson_id.to_string());
            module.lessons.push(LessonProgress {
                id: payload.lesson_id.clone(),
                name,
                status: LessonStatus::Completed,
                completed_at: Some(now),
                time_spent_secs: payload.time_spent,
            });
        },
    }
    module.time_spent_secs += payload.time_spent;
}

/// Recompute one module's percentage and status, then the overall rollup.
///
/// # Panics
///
/// Does not panic; an out-of-range `module_index` is a no-op.
pub fn recalculate_module(progress: &mut CourseProgress, module_index: usize, now: DateTime<Utc>) {
    let Some(module) = progress.modules.get_mut(module_index) else {
        return;
    };

    let total = module.lessons.len() + module.quizzes.len();
    let done = module.completed_lessons() + module.passed_quizzes();
    module.progress = percentage(done, total);

    if module.progress >= 100 {
        module.status = ModuleStatus::Completed;
        if module.completed_at.is_none() {
            module.completed_at = Some(now);
        }
    } else if module.progress > 0 {
        module.status = ModuleStatus::InProgress;
        if module.started_at.is_none() {
            module.started_at = Some(now);
        }
    }

    recalculate_overall(progress, now);
}

/// Recompute the overall percentage as the mean of module percentages and
/// stamp the aggregate completion date on first reaching 100.
pub fn recalculate_overall(progress: &mut CourseProgress, now: DateTime<Utc>) {
    if progress.modules.is_empty() {
        progress.overall_progress = 0;
        return;
    }

    let sum: u32 = progress.modules.iter().map(|m| u32::from(m.progress)).sum();
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mean = (f64::from(sum) / progress.modules.len() as f64).round() as u8;
    progress.overall_progress = mean;

    if progress.overall_progress >= 100 && progress.completed_at.is_none() {
        progress.completed_at = Some(now);
    }
}

/// `round(100 * numerator / denominator)` as a 0-100 percentage; 0 when the
/// denominator is 0.
#[must_use]
fn percentage(numerator: usize, denominator: usize) -> u8 {
    if denominator == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = (100.0 * numerator as f64 / denominator as f64).round() as u8;
    pct.min(100)
}
