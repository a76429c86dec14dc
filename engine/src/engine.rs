//! The activity ingestion engine.
//!
//! [`ActivityEngine::record_activity`] is the single write entry point of the
//! system. It persists the activity fact (the durability boundary), mirrors
//! it, dispatches kind-specific derivation, and returns the persisted fact.
//!
//! Derivation failures propagate *without* rolling back the activity row:
//! activities are append-only facts, and an incomplete projection into
//! aggregates is a retryable condition, not a reason to erase history. See
//! `EngineError::is_recorded` for how callers tell the two apart.

use crate::projector::MirrorProjector;
use crate::retry::RetryPolicy;
use coursetrack_core::activity::{Activity, ActivityDraft, ActivityKind};
use coursetrack_core::environment::Clock;
use coursetrack_core::error::EngineError;
use coursetrack_core::ids::{ActivityId, CourseId, LearnerId, TransactionId};
use coursetrack_core::ledger::Transaction;
use coursetrack_core::mirror::{MirrorPath, MirrorStore};
use coursetrack_core::payload::{
    EnrollmentPayload, LessonCompletionPayload, PurchasePayload, QuizCompletionPayload,
};
use coursetrack_core::progress::{CourseProgress, VersionedProgress};
use coursetrack_core::recalc;
use coursetrack_core::store::{ActivityStore, LedgerStore, ProgressStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Mirror collection holding per-activity snapshots.
const ACTIVITIES_COLLECTION: &str = "activities";
/// Mirror collection holding per-transaction snapshots.
const TRANSACTIONS_COLLECTION: &str = "transactions";
/// Root mirror collection of the per-learner progress hierarchy.
const PROGRESS_COLLECTION: &str = "learner_progress";
/// Sub-collection of per-course progress documents under a learner.
const COURSES_SUBCOLLECTION: &str = "courses";

/// Orchestrates activity persistence, kind dispatch, progress derivation and
/// mirror projection.
///
/// The engine owns no storage: it holds trait objects for the primary stores
/// and the mirror, so backends are swappable (PostgreSQL in production,
/// in-memory in tests).
#[derive(Clone)]
pub struct ActivityEngine {
    activities: Arc<dyn ActivityStore>,
    progress: Arc<dyn ProgressStore>,
    ledger: Arc<dyn LedgerStore>,
    projector: MirrorProjector,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl ActivityEngine {
    /// Assemble an engine from its collaborators.
    #[must_use]
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        progress: Arc<dyn ProgressStore>,
        ledger: Arc<dyn LedgerStore>,
        mirror: Arc<dyn MirrorStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            activities,
            progress,
            ledger,
            projector: MirrorProjector::new(mirror),
            clock,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the optimistic-concurrency retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record one activity event and run its kind-specific derivation.
    ///
    /// Guarantees:
    ///
    /// - at most one activity row is created per call, and it survives any
    ///   later derivation failure;
    /// - at most one progress aggregate exists per (learner, course), no
    ///   matter how many enrollment activities race;
    /// - mirror-store failures never fail the call.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Persistence`] - the activity could not be stored;
    ///   nothing was recorded.
    /// - [`EngineError::ProgressNotFound`] / [`EngineError::ModuleNotFound`] -
    ///   a completion activity referenced derived state that doesn't exist;
    ///   the fact is recorded, derivation can be retried after fixing the
    ///   enrollment gap.
    /// - [`EngineError::InvalidPayload`] - the payload didn't match the shape
    ///   the kind's handler requires.
    /// - [`EngineError::ConflictExhausted`] - concurrent writers kept
    ///   invalidating the read-modify-write cycle.
    /// - [`EngineError::Derivation`] - a store operation failed after the
    ///   fact was recorded.
    pub async fn record_activity(&self, draft: ActivityDraft) -> Result<Activity, EngineError> {
        let now = self.clock.now();
        let activity = Activity::from_draft(draft, ActivityId::generate(), now);

        self.activities
            .insert(activity.clone())
            .await
            .map_err(EngineError::Persistence)?;
        debug!(
            activity = %activity.id,
            learner = %activity.learner_id,
            kind = %activity.kind,
            "activity recorded"
        );

        self.projector
            .project(
                MirrorPath::collection(ACTIVITIES_COLLECTION),
                &activity.id.to_string(),
                &activity,
            )
            .await;

        match activity.kind {
            ActivityKind::CoursePurchase => self.handle_purchase(&activity, now).await?,
            ActivityKind::CourseEnrollment => self.handle_enrollment(&activity, now).await?,
            ActivityKind::QuizCompletion => self.handle_quiz_completion(&activity, now).await?,
            ActivityKind::LessonCompletion => self.handle_lesson_completion(&activity, now).await?,
            _ => {
                debug!(kind = %activity.kind, "no kind-specific derivation");
            },
        }

        Ok(activity)
    }

    /// `course_purchase`: create a ledger row when the payload carries
    /// transaction details; without them the activity stands alone.
    async fn handle_purchase(
        &self,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let details = serde_json::from_value::<PurchasePayload>(activity.data.clone())
            .ok()
            .and_then(|payload| payload.transaction_details);
        let Some(details) = details else {
            debug!(
                activity = %activity.id,
                "course purchase without transaction details; ledger untouched"
            );
            return Ok(());
        };

        let transaction = Transaction::from_purchase(
            TransactionId::generate(),
            activity.learner_id.clone(),
            activity.course_id.clone(),
            details,
            activity.origin.ip.clone(),
            now,
        );
        self.ledger
            .insert(transaction.clone())
            .await
            .map_err(EngineError::Derivation)?;
        info!(
            transaction = %transaction.id,
            learner = %transaction.learner_id,
            amount = transaction.amount,
            "ledger row created from course purchase"
        );

        self.projector
            .project(
                MirrorPath::collection(TRANSACTIONS_COLLECTION),
                &transaction.id.to_string(),
                &transaction,
            )
            .await;
        Ok(())
    }

    /// `course_enrollment`: idempotently create the progress aggregate,
    /// seeded from the payload's course skeleton.
    ///
    /// Check-then-create with the store's uniqueness constraint as the final
    /// arbiter: losing the race to a concurrent enrollment is benign and
    /// only logged.
    async fn handle_enrollment(
        &self,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let course = activity.course_id.clone().ok_or_else(|| {
            EngineError::InvalidPayload {
                kind: activity.kind,
                reason: "course_enrollment requires a course id".to_string(),
            }
        })?;
        let learner = activity.learner_id.clone();

        let existing = self
            .progress
            .find(learner.clone(), course.clone())
            .await
            .map_err(EngineError::Derivation)?;
        if existing.is_some() {
            debug!(%learner, %course, "already enrolled; existing progress kept");
            return Ok(());
        }

        // No payload at all means the caller has no skeleton to offer; a
        // payload that fails to narrow is the caller's bug and must surface.
        let seeds = if activity.data.is_null() {
            Vec::new()
        } else {
            serde_json::from_value::<EnrollmentPayload>(activity.data.clone())
                .map_err(|error| EngineError::InvalidPayload {
                    kind: activity.kind,
                    reason: error.to_string(),
                })?
                .course_modules
        };
        let seeded = CourseProgress::from_seed(learner.clone(), course.clone(), &seeds, now);

        match self.progress.insert(seeded).await {
            Ok(versioned) => {
                info!(
                    %learner,
                    %course,
                    modules = versioned.progress.modules.len(),
                    "course progress created"
                );
                self.project_progress(&versioned.progress).await;
                Ok(())
            },
            Err(StoreError::DuplicateProgress { .. }) => {
                warn!(%learner, %course, "lost enrollment race; existing aggregate kept");
                Ok(())
            },
            Err(error) => Err(EngineError::Derivation(error)),
        }
    }

    /// `quiz_completion`: record an attempt and recompute progress.
    async fn handle_quiz_completion(
        &self,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let payload: QuizCompletionPayload = serde_json::from_value(activity.data.clone())
            .map_err(|error| EngineError::InvalidPayload {
                kind: activity.kind,
                reason: error.to_string(),
            })?;
        let course = activity.course_id.clone().ok_or_else(|| {
            EngineError::InvalidPayload {
                kind: activity.kind,
                reason: "quiz_completion requires a course id".to_string(),
            }
        })?;

        let updated = self
            .mutate_progress(activity.learner_id.clone(), course, now, |progress| {
                let index = progress.module_index(&payload.module_id).ok_or_else(|| {
                    EngineError::ModuleNotFound {
                        module: payload.module_id.clone(),
                        course: progress.course_id.clone(),
                    }
                })?;
                recalc::record_quiz_attempt(&mut progress.modules[index], &payload, now);
                recalc::recalculate_module(progress, index, now);
                Ok(())
            })
            .await?;

        self.project_progress(&updated.progress).await;
        Ok(())
    }

    /// `lesson_completion`: mark the lesson done and recompute progress.
    async fn handle_lesson_completion(
        &self,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let payload: LessonCompletionPayload = serde_json::from_value(activity.data.clone())
            .map_err(|error| EngineError::InvalidPayload {
                kind: activity.kind,
                reason: error.to_string(),
            })?;
        let course = activity.course_id.clone().ok_or_else(|| {
            EngineError::InvalidPayload {
                kind: activity.kind,
                reason: "lesson_completion requires a course id".to_string(),
            }
        })?;

        let updated = self
            .mutate_progress(activity.learner_id.clone(), course, now, |progress| {
                let index = progress.module_index(&payload.module_id).ok_or_else(|| {
                    EngineError::ModuleNotFound {
                        module: payload.module_id.clone(),
                        course: progress.course_id.clone(),
                    }
                })?;
                recalc::complete_lesson(&mut progress.modules[index], &payload, now);
                recalc::recalculate_module(progress, index, now);
                Ok(())
            })
            .await?;

        self.project_progress(&updated.progress).await;
        Ok(())
    }

    /// Optimistic read-modify-write on the progress aggregate, bounded by
    /// the retry policy. The mutation closure may run once per attempt, so
    /// it must be re-applicable to a freshly loaded aggregate.
    async fn mutate_progress<F>(
        &self,
        learner: LearnerId,
        course: CourseId,
        now: DateTime<Utc>,
        mutate: F,
    ) -> Result<VersionedProgress, EngineError>
    where
        F: Fn(&mut CourseProgress) -> Result<(), EngineError>,
    {
        let mut attempts = 0usize;
        loop {
            let found = self
                .progress
                .find(learner.clone(), course.clone())
                .await
                .map_err(EngineError::Derivation)?;
            let Some(versioned) = found else {
                return Err(EngineError::ProgressNotFound { learner, course });
            };

            let mut aggregate = versioned.progress;
            mutate(&mut aggregate)?;
            aggregate.last_accessed_at = now;

            match self.progress.update(aggregate, versioned.revision).await {
                Ok(updated) => return Ok(updated),
                Err(StoreError::RevisionConflict { expected, actual }) => {
                    attempts += 1;
                    if attempts > self.retry.max_retries {
                        return Err(EngineError::ConflictExhausted { attempts });
                    }
                    warn!(
                        %learner,
                        %course,
                        %expected,
                        %actual,
                        attempt = attempts,
                        "progress revision conflict; reloading aggregate"
                    );
                    tokio::time::sleep(self.retry.delay_for_attempt(attempts - 1)).await;
                },
                Err(error) => return Err(EngineError::Derivation(error)),
            }
        }
    }

    /// Push the progress snapshot to its hierarchical mirror document:
    /// `learner_progress/{learner}/courses/{course}`.
    async fn project_progress(&self, progress: &CourseProgress) {
        let path = MirrorPath::collection(PROGRESS_COLLECTION)
            .doc(progress.learner_id.as_str())
            .and_collection(COURSES_SUBCOLLECTION);
        self.projector
            .project(path, progress.course_id.as_str(), progress)
            .await;
    }

    pub(crate) const fn activities(&self) -> &Arc<dyn ActivityStore> {
        &self.activities
    }

    pub(crate) const fn progress(&self) -> &Arc<dyn ProgressStore> {
        &self.progress
    }

    pub(crate) const fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }
}
