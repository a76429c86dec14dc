//! End-to-end ingestion tests over the in-memory stores.
//!
//! These exercise the whole pipeline: persistence, kind dispatch, progress
//! derivation, optimistic concurrency and best-effort mirroring.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use coursetrack_core::activity::{ActivityDraft, ActivityKind};
use coursetrack_core::error::EngineError;
use coursetrack_core::ids::{CourseId, LearnerId};
use coursetrack_core::ledger::TransactionKind;
use coursetrack_core::progress::{CourseProgress, ModuleStatus, Revision, VersionedProgress};
use coursetrack_core::store::{
    HistoryQuery, LedgerQuery, ProgressStore, StoreError, StoreFuture,
};
use coursetrack_engine::{ActivityEngine, RetryPolicy};
use coursetrack_testing::{test_clock, InMemoryMirrorStore, InMemoryPrimaryStore};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Harness {
    engine: ActivityEngine,
    primary: Arc<InMemoryPrimaryStore>,
    mirror: Arc<InMemoryMirrorStore>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness() -> Harness {
    init_tracing();
    let primary = Arc::new(InMemoryPrimaryStore::default());
    let mirror = Arc::new(InMemoryMirrorStore::default());
    let engine = ActivityEngine::new(
        primary.clone(),
        primary.clone(),
        primary.clone(),
        mirror.clone(),
        Arc::new(test_clock()),
    );
    Harness {
        engine,
        primary,
        mirror,
    }
}

fn learner() -> LearnerId {
    LearnerId::new("u1")
}

fn course() -> CourseId {
    CourseId::new("c1")
}

/// One module `m1` with lessons `l1`, `l2` and quiz `q1`.
fn enrollment_draft() -> ActivityDraft {
    ActivityDraft::new(learner(), ActivityKind::CourseEnrollment)
        .with_course(course())
        .with_data(json!({
            "courseModules": [{
                "id": "m1",
                "name": "Module One",
                "lessons": [
                    { "id": "l1", "name": "Lesson One" },
                    { "id": "l2", "name": "Lesson Two" }
                ],
                "quizzes": [
                    { "id": "q1", "name": "Quiz One" }
                ]
            }]
        }))
}

fn lesson_draft(lesson: &str, time_spent: u64) -> ActivityDraft {
    ActivityDraft::new(learner(), ActivityKind::LessonCompletion)
        .with_course(course())
        .with_data(json!({
            "lessonId": lesson,
            "moduleId": "m1",
            "timeSpent": time_spent
        }))
}

fn quiz_draft(score: u8) -> ActivityDraft {
    ActivityDraft::new(learner(), ActivityKind::QuizCompletion)
        .with_course(course())
        .with_data(json!({
            "quizId": "q1",
            "moduleId": "m1",
            "score": score,
            "timeSpent": 300,
            "passingScore": 70
        }))
}

async fn current_progress(harness: &Harness) -> CourseProgress {
    harness
        .engine
        .course_progress(learner(), course())
        .await
        .unwrap()
        .expect("progress should exist")
}

#[tokio::test]
async fn login_is_persisted_and_mirrored() {
    let h = harness();
    let activity = h
        .engine
        .record_activity(ActivityDraft::new(learner(), ActivityKind::Login))
        .await
        .unwrap();

    let history = h
        .engine
        .activity_history(learner(), HistoryQuery::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, activity.id);

    let key = format!("activities/{}", activity.id);
    let doc = h.mirror.document(&key).expect("activity should be mirrored");
    assert_eq!(doc["kind"], json!("login"));
}

#[tokio::test]
async fn mirror_unavailable_does_not_fail_ingestion() {
    let h = harness();
    h.mirror.set_unavailable(true);

    let result = h
        .engine
        .record_activity(ActivityDraft::new(learner(), ActivityKind::Login))
        .await;

    assert!(result.is_ok());
    assert_eq!(h.primary.activity_count(), 1);
    assert_eq!(h.mirror.document_count(), 0);
}

#[tokio::test]
async fn enrollment_is_idempotent() {
    let h = harness();
    h.engine.record_activity(enrollment_draft()).await.unwrap();
    h.engine.record_activity(enrollment_draft()).await.unwrap();

    assert_eq!(h.primary.progress_count(), 1);
    let all = h.engine.all_progress(learner()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].modules.len(), 1);
    assert_eq!(all[0].overall_progress, 0);
}

#[tokio::test]
async fn unknown_kind_is_persisted_without_derivation() {
    let h = harness();
    h.engine
        .record_activity(ActivityDraft::new(learner(), ActivityKind::Unknown))
        .await
        .unwrap();

    assert_eq!(h.primary.activity_count(), 1);
    assert_eq!(h.primary.progress_count(), 0);
    assert_eq!(h.primary.transaction_count(), 0);
}

#[tokio::test]
async fn purchase_creates_exactly_one_ledger_row() {
    let h = harness();
    h.engine
        .record_activity(
            ActivityDraft::new(learner(), ActivityKind::CoursePurchase)
                .with_course(course())
                .with_data(json!({
                    "transactionDetails": {
                        "amount": 49.99,
                        "paymentMethod": "card",
                        "paymentDetails": { "orderId": "ord-1" }
                    }
                })),
        )
        .await
        .unwrap();

    let rows = h
        .engine
        .transactions(learner(), LedgerQuery::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, TransactionKind::Purchase);
    assert_eq!(rows[0].currency, "USD");
    assert!((rows[0].amount - 49.99).abs() < f64::EPSILON);

    let key = format!("transactions/{}", rows[0].id);
    assert!(h.mirror.document(&key).is_some());
}

#[tokio::test]
async fn purchase_without_details_touches_nothing_but_the_activity() {
    let h = harness();
    h.engine
        .record_activity(
            ActivityDraft::new(learner(), ActivityKind::CoursePurchase).with_course(course()),
        )
        .await
        .unwrap();

    assert_eq!(h.primary.activity_count(), 1);
    assert_eq!(h.primary.transaction_count(), 0);
}

#[tokio::test]
async fn lesson_completion_without_enrollment_is_progress_not_found() {
    let h = harness();
    let error = h
        .engine
        .record_activity(lesson_draft("l1", 120))
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::ProgressNotFound { .. }));
    // The fact survives; only derivation is incomplete.
    assert!(error.is_recorded());
    assert_eq!(h.primary.activity_count(), 1);
    assert_eq!(h.primary.progress_count(), 0);
}

#[tokio::test]
async fn unknown_module_is_module_not_found() {
    let h = harness();
    h.engine.record_activity(enrollment_draft()).await.unwrap();

    let error = h
        .engine
        .record_activity(
            ActivityDraft::new(learner(), ActivityKind::LessonCompletion)
                .with_course(course())
                .with_data(json!({
                    "lessonId": "l1",
                    "moduleId": "m9",
                    "timeSpent": 60
                })),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::ModuleNotFound { .. }));
    assert!(error.is_recorded());
}

#[tokio::test]
async fn malformed_quiz_payload_is_invalid_payload() {
    let h = harness();
    h.engine.record_activity(enrollment_draft()).await.unwrap();

    let error = h
        .engine
        .record_activity(
            ActivityDraft::new(learner(), ActivityKind::QuizCompletion)
                .with_course(course())
                .with_data(json!({ "quizId": "q1" })),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::InvalidPayload { .. }));
    assert!(error.is_recorded());
}

#[tokio::test]
async fn malformed_enrollment_payload_is_invalid_payload() {
    let h = harness();
    let error = h
        .engine
        .record_activity(
            ActivityDraft::new(learner(), ActivityKind::CourseEnrollment)
                .with_course(course())
                .with_data(json!({ "courseModules": "garbage" })),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::InvalidPayload { .. }));
    // The fact is durable; no module-less aggregate sneaks in.
    assert!(error.is_recorded());
    assert_eq!(h.primary.activity_count(), 1);
    assert_eq!(h.primary.progress_count(), 0);
}

#[tokio::test]
async fn enrollment_without_payload_seeds_an_empty_aggregate() {
    let h = harness();
    h.engine
        .record_activity(
            ActivityDraft::new(learner(), ActivityKind::CourseEnrollment).with_course(course()),
        )
        .await
        .unwrap();

    let all = h.engine.all_progress(learner()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].modules.is_empty());
    assert_eq!(all[0].overall_progress, 0);
}

#[tokio::test]
async fn quiz_completion_without_course_id_is_invalid_payload() {
    let h = harness();
    let error = h
        .engine
        .record_activity(
            ActivityDraft::new(learner(), ActivityKind::QuizCompletion).with_data(json!({
                "quizId": "q1",
                "moduleId": "m1",
                "score": 80,
                "timeSpent": 300
            })),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::InvalidPayload { .. }));
}

#[tokio::test]
async fn best_score_is_monotone_across_attempts() {
    let h = harness();
    h.engine.record_activity(enrollment_draft()).await.unwrap();

    for score in [40u8, 90, 70] {
        h.engine.record_activity(quiz_draft(score)).await.unwrap();
    }

    let progress = current_progress(&h).await;
    let quiz = &progress.modules[0].quizzes[0];
    assert_eq!(quiz.best_score, 90);
    assert!(quiz.passed);
    assert_eq!(quiz.attempts.len(), 3);
    assert_eq!(
        quiz.attempts.iter().map(|a| a.attempt_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn end_to_end_course_completion() {
    let h = harness();

    // Enroll: one module, two lessons, one quiz => overall 0.
    h.engine.record_activity(enrollment_draft()).await.unwrap();
    assert_eq!(current_progress(&h).await.overall_progress, 0);

    // Lesson L1: module round(100*1/3) = 33.
    h.engine.record_activity(lesson_draft("l1", 120)).await.unwrap();
    let progress = current_progress(&h).await;
    assert_eq!(progress.modules[0].progress, 33);
    assert_eq!(progress.overall_progress, 33);
    assert_eq!(progress.modules[0].status, ModuleStatus::InProgress);
    assert!(progress.modules[0].started_at.is_some());
    assert_eq!(progress.modules[0].lessons[0].time_spent_secs, 120);

    // Quiz Q1 at 80: module round(100*2/3) = 67, passed.
    h.engine.record_activity(quiz_draft(80)).await.unwrap();
    let progress = current_progress(&h).await;
    assert_eq!(progress.modules[0].progress, 67);
    assert_eq!(progress.overall_progress, 67);
    assert!(progress.modules[0].quizzes[0].passed);

    // Lesson L2: module 100, completed, aggregate completed.
    h.engine.record_activity(lesson_draft("l2", 90)).await.unwrap();
    let progress = current_progress(&h).await;
    assert_eq!(progress.modules[0].progress, 100);
    assert_eq!(progress.overall_progress, 100);
    assert_eq!(progress.modules[0].status, ModuleStatus::Completed);
    assert!(progress.modules[0].completed_at.is_some());
    assert!(progress.completed_at.is_some());

    // The progress mirror document tracks the aggregate.
    let doc = h
        .mirror
        .document("learner_progress/u1/courses/c1")
        .expect("progress should be mirrored");
    assert_eq!(doc["overall_progress"], json!(100));
}

/// Progress store that reports a revision conflict on the first update and
/// then delegates to the wrapped in-memory store.
struct ConflictOnce {
    inner: Arc<InMemoryPrimaryStore>,
    conflicted: AtomicBool,
}

impl ProgressStore for ConflictOnce {
    fn find(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> StoreFuture<'_, Option<VersionedProgress>> {
        self.inner.find(learner, course)
    }

    fn insert(&self, progress: CourseProgress) -> StoreFuture<'_, VersionedProgress> {
        ProgressStore::insert(self.inner.as_ref(), progress)
    }

    fn update(
        &self,
        progress: CourseProgress,
        expected: Revision,
    ) -> StoreFuture<'_, VersionedProgress> {
        if !self.conflicted.swap(true, Ordering::SeqCst) {
            return Box::pin(async move {
                Err(StoreError::RevisionConflict {
                    expected,
                    actual: expected.next(),
                })
            });
        }
        self.inner.update(progress, expected)
    }

    fn all_for_learner(&self, learner: LearnerId) -> StoreFuture<'_, Vec<VersionedProgress>> {
        self.inner.all_for_learner(learner)
    }
}

#[tokio::test]
async fn revision_conflict_is_retried_and_succeeds() {
    let primary = Arc::new(InMemoryPrimaryStore::default());
    let mirror = Arc::new(InMemoryMirrorStore::default());
    let conflicting = Arc::new(ConflictOnce {
        inner: primary.clone(),
        conflicted: AtomicBool::new(false),
    });
    let engine = ActivityEngine::new(
        primary.clone(),
        conflicting,
        primary.clone(),
        mirror,
        Arc::new(test_clock()),
    )
    .with_retry_policy(RetryPolicy::default().with_initial_delay(std::time::Duration::from_millis(1)));

    engine.record_activity(enrollment_draft()).await.unwrap();
    engine.record_activity(lesson_draft("l1", 60)).await.unwrap();

    let progress = engine
        .course_progress(learner(), course())
        .await
        .unwrap()
        .expect("progress should exist");
    assert_eq!(progress.modules[0].progress, 33);
}

/// Progress store whose updates always conflict.
struct AlwaysConflict {
    inner: Arc<InMemoryPrimaryStore>,
}

impl ProgressStore for AlwaysConflict {
    fn find(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> StoreFuture<'_, Option<VersionedProgress>> {
        self.inner.find(learner, course)
    }

    fn insert(&self, progress: CourseProgress) -> StoreFuture<'_, VersionedProgress> {
        ProgressStore::insert(self.inner.as_ref(), progress)
    }

    fn update(
        &self,
        _progress: CourseProgress,
        expected: Revision,
    ) -> StoreFuture<'_, VersionedProgress> {
        Box::pin(async move {
            Err(StoreError::RevisionConflict {
                expected,
                actual: expected.next(),
            })
        })
    }

    fn all_for_learner(&self, learner: LearnerId) -> StoreFuture<'_, Vec<VersionedProgress>> {
        self.inner.all_for_learner(learner)
    }
}

#[tokio::test]
async fn exhausted_conflicts_surface_after_the_retry_budget() {
    let primary = Arc::new(InMemoryPrimaryStore::default());
    let mirror = Arc::new(InMemoryMirrorStore::default());
    let conflicting = Arc::new(AlwaysConflict {
        inner: primary.clone(),
    });
    let engine = ActivityEngine::new(
        primary.clone(),
        conflicting,
        primary.clone(),
        mirror,
        Arc::new(test_clock()),
    )
    .with_retry_policy(RetryPolicy::no_retries());

    engine.record_activity(enrollment_draft()).await.unwrap();
    let error = engine
        .record_activity(lesson_draft("l1", 60))
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::ConflictExhausted { attempts: 1 }));
    assert!(error.is_recorded());
}
