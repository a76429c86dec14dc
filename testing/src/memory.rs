//! In-memory store implementations.
//!
//! These mirror the contracts of the PostgreSQL backend exactly - the
//! uniqueness constraint on (learner, course), revision-guarded updates,
//! newest-first paginated history reads and merge-upsert mirror writes -
//! so engine tests exercise the same code paths production does.

use chrono::Utc;
use coursetrack_core::activity::Activity;
use coursetrack_core::ids::{CourseId, LearnerId};
use coursetrack_core::ledger::Transaction;
use coursetrack_core::mirror::{MirrorError, MirrorPath, MirrorStore, SYNCED_AT_FIELD};
use coursetrack_core::progress::{CourseProgress, Revision, VersionedProgress};
use coursetrack_core::store::{
    ActivityStore, HistoryQuery, LedgerQuery, LedgerStore, ProgressStore, StoreError, StoreFuture,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct PrimaryState {
    activities: Vec<Activity>,
    progress: HashMap<(LearnerId, CourseId), VersionedProgress>,
    transactions: Vec<Transaction>,
}

/// In-memory primary store implementing all three store traits.
#[derive(Default)]
pub struct InMemoryPrimaryStore {
    state: Mutex<PrimaryState>,
}

impl InMemoryPrimaryStore {
    fn lock(&self) -> Result<MutexGuard<'_, PrimaryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("poisoned lock".to_string()))
    }

    /// Number of stored activities, across all learners.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn activity_count(&self) -> usize {
        self.state.lock().unwrap().activities.len()
    }

    /// Number of stored progress aggregates, across all learners.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn progress_count(&self) -> usize {
        self.state.lock().unwrap().progress.len()
    }

    /// Number of stored ledger rows, across all learners.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }
}

impl ActivityStore for InMemoryPrimaryStore {
    fn insert(&self, activity: Activity) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.lock()?.activities.push(activity);
            Ok(())
        })
    }

    fn history(&self, learner: LearnerId, query: HistoryQuery) -> StoreFuture<'_, Vec<Activity>> {
        Box::pin(async move {
            let state = self.lock()?;
            let mut rows: Vec<Activity> = state
                .activities
                .iter()
                .filter(|a| {
                    a.learner_id == learner && query.kind.is_none_or(|kind| a.kind == kind)
                })
                .cloned()
                .collect();
            // Stable sort keeps insertion order for equal timestamps, so
            // reversing yields newest-first even under a fixed clock.
            rows.sort_by_key(|a| a.recorded_at);
            Ok(rows
                .into_iter()
                .rev()
                .skip(query.skip)
                .take(query.limit)
                .collect())
        })
    }
}

impl ProgressStore for InMemoryPrimaryStore {
    fn find(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> StoreFuture<'_, Option<VersionedProgress>> {
        Box::pin(async move { Ok(self.lock()?.progress.get(&(learner, course)).cloned()) })
    }

    fn insert(&self, progress: CourseProgress) -> StoreFuture<'_, VersionedProgress> {
        Box::pin(async move {
            let key = (progress.learner_id.clone(), progress.course_id.clone());
            let mut state = self.lock()?;
            if state.progress.contains_key(&key) {
                return Err(StoreError::DuplicateProgress {
                    learner: key.0,
                    course: key.1,
                });
            }
            let versioned = VersionedProgress {
                progress,
                revision: Revision::initial(),
            };
            state.progress.insert(key, versioned.clone());
            Ok(versioned)
        })
    }

    fn update(
        &self,
        progress: CourseProgress,
        expected: Revision,
    ) -> StoreFuture<'_, VersionedProgress> {
        Box::pin(async move {
            let key = (progress.learner_id.clone(), progress.course_id.clone());
            let mut state = self.lock()?;
            let entry = state.progress.get_mut(&key).ok_or(StoreError::NotFound)?;
            if entry.revision != expected {
                return Err(StoreError::RevisionConflict {
                    expected,
                    actual: entry.revision,
                });
            }
            *entry = VersionedProgress {
                progress,
                revision: expected.next(),
            };
            Ok(entry.clone())
        })
    }

    fn all_for_learner(&self, learner: LearnerId) -> StoreFuture<'_, Vec<VersionedProgress>> {
        Box::pin(async move {
            let state = self.lock()?;
            let mut rows: Vec<VersionedProgress> = state
                .progress
                .values()
                .filter(|v| v.progress.learner_id == learner)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.progress.course_id.as_str().cmp(b.progress.course_id.as_str()));
            Ok(rows)
        })
    }
}

impl LedgerStore for InMemoryPrimaryStore {
    fn insert(&self, transaction: Transaction) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.lock()?.transactions.push(transaction);
            Ok(())
        })
    }

    fn history(&self, learner: LearnerId, query: LedgerQuery) -> StoreFuture<'_, Vec<Transaction>> {
        Box::pin(async move {
            let state = self.lock()?;
            let mut rows: Vec<Transaction> = state
                .transactions
                .iter()
                .filter(|t| {
                    t.learner_id == learner && query.kind.is_none_or(|kind| t.kind == kind)
                })
                .cloned()
                .collect();
            rows.sort_by_key(|t| t.created_at);
            Ok(rows
                .into_iter()
                .rev()
                .skip(query.skip)
                .take(query.limit)
                .collect())
        })
    }
}

/// In-memory mirror store with merge-upsert semantics and an availability
/// toggle.
///
/// Documents are keyed by the full slash-joined path, so hierarchical paths
/// under different parents never collide.
#[derive(Default)]
pub struct InMemoryMirrorStore {
    documents: Mutex<HashMap<String, Map<String, Value>>>,
    unavailable: AtomicBool,
}

impl InMemoryMirrorStore {
    /// Make every subsequent merge fail with `MirrorError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The merged document at the given full key, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn document(&self, key: &str) -> Option<Map<String, Value>> {
        self.documents.lock().unwrap().get(key).cloned()
    }

    /// Number of mirrored documents.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

impl MirrorStore for InMemoryMirrorStore {
    fn merge(
        &self,
        path: MirrorPath,
        doc_id: String,
        snapshot: Map<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<(), MirrorError>> + Send + '_>> {
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(MirrorError::Unavailable(
                    "mirror store marked unavailable".to_string(),
                ));
            }
            if !path.addresses_collection() {
                return Err(MirrorError::InvalidPath(path.to_string()));
            }

            let key = path.document_key(&doc_id);
            let mut documents = self
                .documents
                .lock()
                .map_err(|_| MirrorError::Unavailable("poisoned lock".to_string()))?;
            let document = documents.entry(key).or_default();
            for (field, value) in snapshot {
                document.insert(field, value);
            }
            document.insert(
                SYNCED_AT_FIELD.to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use coursetrack_core::activity::{ActivityDraft, ActivityKind};
    use coursetrack_core::ids::ActivityId;
    use serde_json::json;

    fn activity(learner: &str, kind: ActivityKind) -> Activity {
        Activity::from_draft(
            ActivityDraft::new(LearnerId::new(learner), kind),
            ActivityId::generate(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn history_is_newest_first_and_filtered() {
        let store = InMemoryPrimaryStore::default();
        ActivityStore::insert(&store, activity("u1", ActivityKind::Signup))
            .await
            .unwrap();
        ActivityStore::insert(&store, activity("u1", ActivityKind::Login))
            .await
            .unwrap();
        ActivityStore::insert(&store, activity("u2", ActivityKind::Login))
            .await
            .unwrap();

        let all = ActivityStore::history(&store, LearnerId::new("u1"), HistoryQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, ActivityKind::Login);
        assert_eq!(all[1].kind, ActivityKind::Signup);

        let logins = ActivityStore::history(
            &store,
            LearnerId::new("u1"),
            HistoryQuery::default().with_kind(ActivityKind::Login),
        )
        .await
        .unwrap();
        assert_eq!(logins.len(), 1);
    }

    #[tokio::test]
    async fn progress_insert_enforces_uniqueness() {
        let store = InMemoryPrimaryStore::default();
        let now = Utc::now();
        let progress = CourseProgress::new(LearnerId::new("u1"), CourseId::new("c1"), now);
        ProgressStore::insert(&store, progress.clone()).await.unwrap();
        let error = ProgressStore::insert(&store, progress).await.unwrap_err();
        assert!(matches!(error, StoreError::DuplicateProgress { .. }));
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = InMemoryPrimaryStore::default();
        let now = Utc::now();
        let progress = CourseProgress::new(LearnerId::new("u1"), CourseId::new("c1"), now);
        let v0 = ProgressStore::insert(&store, progress.clone()).await.unwrap();

        let v1 = store.update(progress.clone(), v0.revision).await.unwrap();
        assert_eq!(v1.revision, Revision::new(1));

        let error = store.update(progress, v0.revision).await.unwrap_err();
        assert!(matches!(
            error,
            StoreError::RevisionConflict { actual, .. } if actual == Revision::new(1)
        ));
    }

    #[tokio::test]
    async fn mirror_merge_preserves_absent_fields() {
        let store = InMemoryMirrorStore::default();
        let path = MirrorPath::collection("activities");

        let mut first = Map::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!("keep"));
        store.merge(path.clone(), "d1".to_string(), first).await.unwrap();

        let mut second = Map::new();
        second.insert("a".to_string(), json!(2));
        store.merge(path, "d1".to_string(), second).await.unwrap();

        let doc = store.document("activities/d1").unwrap();
        assert_eq!(doc["a"], json!(2));
        assert_eq!(doc["b"], json!("keep"));
        assert!(doc.contains_key(SYNCED_AT_FIELD));
    }

    #[tokio::test]
    async fn unavailable_mirror_fails_merges() {
        let store = InMemoryMirrorStore::default();
        store.set_unavailable(true);
        let error = store
            .merge(
                MirrorPath::collection("activities"),
                "d1".to_string(),
                Map::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, MirrorError::Unavailable(_)));
        assert_eq!(store.document_count(), 0);
    }

    #[tokio::test]
    async fn path_ending_on_document_is_rejected() {
        let store = InMemoryMirrorStore::default();
        let path = MirrorPath::collection("learner_progress").doc("u1");
        let error = store
            .merge(path, "c1".to_string(), Map::new())
            .await
            .unwrap_err();
        assert!(matches!(error, MirrorError::InvalidPath(_)));
    }
}
