//! Primary transactional store over JSONB document tables.
//!
//! One table per document family:
//!
//! ```sql
//! CREATE TABLE activities (
//!     id UUID PRIMARY KEY,
//!     learner_id TEXT NOT NULL,
//!     kind TEXT NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL,
//!     doc JSONB NOT NULL
//! );
//!
//! CREATE TABLE course_progress (
//!     learner_id TEXT NOT NULL,
//!     course_id TEXT NOT NULL,
//!     revision BIGINT NOT NULL,
//!     doc JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (learner_id, course_id)
//! );
//!
//! CREATE TABLE transactions (
//!     id UUID PRIMARY KEY,
//!     learner_id TEXT NOT NULL,
//!     kind TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     doc JSONB NOT NULL
//! );
//! ```
//!
//! The full document is stored as JSONB; the extracted columns exist for
//! indexing, filtering and the constraints the contract requires. The
//! composite primary key on `course_progress` is the final arbiter of racing
//! enrollments, and the `revision` column guards optimistic updates.

use coursetrack_core::activity::Activity;
use coursetrack_core::ids::{CourseId, LearnerId};
use coursetrack_core::ledger::Transaction;
use coursetrack_core::progress::{CourseProgress, Revision, VersionedProgress};
use coursetrack_core::store::{
    ActivityStore, HistoryQuery, LedgerQuery, LedgerStore, ProgressStore, StoreError, StoreFuture,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

fn to_doc<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value)
        .map_err(|e| StoreError::Serialization(format!("failed to serialize document: {e}")))
}

fn from_doc<T: DeserializeOwned>(doc: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(doc)
        .map_err(|e| StoreError::Serialization(format!("failed to deserialize document: {e}")))
}

fn backend(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{context}: {e}"))
}

fn page(limit: usize, skip: usize) -> (i64, i64) {
    (
        i64::try_from(limit).unwrap_or(i64::MAX),
        i64::try_from(skip).unwrap_or(i64::MAX),
    )
}

/// PostgreSQL-backed source of truth for activities, progress aggregates and
/// ledger rows.
#[derive(Clone)]
pub struct PostgresPrimaryStore {
    pool: PgPool,
}

impl PostgresPrimaryStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and build a store with a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| backend("failed to connect", e))?;
        Ok(Self::from_pool(pool))
    }

    /// Create the primary tables and indexes if they don't already exist.
    ///
    /// Idempotent; safe to run on every startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if any statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS activities (
                id UUID PRIMARY KEY,
                learner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL,
                doc JSONB NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_activities_learner
             ON activities(learner_id, recorded_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_activities_kind ON activities(kind)",
            r"
            CREATE TABLE IF NOT EXISTS course_progress (
                learner_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                revision BIGINT NOT NULL,
                doc JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (learner_id, course_id)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS transactions (
                id UUID PRIMARY KEY,
                learner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                doc JSONB NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_transactions_learner
             ON transactions(learner_id, created_at DESC)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| backend("migration failed", e))?;
        }

        debug!("primary store migrations applied");
        Ok(())
    }

    /// The underlying connection pool, for custom queries or sharing with
    /// the mirror store.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ActivityStore for PostgresPrimaryStore {
    fn insert(&self, activity: Activity) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let doc = to_doc(&activity)?;
            sqlx::query(
                "INSERT INTO activities (id, learner_id, kind, recorded_at, doc)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(activity.id.as_uuid())
            .bind(activity.learner_id.as_str())
            .bind(activity.kind.as_str())
            .bind(activity.recorded_at)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("failed to insert activity", e))?;
            Ok(())
        })
    }

    fn history(&self, learner: LearnerId, query: HistoryQuery) -> StoreFuture<'_, Vec<Activity>> {
        Box::pin(async move {
            let (limit, offset) = page(query.limit, query.skip);
            let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
                "SELECT doc FROM activities
                 WHERE learner_id = $1 AND ($2::TEXT IS NULL OR kind = $2)
                 ORDER BY recorded_at DESC
                 LIMIT $3 OFFSET $4",
            )
            .bind(learner.as_str())
            .bind(query.kind.map(|k| k.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("failed to read activity history", e))?;

            rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
        })
    }
}

impl ProgressStore for PostgresPrimaryStore {
    fn find(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> StoreFuture<'_, Option<VersionedProgress>> {
        Box::pin(async move {
            let row: Option<(serde_json::Value, i64)> = sqlx::query_as(
                "SELECT doc, revision FROM course_progress
                 WHERE learner_id = $1 AND course_id = $2",
            )
            .bind(learner.as_str())
            .bind(course.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend("failed to load course progress", e))?;

            row.map(|(doc, revision)| {
                // The revision only ever moves forward from 0; the sign bit
                // is unreachable in practice.
                #[allow(clippy::cast_sign_loss)]
                let revision = Revision::new(revision as u64);
                Ok(VersionedProgress {
                    progress: from_doc(doc)?,
                    revision,
                })
            })
            .transpose()
        })
    }

    fn insert(&self, progress: CourseProgress) -> StoreFuture<'_, VersionedProgress> {
        Box::pin(async move {
            let doc = to_doc(&progress)?;
            let revision = Revision::initial();
            #[allow(clippy::cast_possible_wrap)]
            let revision_i64 = revision.value() as i64;

            let result = sqlx::query(
                "INSERT INTO course_progress (learner_id, course_id, revision, doc, updated_at)
                 VALUES ($1, $2, $3, $4, now())
                 ON CONFLICT (learner_id, course_id) DO NOTHING",
            )
            .bind(progress.learner_id.as_str())
            .bind(progress.course_id.as_str())
            .bind(revision_i64)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("failed to insert course progress", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::DuplicateProgress {
                    learner: progress.learner_id,
                    course: progress.course_id,
                });
            }

            Ok(VersionedProgress { progress, revision })
        })
    }

    fn update(
        &self,
        progress: CourseProgress,
        expected: Revision,
    ) -> StoreFuture<'_, VersionedProgress> {
        Box::pin(async move {
            let doc = to_doc(&progress)?;
            let next = expected.next();
            #[allow(clippy::cast_possible_wrap)]
            let expected_i64 = expected.value() as i64;
            #[allow(clippy::cast_possible_wrap)]
            let next_i64 = next.value() as i64;

            let result = sqlx::query(
                "UPDATE course_progress
                 SET doc = $1, revision = $2, updated_at = now()
                 WHERE learner_id = $3 AND course_id = $4 AND revision = $5",
            )
            .bind(doc)
            .bind(next_i64)
            .bind(progress.learner_id.as_str())
            .bind(progress.course_id.as_str())
            .bind(expected_i64)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("failed to update course progress", e))?;

            if result.rows_affected() == 0 {
                // Distinguish a lost race from a vanished row.
                let actual: Option<(i64,)> = sqlx::query_as(
                    "SELECT revision FROM course_progress
                     WHERE learner_id = $1 AND course_id = $2",
                )
                .bind(progress.learner_id.as_str())
                .bind(progress.course_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| backend("failed to re-read course progress revision", e))?;

                return Err(match actual {
                    Some((revision,)) => {
                        #[allow(clippy::cast_sign_loss)]
                        let actual = Revision::new(revision as u64);
                        StoreError::RevisionConflict { expected, actual }
                    }
                    None => StoreError::NotFound,
                });
            }

            Ok(VersionedProgress {
                progress,
                revision: next,
            })
        })
    }

    fn all_for_learner(&self, learner: LearnerId) -> StoreFuture<'_, Vec<VersionedProgress>> {
        Box::pin(async move {
            let rows: Vec<(serde_json::Value, i64)> = sqlx::query_as(
                "SELECT doc, revision FROM course_progress
                 WHERE learner_id = $1
                 ORDER BY course_id",
            )
            .bind(learner.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("failed to list course progress", e))?;

            rows.into_iter()
                .map(|(doc, revision)| {
                    #[allow(clippy::cast_sign_loss)]
                    let revision = Revision::new(revision as u64);
                    Ok(VersionedProgress {
                        progress: from_doc(doc)?,
                        revision,
                    })
                })
                .collect()
        })
    }
}

impl LedgerStore for PostgresPrimaryStore {
    fn insert(&self, transaction: Transaction) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let doc = to_doc(&transaction)?;
            sqlx::query(
                "INSERT INTO transactions (id, learner_id, kind, created_at, doc)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(transaction.id.as_uuid())
            .bind(transaction.learner_id.as_str())
            .bind(transaction.kind.as_str())
            .bind(transaction.created_at)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("failed to insert transaction", e))?;
            Ok(())
        })
    }

    fn history(&self, learner: LearnerId, query: LedgerQuery) -> StoreFuture<'_, Vec<Transaction>> {
        Box::pin(async move {
            let (limit, offset) = page(query.limit, query.skip);
            let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
                "SELECT doc FROM transactions
                 WHERE learner_id = $1 AND ($2::TEXT IS NULL OR kind = $2)
                 ORDER BY created_at DESC
                 LIMIT $3 OFFSET $4",
            )
            .bind(learner.as_str())
            .bind(query.kind.map(|k| k.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("failed to read ledger history", e))?;

            rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Behavior against a real database is covered in tests/integration_tests.rs.

    #[test]
    fn page_clamps_to_i64() {
        assert_eq!(page(50, 10), (50, 10));
        assert_eq!(page(usize::MAX, 0), (i64::MAX, 0));
    }

    #[test]
    fn doc_roundtrip_preserves_unknown_free_form_fields() {
        let doc = serde_json::json!({ "a": 1, "b": { "c": true } });
        let back: serde_json::Value = from_doc(to_doc(&doc).unwrap()).unwrap();
        assert_eq!(back, doc);
    }
}
