//! Query façade: read-side helpers over the primary stores.
//!
//! Thin pass-throughs; all filtering, ordering and pagination is delegated
//! to the store implementations. Reads never touch the mirror store.

use crate::engine::ActivityEngine;
use coursetrack_core::activity::Activity;
use coursetrack_core::ids::{CourseId, LearnerId};
use coursetrack_core::ledger::Transaction;
use coursetrack_core::progress::CourseProgress;
use coursetrack_core::store::{HistoryQuery, LedgerQuery, StoreError};

impl ActivityEngine {
    /// Activities for a learner, newest first, optionally filtered by kind.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the primary store read fails.
    pub async fn activity_history(
        &self,
        learner: LearnerId,
        query: HistoryQuery,
    ) -> Result<Vec<Activity>, StoreError> {
        self.activities().history(learner, query).await
    }

    /// The progress aggregate for one (learner, course) pair, if enrolled.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the primary store read fails.
    pub async fn course_progress(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, StoreError> {
        Ok(self
            .progress()
            .find(learner, course)
            .await?
            .map(|versioned| versioned.progress))
    }

    /// All progress aggregates for a learner.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the primary store read fails.
    pub async fn all_progress(&self, learner: LearnerId) -> Result<Vec<CourseProgress>, StoreError> {
        Ok(self
            .progress()
            .all_for_learner(learner)
            .await?
            .into_iter()
            .map(|versioned| versioned.progress)
            .collect())
    }

    /// Ledger rows for a learner, newest first, optionally filtered by kind.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the primary store read fails.
    pub async fn transactions(
        &self,
        learner: LearnerId,
        query: LedgerQuery,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.ledger().history(learner, query).await
    }
}
