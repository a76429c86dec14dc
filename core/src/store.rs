//! Primary-store abstractions.
//!
//! The primary transactional store is the source of truth. The engine depends
//! only on these traits; concrete backends live in `coursetrack-postgres`
//! (production) and `coursetrack-testing` (in-memory).
//!
//! # Dyn Compatibility
//!
//! The traits return explicit `Pin<Box<dyn Future>>` instead of `async fn`
//! so the engine can hold them as `Arc<dyn ActivityStore>` etc. Parameters
//! are taken by value for the same reason.
//!
//! # Contract highlights
//!
//! - [`ActivityStore`] is append-only: there is no update or delete.
//! - [`ProgressStore::insert`] enforces the one-aggregate-per-(learner,
//!   course) invariant via [`StoreError::DuplicateProgress`].
//! - [`ProgressStore::update`] is guarded by the aggregate [`Revision`];
//!   a stale revision yields [`StoreError::RevisionConflict`].

use crate::activity::{Activity, ActivityKind};
use crate::ids::{CourseId, LearnerId};
use crate::ledger::{Transaction, TransactionKind};
use crate::progress::{CourseProgress, Revision, VersionedProgress};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by the store traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors surfaced by primary-store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend failed (connection, query, constraint other than the ones
    /// modelled below).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A document could not be (de)serialized.
    #[error("store serialization error: {0}")]
    Serialization(String),

    /// The (learner, course) uniqueness constraint rejected an insert.
    /// Expected under racing enrollments; the engine swallows it.
    #[error("course progress already exists for learner {learner} in course {course}")]
    DuplicateProgress {
        /// The learner whose aggregate already exists.
        learner: LearnerId,
        /// The course of the existing aggregate.
        course: CourseId,
    },

    /// An update carried a stale revision; the caller should reload and retry.
    #[error("revision conflict: expected {expected}, found {actual}")]
    RevisionConflict {
        /// The revision the writer expected.
        expected: Revision,
        /// The revision actually found in the store.
        actual: Revision,
    },

    /// The addressed document does not exist.
    #[error("document not found")]
    NotFound,
}

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Pagination and filtering for activity history reads.
#[derive(Clone, Copy, Debug)]
pub struct HistoryQuery {
    /// Maximum rows to return.
    pub limit: usize,
    /// Rows to skip (newest first).
    pub skip: usize,
    /// Restrict to one activity kind.
    pub kind: Option<ActivityKind>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            skip: 0,
            kind: None,
        }
    }
}

impl HistoryQuery {
    /// Cap the number of returned rows.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skip past already-seen rows.
    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Restrict to one activity kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: ActivityKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Pagination and filtering for ledger history reads.
#[derive(Clone, Copy, Debug)]
pub struct LedgerQuery {
    /// Maximum rows to return.
    pub limit: usize,
    /// Rows to skip (newest first).
    pub skip: usize,
    /// Restrict to one transaction kind.
    pub kind: Option<TransactionKind>,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            skip: 0,
            kind: None,
        }
    }
}

impl LedgerQuery {
    /// Cap the number of returned rows.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skip past already-seen rows.
    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Restrict to one transaction kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Append-only store of activity facts.
pub trait ActivityStore: Send + Sync {
    /// Persist one activity. This is the durability boundary of ingestion:
    /// if it fails, nothing else happens.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] or [`StoreError::Serialization`] on failure.
    fn insert(&self, activity: Activity) -> StoreFuture<'_, ()>;

    /// Activities for a learner, newest first, filtered and paginated per
    /// the query.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] or [`StoreError::Serialization`] on failure.
    fn history(&self, learner: LearnerId, query: HistoryQuery) -> StoreFuture<'_, Vec<Activity>>;
}

/// Store of course-progress aggregates, one per (learner, course).
pub trait ProgressStore: Send + Sync {
    /// Load the aggregate for a (learner, course) pair, with its revision.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] or [`StoreError::Serialization`] on failure.
    /// A missing aggregate is `Ok(None)`, not an error.
    fn find(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> StoreFuture<'_, Option<VersionedProgress>>;

    /// Insert a fresh aggregate at [`Revision::initial`].
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateProgress`] when an aggregate already exists for
    /// the pair; the store's uniqueness constraint is the final arbiter of
    /// racing enrollments.
    fn insert(&self, progress: CourseProgress) -> StoreFuture<'_, VersionedProgress>;

    /// Replace the aggregate, guarded by its expected revision.
    ///
    /// # Errors
    ///
    /// [`StoreError::RevisionConflict`] when the stored revision moved on;
    /// [`StoreError::NotFound`] when the aggregate vanished.
    fn update(
        &self,
        progress: CourseProgress,
        expected: Revision,
    ) -> StoreFuture<'_, VersionedProgress>;

    /// All aggregates for a learner.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] or [`StoreError::Serialization`] on failure.
    fn all_for_learner(&self, learner: LearnerId) -> StoreFuture<'_, Vec<VersionedProgress>>;
}

/// Write-once store of financial ledger rows.
pub trait LedgerStore: Send + Sync {
    /// Persist one transaction row.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] or [`StoreError::Serialization`] on failure.
    fn insert(&self, transaction: Transaction) -> StoreFuture<'_, ()>;

    /// Transactions for a learner, newest first, filtered and paginated.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] or [`StoreError::Serialization`] on failure.
    fn history(&self, learner: LearnerId, query: LedgerQuery) -> StoreFuture<'_, Vec<Transaction>>;
}
