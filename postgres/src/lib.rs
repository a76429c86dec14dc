//! `PostgreSQL` backends for Coursetrack.
//!
//! Two stores live here:
//!
//! - [`PostgresPrimaryStore`]: the transactional source of truth. Implements
//!   all three primary-store traits (`ActivityStore`, `ProgressStore`,
//!   `LedgerStore`) over JSONB document tables, with the (learner, course)
//!   uniqueness constraint and revision-guarded updates enforced by the
//!   database itself.
//! - [`PostgresMirrorStore`]: a merge-upsert document table standing in for
//!   the dashboard-facing mirror. Eventually consistent and best-effort;
//!   losing it never loses data.
//!
//! # Example
//!
//! ```ignore
//! use coursetrack_postgres::{PostgresMirrorStore, PostgresPrimaryStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let primary = PostgresPrimaryStore::connect("postgres://localhost/coursetrack").await?;
//!     primary.migrate().await?;
//!
//!     let mirror = PostgresMirrorStore::from_pool(primary.pool().clone());
//!     mirror.migrate().await?;
//!     Ok(())
//! }
//! ```

pub mod mirror;
pub mod primary;

pub use mirror::PostgresMirrorStore;
pub use primary::PostgresPrimaryStore;
