//! Mirror store over a merge-upsert document table.
//!
//! Snapshots land in a single table keyed by the slash-joined document path:
//!
//! ```sql
//! CREATE TABLE mirror_documents (
//!     path TEXT PRIMARY KEY,
//!     data JSONB NOT NULL,
//!     synced_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! The JSONB `||` operator gives the contract's partial-update semantics for
//! free: top-level fields of an existing document that are absent from the
//! incoming snapshot survive the merge.

use chrono::Utc;
use coursetrack_core::mirror::{MirrorError, MirrorPath, MirrorStore, SYNCED_AT_FIELD};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// PostgreSQL-backed mirror of dashboard-facing snapshots.
#[derive(Clone)]
pub struct PostgresMirrorStore {
    pool: PgPool,
}

impl PostgresMirrorStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and build a store with a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, MirrorError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| MirrorError::Unavailable(format!("failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Create the mirror table if it doesn't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Unavailable`] if the statement fails.
    pub async fn migrate(&self) -> Result<(), MirrorError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mirror_documents (
                path TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                synced_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Unavailable(format!("migration failed: {e}")))?;

        debug!("mirror store migration applied");
        Ok(())
    }

    /// Read a document back by its full slash-joined key.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Unavailable`] on query failure or
    /// [`MirrorError::Serialization`] if the stored value is not an object.
    pub async fn document(&self, key: &str) -> Result<Option<Map<String, Value>>, MirrorError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT data FROM mirror_documents WHERE path = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MirrorError::Unavailable(format!("failed to read document: {e}")))?;

        row.map(|(data,)| match data {
            Value::Object(map) => Ok(map),
            other => Err(MirrorError::Serialization(format!(
                "document at {key} is not an object: {other}"
            ))),
        })
        .transpose()
    }
}

impl MirrorStore for PostgresMirrorStore {
    fn merge(
        &self,
        path: MirrorPath,
        doc_id: String,
        mut snapshot: Map<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<(), MirrorError>> + Send + '_>> {
        Box::pin(async move {
            if !path.addresses_collection() {
                return Err(MirrorError::InvalidPath(format!(
                    "path must end on a collection: {path}"
                )));
            }

            let key = path.document_key(&doc_id);
            snapshot.insert(
                SYNCED_AT_FIELD.to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );

            sqlx::query(
                "INSERT INTO mirror_documents (path, data, synced_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (path) DO UPDATE
                 SET data = mirror_documents.data || EXCLUDED.data,
                     synced_at = now()",
            )
            .bind(&key)
            .bind(Value::Object(snapshot))
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::Unavailable(format!("failed to merge document: {e}")))?;

            debug!(%key, "mirror document merged");
            Ok(())
        })
    }
}
