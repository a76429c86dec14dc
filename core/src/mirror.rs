//! Secondary mirror-store abstraction.
//!
//! The mirror store holds denormalized, eventually-consistent snapshots used
//! by live dashboards. It is a one-way, best-effort projection: the primary
//! stores remain correct and complete even if every mirror write fails, and
//! nothing in the system may rely on the mirror for correctness.

use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Field stamped onto every merged snapshot with the sync time.
pub const SYNCED_AT_FIELD: &str = "_synced_at";

/// Errors from mirror-store implementations.
///
/// These never cross the engine boundary: the projector catches and logs
/// them, which is why they are absent from `EngineError`.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// The mirror backend could not be reached or rejected the write.
    #[error("mirror store unavailable: {0}")]
    Unavailable(String),

    /// The logical path was malformed (e.g. ended on a document segment).
    #[error("invalid mirror path: {0}")]
    InvalidPath(String),

    /// A snapshot could not be serialized.
    #[error("mirror serialization error: {0}")]
    Serialization(String),
}

/// A logical, possibly hierarchical collection path in the mirror store.
///
/// Segments alternate collection and document ids and always terminate in a
/// collection; the target document id is supplied separately to
/// [`MirrorStore::merge`]. Built with a fluent builder:
///
/// ```
/// use coursetrack_core::mirror::MirrorPath;
///
/// let flat = MirrorPath::collection("activities");
/// let nested = MirrorPath::collection("learner_progress")
///     .doc("u1")
///     .and_collection("courses");
/// assert_eq!(nested.to_string(), "learner_progress/u1/courses");
/// assert_eq!(nested.document_key("c1"), "learner_progress/u1/courses/c1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MirrorPath {
    segments: Vec<String>,
}

impl MirrorPath {
    /// Start a path at a top-level collection.
    #[must_use]
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Descend into a document of the current collection.
    #[must_use]
    pub fn doc(mut self, id: impl Into<String>) -> Self {
        self.segments.push(id.into());
        self
    }

    /// Descend into a sub-collection of the current document.
    #[must_use]
    pub fn and_collection(mut self, name: impl Into<String>) -> Self {
        self.segments.push(name.into());
        self
    }

    /// The raw path segments, alternating collection and document ids.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the path terminates in a collection segment, as required by
    /// [`MirrorStore::merge`]. Stores walk segments two at a time
    /// (collection, id, collection, id, ...), so a valid path has an odd
    /// number of segments.
    #[must_use]
    pub fn addresses_collection(&self) -> bool {
        self.segments.len() % 2 == 1
    }

    /// The full slash-joined key of a document in this collection.
    #[must_use]
    pub fn document_key(&self, doc_id: &str) -> String {
        let mut key = self.segments.join("/");
        key.push('/');
        key.push_str(doc_id);
        key
    }
}

impl fmt::Display for MirrorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Upsert-with-merge store for mirror snapshots.
///
/// Partial-update semantics: fields of an existing document that are absent
/// from the incoming snapshot are preserved. Implementations stamp
/// [`SYNCED_AT_FIELD`] on every merge.
pub trait MirrorStore: Send + Sync {
    /// Merge a flat snapshot into the document at `path`/`doc_id`.
    ///
    /// # Errors
    ///
    /// [`MirrorError`] on any failure; the caller (projector) logs and
    /// swallows it.
    fn merge(
        &self,
        path: MirrorPath,
        doc_id: String,
        snapshot: Map<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<(), MirrorError>> + Send + '_>>;
}
