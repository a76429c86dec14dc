//! Best-effort mirror projection.
//!
//! The projector pushes denormalized snapshots into the secondary mirror
//! store after every primary commit. It is infallible from the engine's
//! point of view: serialization problems, invalid paths and an
//! unreachable mirror backend are all logged and swallowed. The primary
//! stores remain correct and complete even if every mirror write fails.

use coursetrack_core::mirror::{MirrorPath, MirrorStore};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Fire-and-forget writer of mirror snapshots.
#[derive(Clone)]
pub struct MirrorProjector {
    store: Arc<dyn MirrorStore>,
}

impl MirrorProjector {
    /// Wrap a mirror store.
    #[must_use]
    pub fn new(store: Arc<dyn MirrorStore>) -> Self {
        Self { store }
    }

    /// Merge a snapshot of `value` into the mirror document at
    /// `path`/`doc_id`.
    ///
    /// Never fails: every problem is logged at `warn` level and dropped.
    /// The mirror is a convenience projection for live views, not a data
    /// source other components may rely on.
    pub async fn project<T: Serialize + Sync>(&self, path: MirrorPath, doc_id: &str, value: &T) {
        let snapshot = match serde_json::to_value(value) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(
                    path = %path,
                    doc = doc_id,
                    "mirror snapshot is not a JSON object ({}); skipping",
                    json_kind(&other)
                );
                return;
            },
            Err(error) => {
                warn!(path = %path, doc = doc_id, %error, "failed to serialize mirror snapshot");
                return;
            },
        };

        if let Err(error) = self.store.merge(path.clone(), doc_id.to_string(), snapshot).await {
            warn!(
                path = %path,
                doc = doc_id,
                %error,
                "mirror projection failed; primary stores remain authoritative"
            );
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
