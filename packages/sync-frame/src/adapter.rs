//! Adapter contract.
//!
//! An adapter represents one remote collection. The engine receives
//! ready-to-use instances; discovery and configuration of concrete
//! adapters (Airtable, Webflow, ...) is host-side and out of scope here —
//! this crate only defines the trait concrete adapters must satisfy.

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::model::{ChangeSet, Cursor};

/// Uniform pull/push interface over a remote collection.
///
/// # Monotonicity
///
/// `get_updates` must be monotonic: repeated calls with the same cursor
/// return a superset of the previous result (until the cursor advances)
/// and never return changes older than the cursor passed in.
///
/// # Idempotence
///
/// `apply_changes` must idempotently create/update `upserts` and delete
/// `deletes`; the engine may call it again with the same batch after a
/// retryable failure.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Return all changes observed since `cursor`, and a new cursor that
    /// advances past them. A `cursor` with `value: None` requests the
    /// initial snapshot.
    async fn get_updates(&self, cursor: &Cursor) -> AdapterResult<(ChangeSet, Cursor)>;

    /// Idempotently apply a batch of upserts and deletes. The engine has
    /// already sliced the changeset into `batch_size`-sized pieces before
    /// calling this; adapter-internal batching limits are the adapter's
    /// own concern.
    async fn apply_changes(&self, changes: &ChangeSet) -> AdapterResult<()>;

    /// Round-trip a cursor to a string the link index can persist. The
    /// default simply unwraps the opaque token; adapters whose cursor
    /// format needs normalization can override this.
    fn serialize_cursor(&self, cursor: &Cursor) -> String {
        cursor.value.clone().unwrap_or_default()
    }

    /// Adapter name, used in logging and failure attribution.
    fn name(&self) -> &str {
        "unknown"
    }
}
