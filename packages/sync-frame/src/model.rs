//! Core data model shared by every component.
//!
//! Records carry an opaque fields map — the core never interprets field
//! values except when extracting a conflict-resolution timestamp
//! (`crate::conflict`). Implementers are meant to treat `fields` as a
//! tagged-variant/value bag rather than leaking a host-language dynamic
//! object, so it is `serde_json::Map<String, Value>` here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record as observed on one side of a sync job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Remote-system identifier, in that system's own namespace.
    pub id: String,
    /// Opaque field bag. Only mappers interpret these.
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// The result of one `Adapter::get_updates` call: upserts and deletes
/// observed since the previous cursor. `upserts` and `deletes` are
/// disjoint; order within each list is preserved end to end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub upserts: Vec<Record>,
    pub deletes: Vec<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// An opaque, adapter-defined marker of "observed up to here". A `None`
/// value means "initial sync".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub value: Option<String>,
}

impl Cursor {
    pub fn initial() -> Self {
        Self { value: None }
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self {
            value: Some(token.into()),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.value.is_none()
    }
}

/// A fully-qualified reference to a record on one side: the adapter name,
/// the table/collection name, and the record's id within that system. This
/// is one half of a [`crate::link_index::Link`] key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub adapter: String,
    pub table: String,
    pub id: String,
}

impl RecordRef {
    pub fn new(adapter: impl Into<String>, table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            table: table.into(),
            id: id.into(),
        }
    }
}
