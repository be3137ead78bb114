//! Test scaffolding: a scriptable in-memory [`Adapter`].
//!
//! Modeled on the teacher project's mock AI/crawler: an `RwLock`-guarded
//! internal state plus a call log for assertions, with `with_*`-style
//! configuration where it doesn't need interior mutability after
//! construction.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::Adapter;
use crate::error::{AdapterError, AdapterResult};
use crate::model::{ChangeSet, Cursor, Record};

#[derive(Debug, Clone)]
enum LogEntry {
    Upsert(Record),
    Delete(String),
}

/// Record of one call made to an [`InMemoryAdapter`], for assertions in
/// tests (e.g. scenario 9: cursor persistence, observed by spying on the
/// adapter).
#[derive(Debug, Clone)]
pub enum AdapterCall {
    GetUpdates { cursor: Option<String> },
    ApplyChanges { upserts: usize, deletes: usize },
}

/// An in-memory remote collection: an append-only change log (read by
/// `get_updates` from an offset cursor) plus current record state
/// (written by `apply_changes`), with scriptable failures for exercising
/// the engine's retry and disablement paths.
pub struct InMemoryAdapter {
    name: String,
    records: RwLock<HashMap<String, Record>>,
    log: RwLock<Vec<LogEntry>>,
    calls: RwLock<Vec<AdapterCall>>,
    fail_remaining: RwLock<u32>,
    fail_always: RwLock<bool>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::named("in-memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
            calls: RwLock::new(Vec::new()),
            fail_remaining: RwLock::new(0),
            fail_always: RwLock::new(false),
        }
    }

    /// Append an upsert as if an external write just happened.
    pub fn seed_upsert(&self, id: impl Into<String>, fields: Value) {
        let id = id.into();
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.log.write().unwrap().push(LogEntry::Upsert(Record { id, fields }));
    }

    /// Append a delete as if an external delete just happened.
    pub fn seed_delete(&self, id: impl Into<String>) {
        self.log.write().unwrap().push(LogEntry::Delete(id.into()));
    }

    /// Fail the next `n` calls to `apply_changes`, then succeed.
    pub fn fail_apply_changes_times(&self, n: u32) {
        *self.fail_remaining.write().unwrap() = n;
    }

    /// Fail every future call to `apply_changes`.
    pub fn fail_apply_changes_always(&self) {
        *self.fail_always.write().unwrap() = true;
    }

    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn has_record(&self, id: &str) -> bool {
        self.records.read().unwrap().contains_key(id)
    }

    pub fn get_record(&self, id: &str) -> Option<Record> {
        self.records.read().unwrap().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn get_updates_call_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, AdapterCall::GetUpdates { .. }))
            .count()
    }
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for InMemoryAdapter {
    async fn get_updates(&self, cursor: &Cursor) -> AdapterResult<(ChangeSet, Cursor)> {
        self.calls.write().unwrap().push(AdapterCall::GetUpdates {
            cursor: cursor.value.clone(),
        });

        let offset: usize = cursor
            .value
            .as_ref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let log = self.log.read().unwrap();
        let mut changes = ChangeSet::default();
        for entry in log.iter().skip(offset) {
            match entry {
                LogEntry::Upsert(record) => changes.upserts.push(record.clone()),
                LogEntry::Delete(id) => changes.deletes.push(id.clone()),
            }
        }

        Ok((changes, Cursor::new(log.len().to_string())))
    }

    async fn apply_changes(&self, changes: &ChangeSet) -> AdapterResult<()> {
        self.calls.write().unwrap().push(AdapterCall::ApplyChanges {
            upserts: changes.upserts.len(),
            deletes: changes.deletes.len(),
        });

        if *self.fail_always.read().unwrap() {
            return Err(AdapterError::Transport(Box::new(std::io::Error::other(
                format!("{} is configured to always fail apply_changes", self.name),
            ))));
        }

        {
            let mut remaining = self.fail_remaining.write().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdapterError::Transport(Box::new(std::io::Error::other(
                    format!("{} scripted apply_changes failure", self.name),
                ))));
            }
        }

        let mut records = self.records.write().unwrap();
        let mut log = self.log.write().unwrap();
        for record in &changes.upserts {
            records.insert(record.id.clone(), record.clone());
            log.push(LogEntry::Upsert(record.clone()));
        }
        for id in &changes.deletes {
            records.remove(id);
            log.push(LogEntry::Delete(id.clone()));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
