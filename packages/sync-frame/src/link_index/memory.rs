//! In-memory link index implementation.
//!
//! Useful for testing and single-process demos. Not durable: state is lost
//! on restart.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Conflict, LinkIndex, RunSummary};
use crate::error::LinkIndexResult;
use crate::model::{Cursor, RecordRef};

#[derive(Clone, Default)]
struct CursorRow {
    cursor: Cursor,
    fail_count: u32,
    disabled_at: Option<DateTime<Utc>>,
}

type RecordKey = (String, String, String);

fn key(r: &RecordRef) -> RecordKey {
    (r.adapter.clone(), r.table.clone(), r.id.clone())
}

/// `RwLock`-guarded in-process link index.
pub struct MemoryLinkIndex {
    links_by_src: RwLock<HashMap<RecordKey, RecordRef>>,
    links_by_dest: RwLock<HashMap<RecordKey, RecordRef>>,
    cursors: RwLock<HashMap<(String, String, String), CursorRow>>,
    conflicts: RwLock<HashMap<String, Conflict>>,
    runs: RwLock<Vec<RunSummary>>,
}

impl Default for MemoryLinkIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLinkIndex {
    pub fn new() -> Self {
        Self {
            links_by_src: RwLock::new(HashMap::new()),
            links_by_dest: RwLock::new(HashMap::new()),
            cursors: RwLock::new(HashMap::new()),
            conflicts: RwLock::new(HashMap::new()),
            runs: RwLock::new(Vec::new()),
        }
    }

    fn cursor_key(job_id: &str, adapter: &str, table: &str) -> (String, String, String) {
        (job_id.to_string(), adapter.to_string(), table.to_string())
    }
}

#[async_trait]
impl LinkIndex for MemoryLinkIndex {
    async fn upsert_link(&self, src: &RecordRef, dest: &RecordRef) -> LinkIndexResult<()> {
        // Atomic with respect to readers: take both write locks before
        // mutating either map, so a reader sees either the fully-old or
        // fully-new state (invariant L1/L2).
        let mut by_src = self.links_by_src.write().unwrap();
        let mut by_dest = self.links_by_dest.write().unwrap();

        // Break any previous binding touching either side, regardless of
        // which role (src or dest) that side previously played: a sync
        // direction can flip cycle to cycle, so a ref that was the dest
        // half of a link yesterday may be offered as today's src half.
        if let Some(old_dest) = by_src.remove(&key(src)) {
            by_dest.remove(&key(&old_dest));
        }
        if let Some(old_src) = by_dest.remove(&key(dest)) {
            by_src.remove(&key(&old_src));
        }
        if let Some(old_dest) = by_src.remove(&key(dest)) {
            by_dest.remove(&key(&old_dest));
        }
        if let Some(old_src) = by_dest.remove(&key(src)) {
            by_src.remove(&key(&old_src));
        }

        by_src.insert(key(src), dest.clone());
        by_dest.insert(key(dest), src.clone());
        Ok(())
    }

    async fn find_dest(&self, src: &RecordRef) -> LinkIndexResult<Option<RecordRef>> {
        Ok(self.links_by_src.read().unwrap().get(&key(src)).cloned())
    }

    async fn find_source(&self, dest: &RecordRef) -> LinkIndexResult<Option<RecordRef>> {
        Ok(self.links_by_dest.read().unwrap().get(&key(dest)).cloned())
    }

    async fn load_cursor(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<Cursor> {
        Ok(self
            .cursors
            .read()
            .unwrap()
            .get(&Self::cursor_key(job_id, adapter, table))
            .map(|row| row.cursor.clone())
            .unwrap_or_default())
    }

    async fn save_cursor(&self, job_id: &str, adapter: &str, table: &str, cursor: &Cursor) -> LinkIndexResult<()> {
        let mut cursors = self.cursors.write().unwrap();
        let row = cursors.entry(Self::cursor_key(job_id, adapter, table)).or_default();
        row.cursor = cursor.clone();
        Ok(())
    }

    async fn is_job_disabled(&self, job_id: &str) -> LinkIndexResult<bool> {
        Ok(self
            .cursors
            .read()
            .unwrap()
            .iter()
            .any(|((job, _, _), row)| job == job_id && row.disabled_at.is_some()))
    }

    async fn set_job_disabled(&self, job_id: &str, at: DateTime<Utc>) -> LinkIndexResult<()> {
        let mut cursors = self.cursors.write().unwrap();
        for (_, row) in cursors.iter_mut().filter(|((job, _, _), _)| job == job_id) {
            row.disabled_at = Some(at);
        }
        Ok(())
    }

    async fn increment_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<u32> {
        let mut cursors = self.cursors.write().unwrap();
        let row = cursors.entry(Self::cursor_key(job_id, adapter, table)).or_default();
        row.fail_count += 1;
        Ok(row.fail_count)
    }

    async fn reset_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<()> {
        let mut cursors = self.cursors.write().unwrap();
        let row = cursors.entry(Self::cursor_key(job_id, adapter, table)).or_default();
        row.fail_count = 0;
        Ok(())
    }

    async fn get_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<u32> {
        Ok(self
            .cursors
            .read()
            .unwrap()
            .get(&Self::cursor_key(job_id, adapter, table))
            .map(|row| row.fail_count)
            .unwrap_or(0))
    }

    async fn insert_conflict(&self, conflict: &Conflict) -> LinkIndexResult<()> {
        self.conflicts
            .write()
            .unwrap()
            .insert(conflict.conflict_id.clone(), conflict.clone());
        Ok(())
    }

    async fn get_conflicts(&self, job_id: &str) -> LinkIndexResult<Vec<Conflict>> {
        Ok(self
            .conflicts
            .read()
            .unwrap()
            .values()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn resolve_conflict(&self, conflict_id: &str) -> LinkIndexResult<()> {
        self.conflicts.write().unwrap().remove(conflict_id);
        Ok(())
    }

    async fn insert_run(&self, summary: &RunSummary) -> LinkIndexResult<()> {
        self.runs.write().unwrap().push(summary.clone());
        Ok(())
    }
}
