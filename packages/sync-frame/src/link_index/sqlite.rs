//! SQLite-backed link index.
//!
//! The reference durable backend. A Postgres backend would differ only in
//! connection handling and placeholder syntax — porting this module is
//! mechanical, so only SQLite ships here (see DESIGN.md).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};

use super::{Conflict, LinkIndex, RunSummary, RunStatus};
use crate::error::LinkIndexResult;
use crate::model::{Cursor, RecordRef};

/// SQLite-based link index.
pub struct SqliteLinkIndex {
    pool: SqlitePool,
}

impl SqliteLinkIndex {
    /// Connect and run migrations.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` — in-memory database (ephemeral, for tests)
    /// - `sqlite:./sync_frame.db?mode=rwc` — file-based, created if absent
    pub async fn new(database_url: &str) -> LinkIndexResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let index = Self { pool };
        index.run_migrations().await?;
        Ok(index)
    }

    pub async fn in_memory() -> LinkIndexResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> LinkIndexResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                src_adapter TEXT NOT NULL,
                src_table TEXT NOT NULL,
                src_id TEXT NOT NULL,
                dest_adapter TEXT NOT NULL,
                dest_table TEXT NOT NULL,
                dest_id TEXT NOT NULL,
                last_sync_ts TEXT NOT NULL,
                PRIMARY KEY (src_adapter, src_table, src_id,
                             dest_adapter, dest_table, dest_id)
            );
            CREATE INDEX IF NOT EXISTS idx_links_dest
                ON links(dest_adapter, dest_table, dest_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cursors (
                job_id TEXT NOT NULL,
                adapter TEXT NOT NULL,
                table_name TEXT NOT NULL,
                cursor_token TEXT,
                fail_count INTEGER NOT NULL DEFAULT 0,
                disabled_at TEXT,
                PRIMARY KEY (job_id, adapter, table_name)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                status TEXT NOT NULL,
                summary_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conflicts (
                conflict_id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                src_adapter TEXT NOT NULL,
                src_table TEXT NOT NULL,
                src_id TEXT NOT NULL,
                dest_adapter TEXT NOT NULL,
                dest_table TEXT NOT NULL,
                dest_id TEXT NOT NULL,
                src_payload TEXT NOT NULL,
                dest_payload TEXT NOT NULL,
                detected_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Access the underlying pool, e.g. to share it with a host's own
    /// migrations or admin tooling.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(FromRow)]
struct LinkDestRow {
    dest_adapter: String,
    dest_table: String,
    dest_id: String,
}

#[derive(FromRow)]
struct LinkSrcRow {
    src_adapter: String,
    src_table: String,
    src_id: String,
}

#[async_trait]
impl LinkIndex for SqliteLinkIndex {
    async fn upsert_link(&self, src: &RecordRef, dest: &RecordRef) -> LinkIndexResult<()> {
        let mut tx = self.pool.begin().await?;

        // Break any previous binding touching either ref, regardless of
        // which role (src or dest) it previously played: a sync direction
        // can flip cycle to cycle, so a ref that was a dest half
        // yesterday may be offered as today's src half.
        sqlx::query(
            "DELETE FROM links WHERE (src_adapter = ? AND src_table = ? AND src_id = ?)
                OR (dest_adapter = ? AND dest_table = ? AND dest_id = ?)
                OR (src_adapter = ? AND src_table = ? AND src_id = ?)
                OR (dest_adapter = ? AND dest_table = ? AND dest_id = ?)",
        )
        .bind(&src.adapter)
        .bind(&src.table)
        .bind(&src.id)
        .bind(&dest.adapter)
        .bind(&dest.table)
        .bind(&dest.id)
        .bind(&dest.adapter)
        .bind(&dest.table)
        .bind(&dest.id)
        .bind(&src.adapter)
        .bind(&src.table)
        .bind(&src.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO links (src_adapter, src_table, src_id, dest_adapter, dest_table, dest_id, last_sync_ts)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&src.adapter)
        .bind(&src.table)
        .bind(&src.id)
        .bind(&dest.adapter)
        .bind(&dest.table)
        .bind(&dest.id)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_dest(&self, src: &RecordRef) -> LinkIndexResult<Option<RecordRef>> {
        let row: Option<LinkDestRow> = sqlx::query_as(
            "SELECT dest_adapter, dest_table, dest_id FROM links
             WHERE src_adapter = ? AND src_table = ? AND src_id = ?",
        )
        .bind(&src.adapter)
        .bind(&src.table)
        .bind(&src.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RecordRef::new(r.dest_adapter, r.dest_table, r.dest_id)))
    }

    async fn find_source(&self, dest: &RecordRef) -> LinkIndexResult<Option<RecordRef>> {
        let row: Option<LinkSrcRow> = sqlx::query_as(
            "SELECT src_adapter, src_table, src_id FROM links
             WHERE dest_adapter = ? AND dest_table = ? AND dest_id = ?",
        )
        .bind(&dest.adapter)
        .bind(&dest.table)
        .bind(&dest.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RecordRef::new(r.src_adapter, r.src_table, r.src_id)))
    }

    async fn load_cursor(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<Cursor> {
        let token: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT cursor_token FROM cursors WHERE job_id = ? AND adapter = ? AND table_name = ?",
        )
        .bind(job_id)
        .bind(adapter)
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Cursor {
            value: token.and_then(|(t,)| t),
        })
    }

    async fn save_cursor(&self, job_id: &str, adapter: &str, table: &str, cursor: &Cursor) -> LinkIndexResult<()> {
        sqlx::query(
            "INSERT INTO cursors (job_id, adapter, table_name, cursor_token)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(job_id, adapter, table_name)
             DO UPDATE SET cursor_token = excluded.cursor_token",
        )
        .bind(job_id)
        .bind(adapter)
        .bind(table)
        .bind(&cursor.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_job_disabled(&self, job_id: &str) -> LinkIndexResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM cursors WHERE job_id = ? AND disabled_at IS NOT NULL LIMIT 1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn set_job_disabled(&self, job_id: &str, at: DateTime<Utc>) -> LinkIndexResult<()> {
        sqlx::query("UPDATE cursors SET disabled_at = ? WHERE job_id = ?")
            .bind(at.to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<u32> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO cursors (job_id, adapter, table_name, fail_count)
             VALUES (?, ?, ?, 1)
             ON CONFLICT(job_id, adapter, table_name)
             DO UPDATE SET fail_count = fail_count + 1
             RETURNING fail_count",
        )
        .bind(job_id)
        .bind(adapter)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u32)
    }

    async fn reset_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<()> {
        sqlx::query(
            "INSERT INTO cursors (job_id, adapter, table_name, fail_count)
             VALUES (?, ?, ?, 0)
             ON CONFLICT(job_id, adapter, table_name)
             DO UPDATE SET fail_count = 0",
        )
        .bind(job_id)
        .bind(adapter)
        .bind(table)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT fail_count FROM cursors WHERE job_id = ? AND adapter = ? AND table_name = ?",
        )
        .bind(job_id)
        .bind(adapter)
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(c,)| c as u32).unwrap_or(0))
    }

    async fn insert_conflict(&self, conflict: &Conflict) -> LinkIndexResult<()> {
        sqlx::query(
            "INSERT INTO conflicts (conflict_id, job_id, src_adapter, src_table, src_id,
                dest_adapter, dest_table, dest_id, src_payload, dest_payload, detected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conflict.conflict_id)
        .bind(&conflict.job_id)
        .bind(&conflict.src.adapter)
        .bind(&conflict.src.table)
        .bind(&conflict.src.id)
        .bind(&conflict.dest.adapter)
        .bind(&conflict.dest.table)
        .bind(&conflict.dest.id)
        .bind(conflict.src_payload.to_string())
        .bind(conflict.dest_payload.to_string())
        .bind(conflict.detected_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conflicts(&self, job_id: &str) -> LinkIndexResult<Vec<Conflict>> {
        let rows = sqlx::query("SELECT * FROM conflicts WHERE job_id = ?")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Conflict {
                    conflict_id: row.try_get("conflict_id")?,
                    job_id: row.try_get("job_id")?,
                    src: RecordRef::new(
                        row.try_get::<String, _>("src_adapter")?,
                        row.try_get::<String, _>("src_table")?,
                        row.try_get::<String, _>("src_id")?,
                    ),
                    dest: RecordRef::new(
                        row.try_get::<String, _>("dest_adapter")?,
                        row.try_get::<String, _>("dest_table")?,
                        row.try_get::<String, _>("dest_id")?,
                    ),
                    src_payload: serde_json::from_str(&row.try_get::<String, _>("src_payload")?)?,
                    dest_payload: serde_json::from_str(&row.try_get::<String, _>("dest_payload")?)?,
                    detected_at: DateTime::parse_from_rfc3339(&row.try_get::<String, _>("detected_at")?)
                        .unwrap()
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    async fn resolve_conflict(&self, conflict_id: &str) -> LinkIndexResult<()> {
        sqlx::query("DELETE FROM conflicts WHERE conflict_id = ?")
            .bind(conflict_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_run(&self, summary: &RunSummary) -> LinkIndexResult<()> {
        let status = match summary.status {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        };
        sqlx::query(
            "INSERT INTO runs (run_id, job_id, started_at, ended_at, status, summary_json)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&summary.run_id)
        .bind(&summary.job_id)
        .bind(summary.started_at.to_rfc3339())
        .bind(summary.ended_at.to_rfc3339())
        .bind(status)
        .bind(summary.summary.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
