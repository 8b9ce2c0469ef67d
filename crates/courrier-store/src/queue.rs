//! The durable sync queue.
//!
//! Entries are persisted before the enqueue call returns, so a crash after
//! enqueue never loses the intent.  Drain order is priority descending then
//! age ascending; eligibility is gated on the backoff clock
//! (`next_attempt_ms`) and the retry budget.  Exhausted entries stay in
//! place, visibly failed, until the lifecycle sweep removes them.

use rusqlite::params;
use uuid::Uuid;

use courrier_shared::protocol::SyncOperation;

use crate::convert::parse_uuid;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::SyncQueueEntry;

impl Database {
    /// Serialize `op` and append it to the queue.  Durable on return.
    pub fn enqueue_operation(
        &self,
        op: &SyncOperation,
        max_retries: i64,
        now_ms: i64,
    ) -> Result<SyncQueueEntry> {
        let payload = op
            .to_bytes()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let entry = SyncQueueEntry {
            id: Uuid::new_v4(),
            op_kind: op.kind().to_string(),
            payload,
            priority: op.priority(),
            retry_count: 0,
            max_retries,
            next_attempt_ms: 0,
            last_error: None,
            created_at_ms: now_ms,
        };

        self.insert_queue_entry(&entry)?;
        Ok(entry)
    }

    pub fn insert_queue_entry(&self, entry: &SyncQueueEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sync_queue (id, op_kind, payload, priority, retry_count, max_retries,
                                     next_attempt_ms, last_error, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO NOTHING",
            params![
                entry.id.to_string(),
                entry.op_kind,
                entry.payload,
                entry.priority,
                entry.retry_count,
                entry.max_retries,
                entry.next_attempt_ms,
                entry.last_error,
                entry.created_at_ms,
            ],
        )?;
        Ok(())
    }

    /// Entries eligible for a drain attempt at `now_ms`: backoff elapsed and
    /// retry budget not spent.  Priority bands first, oldest first within a
    /// band.
    pub fn due_queue_entries(&self, now_ms: i64, limit: u32) -> Result<Vec<SyncQueueEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, op_kind, payload, priority, retry_count, max_retries,
                    next_attempt_ms, last_error, created_at_ms
             FROM sync_queue
             WHERE next_attempt_ms <= ?1 AND retry_count < max_retries
             ORDER BY priority DESC, created_at_ms ASC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![now_ms, limit], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Entries whose retry budget is spent.  Surfaced to the UI as
    /// permanently failed; removal is the lifecycle sweep's job.
    pub fn exhausted_queue_entries(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, op_kind, payload, priority, retry_count, max_retries,
                    next_attempt_ms, last_error, created_at_ms
             FROM sync_queue
             WHERE retry_count >= max_retries
             ORDER BY created_at_ms ASC",
        )?;

        let rows = stmt.query_map([], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Remove a delivered entry.
    pub fn delete_queue_entry(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM sync_queue WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Record a failed attempt: bump the retry counter, remember the error,
    /// and push eligibility out to `next_attempt_ms`.
    pub fn record_queue_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_ms: i64,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sync_queue SET
                 retry_count = retry_count + 1,
                 last_error = ?2,
                 next_attempt_ms = ?3
             WHERE id = ?1",
            params![id.to_string(), error, next_attempt_ms],
        )?;
        Ok(affected > 0)
    }

    /// Delete exhausted entries created before `cutoff_ms`.  Entries still
    /// inside their retry budget are never touched, however old.
    pub fn sweep_exhausted_entries(&self, cutoff_ms: i64) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM sync_queue WHERE retry_count >= max_retries AND created_at_ms < ?1",
            params![cutoff_ms],
        )?;
        Ok(affected)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncQueueEntry> {
    let id_str: String = row.get(0)?;

    Ok(SyncQueueEntry {
        id: parse_uuid(0, &id_str)?,
        op_kind: row.get(1)?,
        payload: row.get(2)?,
        priority: row.get(3)?,
        retry_count: row.get(4)?,
        max_retries: row.get(5)?,
        next_attempt_ms: row.get(6)?,
        last_error: row.get(7)?,
        created_at_ms: row.get(8)?,
    })
}
