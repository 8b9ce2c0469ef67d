//! Storage usage statistics, recomputed by the lifecycle scheduler.

use crate::database::Database;
use crate::error::Result;
use crate::models::StorageStats;

impl Database {
    /// Row counts per table plus the database file size.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let count = |table: &str| -> Result<i64> {
            // Table names come from the closed list below, never from input.
            let n = self.conn().query_row(
                &format!("SELECT COUNT(*) FROM {table}"),
                [],
                |row| row.get(0),
            )?;
            Ok(n)
        };

        let db_bytes = self
            .path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StorageStats {
            chats: count("chats")?,
            messages: count("messages")?,
            contacts: count("contacts")?,
            stories: count("stories")?,
            media_files: count("media_files")?,
            queue_entries: count("sync_queue")?,
            db_bytes,
        })
    }
}
