//! The lifecycle scheduler.
//!
//! Runs once at startup and on a fixed interval after that.  Each sub-task
//! is wrapped independently: a failing sweep is logged and recorded, never
//! allowed to abort the other sweeps.

use std::sync::MutexGuard;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use courrier_store::{Database, StorageStats};

use crate::error::SyncError;
use crate::SharedDatabase;

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct CleanupReport {
    pub expired_messages: usize,
    pub expired_stories: usize,
    pub swept_queue_entries: usize,
    pub stats: Option<StorageStats>,
    /// One entry per failed sub-task.  Failures here never abort the pass.
    pub errors: Vec<String>,
}

/// Periodic store maintenance: disappearing messages, expired stories,
/// dead queue entries, storage statistics.
pub struct LifecycleScheduler {
    store: SharedDatabase,
    /// Exhausted queue entries older than this are swept.
    queue_staleness_ms: i64,
}

impl LifecycleScheduler {
    pub fn new(store: SharedDatabase, queue_staleness_ms: i64) -> Self {
        Self {
            store,
            queue_staleness_ms,
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, Database>, SyncError> {
        self.store.lock().map_err(|_| SyncError::LockPoisoned)
    }

    /// Run every sub-task once.  Each is individually fallible and
    /// individually retryable on the next tick.
    pub fn sweep(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();

        match self.sweep_messages(now) {
            Ok(n) => report.expired_messages = n,
            Err(e) => {
                tracing::warn!(error = %e, "expired-message sweep failed");
                report.errors.push(format!("messages: {e}"));
            }
        }

        match self.sweep_stories(now) {
            Ok(n) => report.expired_stories = n,
            Err(e) => {
                tracing::warn!(error = %e, "expired-story sweep failed");
                report.errors.push(format!("stories: {e}"));
            }
        }

        match self.sweep_queue(now) {
            Ok(n) => report.swept_queue_entries = n,
            Err(e) => {
                tracing::warn!(error = %e, "queue sweep failed");
                report.errors.push(format!("queue: {e}"));
            }
        }

        match self.recompute_stats(now) {
            Ok(stats) => report.stats = Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "storage stats failed");
                report.errors.push(format!("stats: {e}"));
            }
        }

        tracing::info!(
            expired_messages = report.expired_messages,
            expired_stories = report.expired_stories,
            swept_queue = report.swept_queue_entries,
            errors = report.errors.len(),
            "lifecycle sweep complete"
        );
        report
    }

    fn sweep_messages(&self, now: DateTime<Utc>) -> Result<usize, SyncError> {
        Ok(self.store()?.delete_expired_messages(now)?)
    }

    fn sweep_stories(&self, now: DateTime<Utc>) -> Result<usize, SyncError> {
        Ok(self.store()?.delete_expired_stories(now)?)
    }

    /// Delete queue entries that are both out of retry budget and older
    /// than the staleness window.  Entries still within budget survive,
    /// however old they are.
    fn sweep_queue(&self, now: DateTime<Utc>) -> Result<usize, SyncError> {
        let cutoff = now.timestamp_millis() - self.queue_staleness_ms;
        Ok(self.store()?.sweep_exhausted_entries(cutoff)?)
    }

    fn recompute_stats(&self, now: DateTime<Utc>) -> Result<StorageStats, SyncError> {
        let db = self.store()?;
        let stats = db.storage_stats()?;
        db.record_cleanup_run(now)?;
        Ok(stats)
    }

    /// Drive the scheduler until shutdown.  The first tick fires
    /// immediately, covering the startup sweep.
    pub async fn run(self, period: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(Utc::now());
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("lifecycle scheduler stopping");
                    break;
                }
            }
        }
    }
}
