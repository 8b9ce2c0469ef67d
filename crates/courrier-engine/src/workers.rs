//! Background tasks: the periodic queue drain and the lifecycle scheduler.
//!
//! Both run as dedicated tokio tasks and are controlled through typed
//! command channels, keeping the engine itself free of loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use courrier_sync::{LifecycleScheduler, RemoteBackend, SyncQueue};

use crate::events::EngineEvent;

/// Commands sent *into* the drain task.
#[derive(Debug)]
pub(crate) enum DrainCommand {
    /// Drain as soon as possible (a local write just enqueued work, or
    /// connectivity returned).
    DrainNow,
    /// Gracefully stop the task.
    Shutdown,
}

/// Spawn the drain loop.  The first tick fires immediately so a backlog
/// queued while the app was closed starts moving at startup.
pub(crate) fn spawn_drain_worker<B>(
    queue: Arc<SyncQueue<B>>,
    batch_size: u32,
    period: Duration,
    events_tx: mpsc::Sender<EngineEvent>,
) -> (mpsc::Sender<DrainCommand>, JoinHandle<()>)
where
    B: RemoteBackend + Send + Sync + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(DrainCommand::DrainNow) => {
                        run_drain(&queue, batch_size, &events_tx).await;
                    }
                    Some(DrainCommand::Shutdown) | None => {
                        tracing::debug!("drain worker stopping");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    run_drain(&queue, batch_size, &events_tx).await;
                }
            }
        }
    });

    (cmd_tx, handle)
}

async fn run_drain<B: RemoteBackend>(
    queue: &SyncQueue<B>,
    batch_size: u32,
    events_tx: &mpsc::Sender<EngineEvent>,
) {
    match queue.drain(batch_size).await {
        Ok(report) => {
            if report.attempted > 0 {
                emit(
                    events_tx,
                    EngineEvent::SyncCompleted {
                        delivered: report.delivered,
                        failed: report.failed,
                    },
                );
            }
            for entry_id in report.exhausted {
                emit(events_tx, EngineEvent::SyncPermanentFailure { entry_id });
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "drain pass failed");
        }
    }
}

/// Spawn the lifecycle scheduler task.
pub(crate) fn spawn_scheduler(
    scheduler: LifecycleScheduler,
    period: Duration,
) -> (mpsc::Sender<()>, JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let handle = tokio::spawn(scheduler.run(period, shutdown_rx));
    (shutdown_tx, handle)
}

/// Best-effort event delivery.  The store is the source of truth; a full
/// channel drops the nudge rather than blocking the engine.
pub(crate) fn emit(events_tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if let Err(e) = events_tx.try_send(event) {
        tracing::warn!(error = %e, "event channel full, notification dropped");
    }
}
