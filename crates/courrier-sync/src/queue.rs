//! Draining the durable sync queue against the remote backend.
//!
//! Phase two of the optimistic-write protocol: phase one wrote the store and
//! enqueued an entry synchronously; this module delivers entries in the
//! background and commits the outcome of each item individually, so a
//! cancelled drain leaves consistent state behind.

use std::sync::MutexGuard;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use courrier_shared::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_MAX_RETRIES,
};
use courrier_shared::protocol::SyncOperation;
use courrier_shared::types::MessageStatus;
use courrier_store::{Database, SyncQueueEntry};

use crate::backend::RemoteBackend;
use crate::error::SyncError;
use crate::SharedDatabase;

/// Retry/backoff knobs for the queue.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: i64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES as i64,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after `retry_count` failures:
    /// `base * 2^retry_count`, capped, plus jitter to spread thundering
    /// reconnects.
    pub fn backoff_ms(&self, retry_count: i64) -> u64 {
        let shift = retry_count.clamp(0, 16) as u32;
        let capped = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_max_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped / 2);
        capped + jitter
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Entries that spent their retry budget during this pass.  They stay
    /// queued, visibly failed, for the UI and the lifecycle sweep.
    pub exhausted: Vec<Uuid>,
}

/// The outbound sync queue: enqueue on local mutation, drain in the
/// background.
pub struct SyncQueue<B> {
    store: SharedDatabase,
    backend: B,
    policy: RetryPolicy,
}

impl<B: RemoteBackend> SyncQueue<B> {
    pub fn new(store: SharedDatabase, backend: B, policy: RetryPolicy) -> Self {
        Self {
            store,
            backend,
            policy,
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, Database>, SyncError> {
        self.store.lock().map_err(|_| SyncError::LockPoisoned)
    }

    /// Persist an outbound operation.  Durable before this returns: a crash
    /// after enqueue never loses the intent.
    pub fn enqueue(&self, op: &SyncOperation) -> Result<SyncQueueEntry, SyncError> {
        self.enqueue_with_budget(op, self.policy.max_retries)
    }

    /// [`Self::enqueue`] with an explicit retry budget.  Ephemeral
    /// operations (typing) get a budget of one: a single failed attempt
    /// leaves them for the staleness sweep instead of retrying stale state.
    pub fn enqueue_with_budget(
        &self,
        op: &SyncOperation,
        max_retries: i64,
    ) -> Result<SyncQueueEntry, SyncError> {
        let now_ms = Utc::now().timestamp_millis();
        let entry = self.store()?.enqueue_operation(op, max_retries, now_ms)?;

        tracing::debug!(
            entry = %entry.id,
            kind = %entry.op_kind,
            priority = entry.priority,
            "operation enqueued"
        );
        Ok(entry)
    }

    /// Drain up to `batch_size` eligible entries.
    ///
    /// The batch is selected under the store lock, but every push happens
    /// outside it.  Each entry's outcome is committed individually, so the
    /// caller may cancel between items without corrupting state.
    pub async fn drain(&self, batch_size: u32) -> Result<DrainReport, SyncError> {
        let now_ms = Utc::now().timestamp_millis();
        let batch = self.store()?.due_queue_entries(now_ms, batch_size)?;

        let mut report = DrainReport::default();

        for entry in batch {
            report.attempted += 1;

            let op = match SyncOperation::from_bytes(&entry.payload) {
                Ok(op) => op,
                Err(e) => {
                    // Undecodable payload: burn a retry so it eventually
                    // exhausts and the sweep removes it.
                    tracing::warn!(entry = %entry.id, error = %e, "corrupt queue payload");
                    self.record_failure(&entry, &e.to_string(), &mut report)?;
                    continue;
                }
            };

            match self.backend.push(op.clone()).await {
                Ok(_ack) => {
                    self.commit_delivery(&entry, &op)?;
                    report.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        entry = %entry.id,
                        kind = %entry.op_kind,
                        retry = entry.retry_count,
                        error = %e,
                        "push failed"
                    );
                    self.record_failure(&entry, &e.to_string(), &mut report)?;
                }
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "queue drained"
            );
        }
        Ok(report)
    }

    /// Entries whose retry budget is spent, for surfacing in the UI.
    pub fn permanent_failures(&self) -> Result<Vec<SyncQueueEntry>, SyncError> {
        Ok(self.store()?.exhausted_queue_entries()?)
    }

    /// Remove the entry and reflect the delivery on the originating record.
    fn commit_delivery(&self, entry: &SyncQueueEntry, op: &SyncOperation) -> Result<(), SyncError> {
        let now = Utc::now();
        let db = self.store()?;

        db.delete_queue_entry(entry.id)?;
        match op {
            SyncOperation::SendMessage(send) => {
                db.mark_message_sent(send.id, now)?;
            }
            SyncOperation::Delete { message_id, .. } => {
                db.mark_message_deleted_on_backend(*message_id, now)?;
            }
            // Status updates, reactions, receipts and typing carry no
            // local bookkeeping beyond the entry itself.
            _ => {}
        }
        Ok(())
    }

    fn record_failure(
        &self,
        entry: &SyncQueueEntry,
        error: &str,
        report: &mut DrainReport,
    ) -> Result<(), SyncError> {
        let now = Utc::now();
        let next_attempt = now.timestamp_millis() + self.policy.backoff_ms(entry.retry_count) as i64;

        let db = self.store()?;
        db.record_queue_failure(entry.id, error, next_attempt)?;
        report.failed += 1;

        if entry.retry_count + 1 >= entry.max_retries {
            report.exhausted.push(entry.id);

            // A send that exhausted its budget is a visible failure on the
            // message itself, not just on the queue entry.
            if let Ok(op) = SyncOperation::from_bytes(&entry.payload) {
                if let SyncOperation::SendMessage(send) = op {
                    db.merge_message_status(send.id, MessageStatus::Failed, now)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use courrier_shared::protocol::MessageSend;
    use courrier_shared::types::{ChatId, ChatKind, MessageId, MessageKind, UserId};
    use courrier_store::{Chat, Message};

    use crate::backend::PushAck;

    /// Backend that fails the first `failures` pushes, then succeeds.
    struct FlakyBackend {
        failures: AtomicUsize,
        pushed: Mutex<Vec<SyncOperation>>,
    }

    impl FlakyBackend {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                pushed: Mutex::new(Vec::new()),
            }
        }
    }

    impl RemoteBackend for &FlakyBackend {
        async fn push(&self, op: SyncOperation) -> Result<PushAck, SyncError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SyncError::Delivery("backend unreachable".to_string()));
            }
            self.pushed.lock().unwrap().push(op);
            Ok(PushAck {
                server_time: Utc::now(),
            })
        }
    }

    fn shared_db() -> SharedDatabase {
        Arc::new(Mutex::new(Database::open_in_memory().unwrap()))
    }

    fn fast_policy(max_retries: i64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    fn seed_pending_message(store: &SharedDatabase) -> (ChatId, MessageId) {
        let db = store.lock().unwrap();
        let now = Utc::now();
        let chat = Chat::new(ChatId::new(), ChatKind::Direct, now);
        db.upsert_chat(&chat).unwrap();

        let msg = Message {
            id: MessageId::new(),
            chat_id: chat.id,
            sender_id: UserId::new(),
            receiver_id: None,
            kind: MessageKind::Text,
            content: vec![1, 2, 3],
            nonce: Some(vec![0u8; 24]),
            file_id: None,
            thumbnail: None,
            reply_to: None,
            forwarded_from: None,
            status: courrier_shared::types::MessageStatus::Pending,
            deleted_locally: false,
            deleted_for_everyone: false,
            edited_at: None,
            expires_at: None,
            synced: false,
            deleted_on_backend: false,
            created_at: now,
            updated_at: now,
        };
        db.upsert_message(&msg).unwrap();
        (chat.id, msg.id)
    }

    fn send_op(store: &SharedDatabase, chat_id: ChatId, id: MessageId) -> SyncOperation {
        let msg = store.lock().unwrap().get_message(id).unwrap();
        SyncOperation::SendMessage(MessageSend {
            id,
            chat_id,
            sender_id: msg.sender_id,
            receiver_id: None,
            kind: msg.kind,
            content: msg.content,
            nonce: msg.nonce,
            file_id: None,
            reply_to: None,
            forwarded_from: None,
            expires_at: None,
            created_at: msg.created_at,
        })
    }

    #[tokio::test]
    async fn offline_send_then_successful_drain() {
        let store = shared_db();
        let (chat_id, msg_id) = seed_pending_message(&store);

        let backend = FlakyBackend::new(0);
        let queue = SyncQueue::new(store.clone(), &backend, fast_policy(5));

        queue.enqueue(&send_op(&store, chat_id, msg_id)).unwrap();

        // Offline state: message pending, one queue entry.
        {
            let db = store.lock().unwrap();
            let msg = db.get_message(msg_id).unwrap();
            assert_eq!(msg.status, courrier_shared::types::MessageStatus::Pending);
            assert_eq!(db.due_queue_entries(i64::MAX, 10).unwrap().len(), 1);
        }

        let report = queue.drain(10).await.unwrap();
        assert_eq!(report.delivered, 1);

        // Delivered: status advanced, synced set, entry gone.
        let db = store.lock().unwrap();
        let msg = db.get_message(msg_id).unwrap();
        assert_eq!(msg.status, courrier_shared::types::MessageStatus::Sent);
        assert!(msg.synced);
        assert!(db.due_queue_entries(i64::MAX, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_retry_then_exhaust() {
        let store = shared_db();
        let (chat_id, msg_id) = seed_pending_message(&store);

        let backend = FlakyBackend::new(usize::MAX);
        let queue = SyncQueue::new(store.clone(), &backend, fast_policy(2));

        queue.enqueue(&send_op(&store, chat_id, msg_id)).unwrap();

        let first = queue.drain(10).await.unwrap();
        assert_eq!(first.failed, 1);
        assert!(first.exhausted.is_empty());

        let second = queue.drain(10).await.unwrap();
        assert_eq!(second.failed, 1);
        assert_eq!(second.exhausted.len(), 1);

        // The entry is retained, the message is visibly failed.
        let failures = queue.permanent_failures().unwrap();
        assert_eq!(failures.len(), 1);

        let status = store.lock().unwrap().get_message(msg_id).unwrap().status;
        assert_eq!(status, courrier_shared::types::MessageStatus::Failed);

        // Exhausted entries are no longer attempted.
        let third = queue.drain(10).await.unwrap();
        assert_eq!(third.attempted, 0);
    }

    #[tokio::test]
    async fn drain_respects_priority_bands() {
        let store = shared_db();
        let (chat_id, msg_id) = seed_pending_message(&store);

        let backend = FlakyBackend::new(0);
        let queue = SyncQueue::new(store.clone(), &backend, fast_policy(5));

        // Typing first in time, send second: the send must still drain first.
        queue
            .enqueue(&SyncOperation::Typing {
                chat_id,
                user_id: UserId::new(),
                active: true,
            })
            .unwrap();
        queue.enqueue(&send_op(&store, chat_id, msg_id)).unwrap();

        queue.drain(10).await.unwrap();

        let pushed = backend.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 2);
        assert!(matches!(pushed[0], SyncOperation::SendMessage(_)));
        assert!(matches!(pushed[1], SyncOperation::Typing { .. }));
    }
}
