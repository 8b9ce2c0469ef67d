//! Notifications sent from the engine to the host UI.
//!
//! Delivered over a bounded `mpsc` channel returned by
//! [`Engine::start`](crate::Engine::start).  The engine never blocks on a
//! slow consumer; a full channel drops the notification with a warning (the
//! store remains the source of truth, events are only nudges to re-read).

use serde::Serialize;
use uuid::Uuid;

use courrier_shared::types::{ChatId, MessageId, MessageStatus, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineEvent {
    /// A new message was reconciled into `chat_id`.
    MessageArrived {
        chat_id: ChatId,
        message_id: MessageId,
    },

    /// A message's delivery status moved forward.
    MessageStatusChanged {
        message_id: MessageId,
        status: MessageStatus,
    },

    /// Contact profile or presence changed.
    ContactUpdated { user_id: UserId },

    /// A drain pass finished with work done.
    SyncCompleted { delivered: usize, failed: usize },

    /// A queue entry spent its retry budget.  The entry stays queued and
    /// visible until the staleness sweep.
    SyncPermanentFailure { entry_id: Uuid },

    /// The host platform denied the durable-storage request; local data may
    /// be evicted under pressure.  Non-fatal.
    DegradedStorage,
}
