use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{PRIORITY_MESSAGE, PRIORITY_TYPING, PRIORITY_UPDATE};
use crate::error::ProtocolError;
use crate::types::{ChatId, MessageId, MessageKind, MessageStatus, UserId};

/// Outbound operations projected from local mutations onto the backend.
///
/// Serialized with bincode into the sync-queue payload column; the queue is
/// drained oldest-first within priority bands, message sends above
/// everything that refers to them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncOperation {
    /// Send a message (ciphertext travels as stored, the backend never sees
    /// plaintext for encrypted kinds).
    SendMessage(MessageSend),

    /// Advance a message's delivery status.
    StatusUpdate {
        message_id: MessageId,
        chat_id: ChatId,
        status: MessageStatus,
    },

    /// Add or remove a reaction.
    Reaction {
        message_id: MessageId,
        chat_id: ChatId,
        user_id: UserId,
        emoji: String,
        remove: bool,
    },

    /// Delete a message, locally acknowledged already.
    Delete {
        message_id: MessageId,
        chat_id: ChatId,
        for_everyone: bool,
    },

    /// Ephemeral typing indicator.
    Typing {
        chat_id: ChatId,
        user_id: UserId,
        active: bool,
    },

    /// Everything up to `up_to` in `chat_id` has been read locally.
    ReadReceipt {
        chat_id: ChatId,
        user_id: UserId,
        up_to: MessageId,
    },
}

/// Payload of a [`SyncOperation::SendMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageSend {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: Option<UserId>,
    pub kind: MessageKind,
    /// Ciphertext for encrypted kinds, raw bytes otherwise.
    pub content: Vec<u8>,
    pub nonce: Option<Vec<u8>>,
    pub file_id: Option<Uuid>,
    pub reply_to: Option<MessageId>,
    pub forwarded_from: Option<MessageId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SyncOperation {
    /// Stable tag stored in the queue's `op_kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "message",
            Self::StatusUpdate { .. } => "status",
            Self::Reaction { .. } => "reaction",
            Self::Delete { .. } => "delete",
            Self::Typing { .. } => "typing",
            Self::ReadReceipt { .. } => "read_receipt",
        }
    }

    /// Priority band.  Message sends strictly above updates so operations
    /// for one message id reach the backend in enqueue order.
    pub fn priority(&self) -> i64 {
        match self {
            Self::SendMessage(_) => PRIORITY_MESSAGE,
            Self::Typing { .. } => PRIORITY_TYPING,
            _ => PRIORITY_UPDATE,
        }
    }

    /// The message this operation refers to, when there is one.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::SendMessage(m) => Some(m.id),
            Self::StatusUpdate { message_id, .. }
            | Self::Reaction { message_id, .. }
            | Self::Delete { message_id, .. } => Some(*message_id),
            Self::Typing { .. } => None,
            Self::ReadReceipt { up_to, .. } => Some(*up_to),
        }
    }

    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Inbound events delivered by the backend's realtime feed.
///
/// Reconciliation folds these into the store; it never calls the network
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RemoteEvent {
    /// A message arrived (or an echo of our own send came back).
    Message(RemoteMessage),

    /// A delivery/read status changed on some device.
    Status {
        message_id: MessageId,
        chat_id: ChatId,
        status: MessageStatus,
        timestamp: DateTime<Utc>,
    },

    /// Presence changed for a contact.
    Presence {
        user_id: UserId,
        online: bool,
        last_seen: DateTime<Utc>,
    },

    /// Friend-graph change (new contact, profile update, unfriend).
    Friend(RemoteContact),
}

/// Message payload of a [`RemoteEvent::Message`].
///
/// Content arrives as transport plaintext; reconciliation encrypts
/// encrypted kinds before they reach the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: Option<UserId>,
    pub kind: MessageKind,
    pub content: String,
    pub file_id: Option<Uuid>,
    pub reply_to: Option<MessageId>,
    pub forwarded_from: Option<MessageId>,
    pub status: MessageStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// Contact payload of a [`RemoteEvent::Friend`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteContact {
    pub id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_friend: bool,
    pub timestamp: DateTime<Utc>,
}

impl RemoteEvent {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_operation_roundtrip() {
        let op = SyncOperation::SendMessage(MessageSend {
            id: MessageId::new(),
            chat_id: ChatId::new(),
            sender_id: UserId::new(),
            receiver_id: None,
            kind: MessageKind::Text,
            content: vec![1, 2, 3, 4, 5],
            nonce: Some(vec![0u8; 24]),
            file_id: None,
            reply_to: None,
            forwarded_from: None,
            expires_at: None,
            created_at: Utc::now(),
        });

        let bytes = op.to_bytes().unwrap();
        let restored = SyncOperation::from_bytes(&bytes).unwrap();
        assert_eq!(op, restored);
        assert_eq!(restored.kind(), "message");
    }

    #[test]
    fn test_priority_bands() {
        let typing = SyncOperation::Typing {
            chat_id: ChatId::new(),
            user_id: UserId::new(),
            active: true,
        };
        let status = SyncOperation::StatusUpdate {
            message_id: MessageId::new(),
            chat_id: ChatId::new(),
            status: MessageStatus::Delivered,
        };

        assert!(status.priority() > typing.priority());
        assert!(PRIORITY_MESSAGE > status.priority());
    }

    #[test]
    fn test_remote_event_roundtrip() {
        let event = RemoteEvent::Status {
            message_id: MessageId::new(),
            chat_id: ChatId::new(),
            status: MessageStatus::Read,
            timestamp: Utc::now(),
        };

        let bytes = event.to_bytes().unwrap();
        assert_eq!(RemoteEvent::from_bytes(&bytes).unwrap(), event);
    }
}
