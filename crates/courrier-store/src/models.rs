//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.  Cross-entity references are always ids, never
//! embedded objects; the read boundary resolves them on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courrier_shared::types::{
    CallDirection, CallOutcome, ChatId, ChatKind, MessageId, MessageKind, MessageStatus, StoryId,
    UploadStatus, UserId,
};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.  Content of encrypted kinds is always ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Client-generated id, immutable once created and stable across send
    /// retries.
    pub id: MessageId,
    /// The chat this message belongs to.
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: Option<UserId>,
    pub kind: MessageKind,
    /// Ciphertext for encrypted kinds, raw bytes otherwise.
    pub content: Vec<u8>,
    /// Fresh per-message AEAD nonce; `None` for unencrypted kinds.
    pub nonce: Option<Vec<u8>>,
    /// Owning media file, if any.
    pub file_id: Option<Uuid>,
    pub thumbnail: Option<String>,
    /// Replied-to message id.  Resolved at the read boundary.
    pub reply_to: Option<MessageId>,
    pub forwarded_from: Option<MessageId>,
    pub status: MessageStatus,
    /// Soft-deleted on this device only.
    pub deleted_locally: bool,
    /// Deleted for everyone: content and file reference are scrubbed.
    pub deleted_for_everyone: bool,
    pub edited_at: Option<DateTime<Utc>>,
    /// Disappearing messages carry their purge deadline.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the backend has acknowledged this record.
    pub synced: bool,
    pub deleted_on_backend: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation.  For 1:1 chats the id equals the counterpart's user id.
///
/// The boolean flags are independent and combine freely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    /// Most recent message id.  Resolved at the read boundary.
    pub last_message_id: Option<MessageId>,
    /// Non-negative; reset only by an explicit mark-read.
    pub unread_count: i64,
    pub is_locked: bool,
    pub is_hidden: bool,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub is_archived: bool,
    pub is_blocked: bool,
    /// Disappearing-message TTL applied to new messages in this chat.
    pub disappearing_ttl_secs: Option<i64>,
    pub wallpaper: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// A fresh chat shell with all flags clear.
    pub fn new(id: ChatId, kind: ChatKind, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            title: None,
            avatar_url: None,
            last_message_id: None,
            unread_count: 0,
            is_locked: false,
            is_hidden: false,
            is_pinned: false,
            is_muted: false,
            is_archived: false,
            is_blocked: false,
            disappearing_ttl_secs: None,
            wallpaper: None,
            last_activity: now,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A known user.  Presence fields merge last-write-wins on `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_friend: bool,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

/// One user's reaction to a message.  Unique per (message, user, emoji).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// An ephemeral story.  Always expires; the lifecycle scheduler purges it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: StoryId,
    pub author_id: UserId,
    pub kind: MessageKind,
    pub content: Vec<u8>,
    pub nonce: Option<Vec<u8>>,
    pub media_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

/// Record of a past voice/video call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallLog {
    pub id: Uuid,
    pub chat_id: ChatId,
    pub peer_id: UserId,
    pub direction: CallDirection,
    pub video: bool,
    pub outcome: CallOutcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Media file
// ---------------------------------------------------------------------------

/// What a media file belongs to.  Media is exclusively owned and removed
/// with its owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaOwner {
    Message,
    Story,
}

impl MediaOwner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Story => "story",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "message" => Some(Self::Message),
            "story" => Some(Self::Story),
            _ => None,
        }
    }
}

/// Metadata for a media file referenced by a message or story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaFile {
    pub id: Uuid,
    pub owner_kind: MediaOwner,
    pub owner_id: Uuid,
    pub kind: MessageKind,
    pub mime_type: String,
    pub size_bytes: i64,
    /// BLAKE3 content hash (hex string), for post-download verification.
    pub checksum: Option<String>,
    pub thumbnail: Option<String>,
    pub local_path: Option<String>,
    pub remote_url: Option<String>,
    pub downloaded: bool,
    /// Download progress in `0.0..=1.0`.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pending upload
// ---------------------------------------------------------------------------

/// Large-binary transfer tracked apart from the sync queue so binary
/// retries never block small control messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingUpload {
    pub id: Uuid,
    pub owner_kind: MediaOwner,
    pub owner_id: Uuid,
    pub media_id: Uuid,
    pub status: UploadStatus,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sync queue entry
// ---------------------------------------------------------------------------

/// A durable outbound operation awaiting delivery to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncQueueEntry {
    pub id: Uuid,
    pub op_kind: String,
    /// bincode-serialized [`courrier_shared::protocol::SyncOperation`].
    pub payload: Vec<u8>,
    pub priority: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    /// Unix millis before which the entry is not eligible for drain.
    pub next_attempt_ms: i64,
    pub last_error: Option<String>,
    pub created_at_ms: i64,
}

impl SyncQueueEntry {
    /// Whether the retry budget is spent.  Exhausted entries stay queued in
    /// a visible failed state until the staleness sweep removes them.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

// ---------------------------------------------------------------------------
// Storage statistics
// ---------------------------------------------------------------------------

/// Row counts and file size, recomputed by the lifecycle scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageStats {
    pub chats: i64,
    pub messages: i64,
    pub contacts: i64,
    pub stories: i64,
    pub media_files: i64,
    pub queue_entries: i64,
    pub db_bytes: u64,
}
