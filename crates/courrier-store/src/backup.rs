use serde::{Deserialize, Serialize};

use courrier_shared::types::{ChatId, MessageId, MessageKind, MessageStatus, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, Contact, Message};

/// Full backup payload — serialized to JSON by the caller.  Message content
/// stays ciphertext; restoring it is only useful together with the matching
/// key blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupPayload {
    /// ISO 8601 timestamp of when the backup was created
    pub created_at: String,
    /// App version that produced the backup
    pub version: String,
    pub chats: Vec<Chat>,
    pub contacts: Vec<Contact>,
    pub messages: Vec<BackupMessage>,
}

/// Message row with binary columns hex-encoded for JSON transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub kind: String,
    pub content_hex: String,
    pub nonce_hex: Option<String>,
    pub status: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ImportStats {
    pub chats_imported: usize,
    pub contacts_imported: usize,
    pub messages_imported: usize,
}

impl Database {
    /// Export all chats, contacts and messages into a serializable struct.
    pub fn export_backup(&self) -> Result<BackupPayload> {
        let chats = self.chats_ordered_by_recency(true)?;
        let contacts = self.list_contacts()?;

        let mut messages = Vec::new();
        for chat in &chats {
            // Full history per chat (large limit).
            for m in self.messages_by_chat(chat.id, 1_000_000, 0)? {
                messages.push(BackupMessage {
                    id: m.id.to_string(),
                    chat_id: m.chat_id.to_string(),
                    sender_id: m.sender_id.to_string(),
                    kind: m.kind.as_str().to_string(),
                    content_hex: hex::encode(&m.content),
                    nonce_hex: m.nonce.as_deref().map(hex::encode),
                    status: m.status.as_i64(),
                    created_at: m.created_at.to_rfc3339(),
                    updated_at: m.updated_at.to_rfc3339(),
                });
            }
        }

        Ok(BackupPayload {
            created_at: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            chats,
            contacts,
            messages,
        })
    }

    /// Import a backup payload, merging with existing data.  Existing rows
    /// win; only genuinely new ids are counted.
    pub fn import_backup(&self, payload: &BackupPayload) -> Result<ImportStats> {
        let mut stats = ImportStats::default();

        for chat in &payload.chats {
            if self.upsert_chat(chat)? {
                stats.chats_imported += 1;
            }
        }

        for contact in &payload.contacts {
            self.upsert_contact(contact)?;
            stats.contacts_imported += 1;
        }

        for msg in &payload.messages {
            let parsed = backup_message_to_model(msg)?;
            if self.upsert_message(&parsed)? {
                stats.messages_imported += 1;
            }
        }

        Ok(stats)
    }
}

fn backup_message_to_model(msg: &BackupMessage) -> Result<Message> {
    let created_at = chrono::DateTime::parse_from_rfc3339(&msg.created_at)?
        .with_timezone(&chrono::Utc);
    let updated_at = chrono::DateTime::parse_from_rfc3339(&msg.updated_at)?
        .with_timezone(&chrono::Utc);

    let kind = MessageKind::from_str(&msg.kind)
        .ok_or_else(|| StoreError::Serialization(format!("unknown message kind: {}", msg.kind)))?;
    let status = MessageStatus::from_i64(msg.status)
        .ok_or_else(|| StoreError::Serialization(format!("invalid status: {}", msg.status)))?;

    Ok(Message {
        id: MessageId(uuid::Uuid::parse_str(&msg.id)?),
        chat_id: ChatId(uuid::Uuid::parse_str(&msg.chat_id)?),
        sender_id: UserId(uuid::Uuid::parse_str(&msg.sender_id)?),
        receiver_id: None,
        kind,
        content: hex::decode(&msg.content_hex)?,
        nonce: msg.nonce_hex.as_deref().map(hex::decode).transpose()?,
        file_id: None,
        thumbnail: None,
        reply_to: None,
        forwarded_from: None,
        status,
        deleted_locally: false,
        deleted_for_everyone: false,
        edited_at: None,
        expires_at: None,
        synced: true,
        deleted_on_backend: false,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courrier_shared::types::ChatKind;

    #[test]
    fn export_import_merge() {
        let src = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let chat = Chat::new(ChatId::new(), ChatKind::Direct, now);
        src.upsert_chat(&chat).unwrap();

        let msg = Message {
            id: MessageId::new(),
            chat_id: chat.id,
            sender_id: UserId::new(),
            receiver_id: None,
            kind: MessageKind::Text,
            content: vec![7, 7, 7],
            nonce: Some(vec![0u8; 24]),
            file_id: None,
            thumbnail: None,
            reply_to: None,
            forwarded_from: None,
            status: MessageStatus::Sent,
            deleted_locally: false,
            deleted_for_everyone: false,
            edited_at: None,
            expires_at: None,
            synced: true,
            deleted_on_backend: false,
            created_at: now,
            updated_at: now,
        };
        src.upsert_message(&msg).unwrap();

        let payload = src.export_backup().unwrap();

        let dst = Database::open_in_memory().unwrap();
        let stats = dst.import_backup(&payload).unwrap();
        assert_eq!(stats.chats_imported, 1);
        assert_eq!(stats.messages_imported, 1);

        // Re-importing merges without duplicating.
        let stats = dst.import_backup(&payload).unwrap();
        assert_eq!(stats.chats_imported, 0);
        assert_eq!(stats.messages_imported, 0);

        let restored = dst.messages_by_chat(chat.id, 10, 0).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].content, vec![7, 7, 7]);
    }
}
