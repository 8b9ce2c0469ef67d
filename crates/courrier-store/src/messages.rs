//! CRUD and state transitions for [`Message`] records.
//!
//! All writes are idempotent upserts keyed by id, and every state change is
//! a single SQL statement so interleaved async operations never lose
//! updates to read-modify-write races.

use chrono::{DateTime, Utc};
use rusqlite::params;

use courrier_shared::types::{ChatId, MessageId, MessageKind, MessageStatus, UserId};

use crate::convert::{parse_opt_ts, parse_opt_uuid, parse_tag, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

impl Database {
    /// Insert a message unless a row with the same id already exists.
    ///
    /// Returns `true` when a row was inserted.  A duplicate id is a no-op,
    /// not an error: the optimistic local write and a reconciled echo of
    /// the same send may race to create the same id.
    pub fn upsert_message(&self, message: &Message) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT INTO messages (
                 id, chat_id, sender_id, receiver_id, kind, content, nonce,
                 file_id, thumbnail, reply_to, forwarded_from, status,
                 deleted_locally, deleted_for_everyone, edited_at, expires_at,
                 synced, deleted_on_backend, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
             ON CONFLICT(id) DO NOTHING",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.map(|r| r.to_string()),
                message.kind.as_str(),
                message.content,
                message.nonce,
                message.file_id.map(|f| f.to_string()),
                message.thumbnail,
                message.reply_to.map(|r| r.to_string()),
                message.forwarded_from.map(|f| f.to_string()),
                message.status.as_i64(),
                message.deleted_locally as i32,
                message.deleted_for_everyone as i32,
                message.edited_at.map(|t| t.to_rfc3339()),
                message.expires_at.map(|t| t.to_rfc3339()),
                message.synced as i32,
                message.deleted_on_backend as i32,
                message.created_at.to_rfc3339(),
                message.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// Message history for one chat, ordered by creation time ascending.
    ///
    /// Locally soft-deleted rows are filtered out; expired rows stay
    /// visible until the lifecycle sweep removes them.
    pub fn messages_by_chat(
        &self,
        chat_id: ChatId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_id = ?1 AND deleted_locally = 0
             ORDER BY created_at ASC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![chat_id.to_string(), limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Merge an incoming status into a message, monotonically.
    ///
    /// The merge happens inside SQL so two interleaved writers cannot
    /// regress each other: `read` is final, `failed` outranks every
    /// non-terminal state, and anything lower than the stored value is a
    /// no-op.  Returns `false` when the message does not exist.
    pub fn merge_message_status(
        &self,
        id: MessageId,
        incoming: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET
                 status = CASE
                     WHEN status = 3 THEN status
                     WHEN ?2 > status THEN ?2
                     ELSE status
                 END,
                 updated_at = ?3
             WHERE id = ?1",
            params![id.to_string(), incoming.as_i64(), now.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Record a successful drain of this message's send operation: the
    /// backend has it, and the status advances to at least `sent`.
    pub fn mark_message_sent(&self, id: MessageId, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET
                 synced = 1,
                 status = CASE
                     WHEN status = 3 THEN status
                     WHEN ?2 > status THEN ?2
                     ELSE status
                 END,
                 updated_at = ?3
             WHERE id = ?1",
            params![
                id.to_string(),
                MessageStatus::Sent.as_i64(),
                now.to_rfc3339()
            ],
        )?;
        Ok(affected > 0)
    }

    /// Mark the backend as aware of this record without touching status.
    pub fn mark_message_synced(&self, id: MessageId, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET synced = 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), now.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Replace the (ciphertext) content of an edited message.
    pub fn set_message_edited(
        &self,
        id: MessageId,
        content: &[u8],
        nonce: Option<&[u8]>,
        edited_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?2, nonce = ?3, edited_at = ?4, synced = 0,
                                 updated_at = ?4
             WHERE id = ?1 AND deleted_for_everyone = 0",
            params![id.to_string(), content, nonce, edited_at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Soft-delete on this device only.  The row survives for sync
    /// bookkeeping but disappears from history reads.
    pub fn mark_message_deleted_locally(&self, id: MessageId, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET deleted_locally = 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), now.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Delete for everyone: scrub content and file reference in place.
    ///
    /// A `deleted_for_everyone` row must have empty content and no file
    /// reference; this statement enforces that invariant atomically.
    pub fn clear_message_for_everyone(&self, id: MessageId, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET
                 deleted_for_everyone = 1,
                 content = X'',
                 nonce = NULL,
                 file_id = NULL,
                 thumbnail = NULL,
                 updated_at = ?2
             WHERE id = ?1",
            params![id.to_string(), now.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn mark_message_deleted_on_backend(
        &self,
        id: MessageId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET deleted_on_backend = 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), now.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Hard-delete a message row.  Returns `true` if a row was deleted.
    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Purge disappearing messages whose expiry has passed.
    pub fn delete_expired_messages(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(affected)
    }
}

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, receiver_id, kind, content, nonce, \
     file_id, thumbnail, reply_to, forwarded_from, status, deleted_locally, \
     deleted_for_everyone, edited_at, expires_at, synced, deleted_on_backend, \
     created_at, updated_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_id_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let receiver_str: Option<String> = row.get(3)?;
    let kind_str: String = row.get(4)?;
    let content: Vec<u8> = row.get(5)?;
    let nonce: Option<Vec<u8>> = row.get(6)?;
    let file_id_str: Option<String> = row.get(7)?;
    let thumbnail: Option<String> = row.get(8)?;
    let reply_to_str: Option<String> = row.get(9)?;
    let forwarded_str: Option<String> = row.get(10)?;
    let status_int: i64 = row.get(11)?;
    let deleted_locally: i32 = row.get(12)?;
    let deleted_for_everyone: i32 = row.get(13)?;
    let edited_str: Option<String> = row.get(14)?;
    let expires_str: Option<String> = row.get(15)?;
    let synced: i32 = row.get(16)?;
    let deleted_on_backend: i32 = row.get(17)?;
    let created_str: String = row.get(18)?;
    let updated_str: String = row.get(19)?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id_str)?),
        chat_id: ChatId(parse_uuid(1, &chat_id_str)?),
        sender_id: UserId(parse_uuid(2, &sender_str)?),
        receiver_id: parse_opt_uuid(3, receiver_str)?.map(UserId),
        kind: parse_tag(4, &kind_str, MessageKind::from_str)?,
        content,
        nonce,
        file_id: parse_opt_uuid(7, file_id_str)?,
        thumbnail,
        reply_to: parse_opt_uuid(9, reply_to_str)?.map(MessageId),
        forwarded_from: parse_opt_uuid(10, forwarded_str)?.map(MessageId),
        status: MessageStatus::from_i64(status_int).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                11,
                rusqlite::types::Type::Integer,
                format!("invalid status: {status_int}").into(),
            )
        })?,
        deleted_locally: deleted_locally != 0,
        deleted_for_everyone: deleted_for_everyone != 0,
        edited_at: parse_opt_ts(14, edited_str)?,
        expires_at: parse_opt_ts(15, expires_str)?,
        synced: synced != 0,
        deleted_on_backend: deleted_on_backend != 0,
        created_at: parse_ts(18, &created_str)?,
        updated_at: parse_ts(19, &updated_str)?,
    })
}
