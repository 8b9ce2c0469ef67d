//! CRUD operations for [`Chat`] records.
//!
//! Unread counters and last-message pointers are always bumped inside one
//! UPDATE statement; callers never read-modify-write a chat row.

use chrono::{DateTime, Utc};
use rusqlite::params;

use courrier_shared::types::{ChatId, ChatKind, MessageId};

use crate::convert::{parse_opt_ts, parse_opt_uuid, parse_tag, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Chat;

/// The independent boolean flags a chat carries.  Any combination is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFlag {
    Locked,
    Hidden,
    Pinned,
    Muted,
    Archived,
    Blocked,
}

impl ChatFlag {
    /// Column name; the set is closed so this never meets user input.
    fn column(self) -> &'static str {
        match self {
            Self::Locked => "is_locked",
            Self::Hidden => "is_hidden",
            Self::Pinned => "is_pinned",
            Self::Muted => "is_muted",
            Self::Archived => "is_archived",
            Self::Blocked => "is_blocked",
        }
    }
}

impl Database {
    /// Insert a chat unless one with the same id exists.  Returns `true`
    /// when a row was inserted.
    pub fn upsert_chat(&self, chat: &Chat) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT INTO chats (
                 id, kind, title, avatar_url, last_message_id, unread_count,
                 is_locked, is_hidden, is_pinned, is_muted, is_archived, is_blocked,
                 disappearing_ttl_secs, wallpaper, last_activity, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(id) DO NOTHING",
            params![
                chat.id.to_string(),
                chat.kind.as_str(),
                chat.title,
                chat.avatar_url,
                chat.last_message_id.map(|m| m.to_string()),
                chat.unread_count,
                chat.is_locked as i32,
                chat.is_hidden as i32,
                chat.is_pinned as i32,
                chat.is_muted as i32,
                chat.is_archived as i32,
                chat.is_blocked as i32,
                chat.disappearing_ttl_secs,
                chat.wallpaper,
                chat.last_activity.to_rfc3339(),
                chat.created_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// List chats for the chat list view: pinned first, then most recent
    /// activity.  Hidden chats are excluded unless `include_hidden`.
    pub fn chats_ordered_by_recency(&self, include_hidden: bool) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS}
             FROM chats
             WHERE (?1 OR is_hidden = 0)
             ORDER BY is_pinned DESC, last_activity DESC"
        ))?;

        let rows = stmt.query_map(params![include_hidden], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Toggle one of the independent chat flags.
    pub fn set_chat_flag(&self, id: ChatId, flag: ChatFlag, value: bool) -> Result<bool> {
        let affected = self.conn().execute(
            &format!("UPDATE chats SET {} = ?2 WHERE id = ?1", flag.column()),
            params![id.to_string(), value as i32],
        )?;
        Ok(affected > 0)
    }

    /// Fold an incoming message into the chat row: bump the unread counter,
    /// move the last-message pointer and refresh activity, atomically.
    pub fn record_incoming_message(
        &self,
        id: ChatId,
        message_id: MessageId,
        activity: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET
                 unread_count = unread_count + 1,
                 last_message_id = ?2,
                 last_activity = ?3
             WHERE id = ?1",
            params![id.to_string(), message_id.to_string(), activity.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Same as [`Self::record_incoming_message`] but for our own sends:
    /// pointer and activity move, the unread counter does not.
    pub fn record_outgoing_message(
        &self,
        id: ChatId,
        message_id: MessageId,
        activity: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET last_message_id = ?2, last_activity = ?3 WHERE id = ?1",
            params![id.to_string(), message_id.to_string(), activity.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Explicit mark-read: the only path that resets the unread counter.
    pub fn mark_chat_read(&self, id: ChatId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET unread_count = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn set_disappearing_ttl(&self, id: ChatId, ttl_secs: Option<i64>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET disappearing_ttl_secs = ?2 WHERE id = ?1",
            params![id.to_string(), ttl_secs],
        )?;
        Ok(affected > 0)
    }

    pub fn set_chat_wallpaper(&self, id: ChatId, wallpaper: Option<&str>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET wallpaper = ?2 WHERE id = ?1",
            params![id.to_string(), wallpaper],
        )?;
        Ok(affected > 0)
    }

    pub fn set_chat_title(&self, id: ChatId, title: Option<&str>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET title = ?2 WHERE id = ?1",
            params![id.to_string(), title],
        )?;
        Ok(affected > 0)
    }

    /// Delete a chat.  Messages, reactions and call logs cascade via
    /// foreign keys.  Returns `true` if a row was deleted.
    pub fn delete_chat(&self, id: ChatId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM chats WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

const CHAT_COLUMNS: &str = "id, kind, title, avatar_url, last_message_id, unread_count, \
     is_locked, is_hidden, is_pinned, is_muted, is_archived, is_blocked, \
     disappearing_ttl_secs, wallpaper, last_activity, created_at";

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let title: Option<String> = row.get(2)?;
    let avatar_url: Option<String> = row.get(3)?;
    let last_message_str: Option<String> = row.get(4)?;
    let unread_count: i64 = row.get(5)?;
    let is_locked: i32 = row.get(6)?;
    let is_hidden: i32 = row.get(7)?;
    let is_pinned: i32 = row.get(8)?;
    let is_muted: i32 = row.get(9)?;
    let is_archived: i32 = row.get(10)?;
    let is_blocked: i32 = row.get(11)?;
    let disappearing_ttl_secs: Option<i64> = row.get(12)?;
    let wallpaper: Option<String> = row.get(13)?;
    let activity_str: String = row.get(14)?;
    let created_str: String = row.get(15)?;

    Ok(Chat {
        id: ChatId(parse_uuid(0, &id_str)?),
        kind: parse_tag(1, &kind_str, ChatKind::from_str)?,
        title,
        avatar_url,
        last_message_id: parse_opt_uuid(4, last_message_str)?.map(MessageId),
        unread_count,
        is_locked: is_locked != 0,
        is_hidden: is_hidden != 0,
        is_pinned: is_pinned != 0,
        is_muted: is_muted != 0,
        is_archived: is_archived != 0,
        is_blocked: is_blocked != 0,
        disappearing_ttl_secs,
        wallpaper,
        last_activity: parse_ts(14, &activity_str)?,
        created_at: parse_ts(15, &created_str)?,
    })
}
