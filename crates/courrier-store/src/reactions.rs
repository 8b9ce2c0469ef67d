use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use courrier_shared::types::{ChatId, MessageId, UserId};

use crate::convert::{parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::Result;
use crate::models::Reaction;

impl Database {
    /// Add a reaction.  Duplicate (message, user, emoji) triples are
    /// ignored, so replayed events cannot double-react.
    pub fn add_reaction(
        &self,
        message_id: MessageId,
        chat_id: ChatId,
        user_id: UserId,
        emoji: &str,
        now: DateTime<Utc>,
    ) -> Result<Reaction> {
        let id = Uuid::new_v4();

        self.conn().execute(
            "INSERT OR IGNORE INTO reactions (id, message_id, chat_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                message_id.to_string(),
                chat_id.to_string(),
                user_id.to_string(),
                emoji,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Reaction {
            id,
            message_id,
            chat_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: now,
        })
    }

    pub fn remove_reaction(
        &self,
        message_id: MessageId,
        user_id: UserId,
        emoji: &str,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id.to_string(), user_id.to_string(), emoji],
        )?;
        Ok(affected > 0)
    }

    pub fn reactions_for_message(&self, message_id: MessageId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, message_id, chat_id, user_id, emoji, created_at
             FROM reactions WHERE message_id = ?1 ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![message_id.to_string()], row_to_reaction)?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }
}

fn row_to_reaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reaction> {
    let id_str: String = row.get(0)?;
    let message_id_str: String = row.get(1)?;
    let chat_id_str: String = row.get(2)?;
    let user_id_str: String = row.get(3)?;
    let emoji: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(Reaction {
        id: parse_uuid(0, &id_str)?,
        message_id: MessageId(parse_uuid(1, &message_id_str)?),
        chat_id: ChatId(parse_uuid(2, &chat_id_str)?),
        user_id: UserId(parse_uuid(3, &user_id_str)?),
        emoji,
        created_at: parse_ts(5, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chat, Message};
    use courrier_shared::types::{ChatKind, MessageKind, MessageStatus};

    fn seed_message(db: &Database) -> (ChatId, MessageId) {
        let now = Utc::now();
        let chat = Chat::new(ChatId::new(), ChatKind::Direct, now);
        db.upsert_chat(&chat).unwrap();

        let msg = Message {
            id: MessageId::new(),
            chat_id: chat.id,
            sender_id: UserId::new(),
            receiver_id: None,
            kind: MessageKind::Text,
            content: vec![1],
            nonce: None,
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
        db.upsert_message(&msg).unwrap();
        (chat.id, msg.id)
    }

    #[test]
    fn duplicate_reaction_ignored() {
        let db = Database::open_in_memory().unwrap();
        let (chat_id, message_id) = seed_message(&db);
        let user = UserId::new();

        db.add_reaction(message_id, chat_id, user, "👍", Utc::now())
            .unwrap();
        db.add_reaction(message_id, chat_id, user, "👍", Utc::now())
            .unwrap();

        assert_eq!(db.reactions_for_message(message_id).unwrap().len(), 1);
    }

    #[test]
    fn remove_reaction_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let (chat_id, message_id) = seed_message(&db);
        let user = UserId::new();

        db.add_reaction(message_id, chat_id, user, "❤️", Utc::now())
            .unwrap();
        assert!(db.remove_reaction(message_id, user, "❤️").unwrap());
        assert!(db.reactions_for_message(message_id).unwrap().is_empty());
    }
}
