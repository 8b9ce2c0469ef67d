use chrono::{DateTime, Utc};
use rusqlite::params;

use courrier_shared::types::{MessageKind, StoryId, UserId};

use crate::convert::{parse_opt_uuid, parse_tag, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Story;

impl Database {
    /// Insert a story unless one with the same id exists.
    pub fn upsert_story(&self, story: &Story) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT INTO stories (id, author_id, kind, content, nonce, media_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO NOTHING",
            params![
                story.id.to_string(),
                story.author_id.to_string(),
                story.kind.as_str(),
                story.content,
                story.nonce,
                story.media_id.map(|m| m.to_string()),
                story.created_at.to_rfc3339(),
                story.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_story(&self, id: StoryId) -> Result<Story> {
        self.conn()
            .query_row(
                "SELECT id, author_id, kind, content, nonce, media_id, created_at, expires_at
                 FROM stories WHERE id = ?1",
                params![id.to_string()],
                row_to_story,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// Stories still alive at `now`, newest first.
    pub fn active_stories(&self, now: DateTime<Utc>) -> Result<Vec<Story>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, author_id, kind, content, nonce, media_id, created_at, expires_at
             FROM stories
             WHERE expires_at > ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![now.to_rfc3339()], row_to_story)?;

        let mut stories = Vec::new();
        for row in rows {
            stories.push(row?);
        }
        Ok(stories)
    }

    pub fn delete_story(&self, id: StoryId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM stories WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Purge stories whose expiry has passed.
    pub fn delete_expired_stories(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM stories WHERE expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(affected)
    }
}

fn row_to_story(row: &rusqlite::Row<'_>) -> rusqlite::Result<Story> {
    let id_str: String = row.get(0)?;
    let author_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let content: Vec<u8> = row.get(3)?;
    let nonce: Option<Vec<u8>> = row.get(4)?;
    let media_id_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(6)?;
    let expires_str: String = row.get(7)?;

    Ok(Story {
        id: StoryId(parse_uuid(0, &id_str)?),
        author_id: UserId(parse_uuid(1, &author_str)?),
        kind: parse_tag(2, &kind_str, MessageKind::from_str)?,
        content,
        nonce,
        media_id: parse_opt_uuid(5, media_id_str)?,
        created_at: parse_ts(6, &created_str)?,
        expires_at: parse_ts(7, &expires_str)?,
    })
}
