use chrono::{DateTime, Utc};
use rusqlite::params;

use courrier_shared::types::{CallDirection, CallOutcome, ChatId, UserId};

use crate::convert::{parse_opt_ts, parse_tag, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::Result;
use crate::models::CallLog;

impl Database {
    pub fn insert_call_log(&self, call: &CallLog) -> Result<()> {
        self.conn().execute(
            "INSERT INTO call_logs (id, chat_id, peer_id, direction, video, outcome, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO NOTHING",
            params![
                call.id.to_string(),
                call.chat_id.to_string(),
                call.peer_id.to_string(),
                call.direction.as_str(),
                call.video as i32,
                call.outcome.as_str(),
                call.started_at.to_rfc3339(),
                call.ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Close an open call record.
    pub fn end_call(
        &self,
        id: uuid::Uuid,
        outcome: CallOutcome,
        ended_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE call_logs SET outcome = ?2, ended_at = ?3 WHERE id = ?1",
            params![id.to_string(), outcome.as_str(), ended_at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Call history for one chat, newest first.
    pub fn calls_for_chat(&self, chat_id: ChatId, limit: u32) -> Result<Vec<CallLog>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, peer_id, direction, video, outcome, started_at, ended_at
             FROM call_logs
             WHERE chat_id = ?1
             ORDER BY started_at DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![chat_id.to_string(), limit], row_to_call)?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }
        Ok(calls)
    }
}

fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallLog> {
    let id_str: String = row.get(0)?;
    let chat_id_str: String = row.get(1)?;
    let peer_str: String = row.get(2)?;
    let direction_str: String = row.get(3)?;
    let video: i32 = row.get(4)?;
    let outcome_str: String = row.get(5)?;
    let started_str: String = row.get(6)?;
    let ended_str: Option<String> = row.get(7)?;

    Ok(CallLog {
        id: parse_uuid(0, &id_str)?,
        chat_id: ChatId(parse_uuid(1, &chat_id_str)?),
        peer_id: UserId(parse_uuid(2, &peer_str)?),
        direction: parse_tag(3, &direction_str, CallDirection::from_str)?,
        video: video != 0,
        outcome: parse_tag(5, &outcome_str, CallOutcome::from_str)?,
        started_at: parse_ts(6, &started_str)?,
        ended_at: parse_opt_ts(7, ended_str)?,
    })
}
