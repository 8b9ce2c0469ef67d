//! v003 -- Stories, call logs, and per-chat disappearing-message settings.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Per-chat disappearing TTL and wallpaper
ALTER TABLE chats ADD COLUMN disappearing_ttl_secs INTEGER;
ALTER TABLE chats ADD COLUMN wallpaper TEXT;

-- Stories
CREATE TABLE IF NOT EXISTS stories (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    author_id  TEXT NOT NULL,               -- UUID
    kind       TEXT NOT NULL,               -- 'text' | 'image' | 'video'
    content    BLOB NOT NULL,               -- ciphertext for text stories
    nonce      BLOB,
    media_id   TEXT,                        -- FK -> media_files(id), soft
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL                -- swept by the lifecycle scheduler

);

CREATE INDEX IF NOT EXISTS idx_stories_expires ON stories(expires_at);

-- Call logs
CREATE TABLE IF NOT EXISTS call_logs (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    chat_id    TEXT NOT NULL,               -- FK -> chats(id)
    peer_id    TEXT NOT NULL,
    direction  TEXT NOT NULL,               -- 'incoming' | 'outgoing'
    video      INTEGER NOT NULL DEFAULT 0,
    outcome    TEXT NOT NULL,               -- 'answered' | 'missed' | 'declined'
    started_at TEXT NOT NULL,
    ended_at   TEXT,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_call_logs_chat ON call_logs(chat_id, started_at DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
