//! v002 -- Outbound sync machinery.
//!
//! Adds the durable sync queue, media file metadata, the pending-upload
//! tracker, and per-user reactions.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Sync queue
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sync_queue (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    op_kind         TEXT NOT NULL,              -- 'message' | 'status' | 'reaction' | ...
    payload         BLOB NOT NULL,              -- bincode-serialized SyncOperation
    priority        INTEGER NOT NULL DEFAULT 0, -- higher drains first
    retry_count     INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL,
    next_attempt_ms INTEGER NOT NULL DEFAULT 0, -- unix millis, backoff clock
    last_error      TEXT,
    created_at_ms   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_drain
    ON sync_queue(priority DESC, created_at_ms ASC);

-- ----------------------------------------------------------------
-- Media file metadata
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS media_files (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    owner_kind TEXT NOT NULL,                -- 'message' | 'story'
    owner_id   TEXT NOT NULL,
    kind       TEXT NOT NULL,                -- 'image' | 'video' | ...
    mime_type  TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    checksum   TEXT,                         -- BLAKE3 hash of the file contents
    thumbnail  TEXT,
    local_path TEXT,
    remote_url TEXT,
    downloaded INTEGER NOT NULL DEFAULT 0,
    progress   REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_media_owner ON media_files(owner_kind, owner_id);

-- ----------------------------------------------------------------
-- Pending uploads (large binaries tracked apart from the sync queue)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pending_uploads (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    owner_kind  TEXT NOT NULL,               -- 'message' | 'story'
    owner_id    TEXT NOT NULL,
    media_id    TEXT NOT NULL,               -- FK -> media_files(id)
    status      TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (media_id) REFERENCES media_files(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Reactions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    message_id TEXT NOT NULL,               -- FK -> messages(id)
    chat_id    TEXT NOT NULL,               -- FK -> chats(id)
    user_id    TEXT NOT NULL,
    emoji      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reactions_message ON reactions(message_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_unique ON reactions(message_id, user_id, emoji);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
