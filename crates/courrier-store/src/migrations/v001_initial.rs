//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `chats`, `messages`, `contacts`, and
//! `settings`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id              TEXT PRIMARY KEY NOT NULL,  -- counterpart user UUID (1:1) or group UUID
    kind            TEXT NOT NULL,              -- 'direct' | 'group'
    title           TEXT,
    avatar_url      TEXT,
    last_message_id TEXT,                       -- id only, resolved at read time
    unread_count    INTEGER NOT NULL DEFAULT 0,
    is_locked       INTEGER NOT NULL DEFAULT 0, -- boolean 0/1, flags combine freely
    is_hidden       INTEGER NOT NULL DEFAULT 0,
    is_pinned       INTEGER NOT NULL DEFAULT 0,
    is_muted        INTEGER NOT NULL DEFAULT 0,
    is_archived     INTEGER NOT NULL DEFAULT 0,
    is_blocked      INTEGER NOT NULL DEFAULT 0,
    last_activity   TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_activity ON chats(is_pinned DESC, last_activity DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                   TEXT PRIMARY KEY NOT NULL,  -- client-generated UUID, stable across retries
    chat_id              TEXT NOT NULL,              -- FK -> chats(id)
    sender_id            TEXT NOT NULL,              -- UUID
    receiver_id          TEXT,
    kind                 TEXT NOT NULL,              -- 'text' | 'image' | ...
    content              BLOB NOT NULL,              -- ciphertext for encrypted kinds
    nonce                BLOB,                       -- XChaCha20-Poly1305 nonce (24 bytes)
    file_id              TEXT,                       -- FK -> media_files(id), soft
    thumbnail            TEXT,
    reply_to             TEXT,                       -- message id, resolved at read time
    forwarded_from       TEXT,
    status               INTEGER NOT NULL DEFAULT 0, -- 0 pending .. 3 read, 4 failed
    deleted_locally      INTEGER NOT NULL DEFAULT 0,
    deleted_for_everyone INTEGER NOT NULL DEFAULT 0,
    edited_at            TEXT,
    expires_at           TEXT,                       -- disappearing messages
    synced               INTEGER NOT NULL DEFAULT 0,
    deleted_on_backend   INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_created
    ON messages(chat_id, created_at ASC);

CREATE INDEX IF NOT EXISTS idx_messages_expires ON messages(expires_at);

-- ----------------------------------------------------------------
-- Contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID
    display_name TEXT,
    avatar_url   TEXT,
    is_friend    INTEGER NOT NULL DEFAULT 0,
    is_online    INTEGER NOT NULL DEFAULT 0,
    last_seen    TEXT,
    updated_at   TEXT NOT NULL                -- last-write-wins guard
);

-- ----------------------------------------------------------------
-- Settings (key/value)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
