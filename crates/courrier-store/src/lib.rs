//! # courrier-store
//!
//! Local-first storage for the Courrier engine, backed by SQLite.
//!
//! The store is the single source of truth for the host UI.  All writes are
//! idempotent upserts keyed by id, every multi-step mutation is a single SQL
//! statement, and message content is stored as ciphertext produced by the
//! shared crypto module.  The crate exposes a synchronous `Database` handle
//! that wraps a `rusqlite::Connection` and provides typed CRUD helpers for
//! every domain model.

pub mod backup;
pub mod calls;
pub mod chats;
pub mod contacts;
pub mod database;
pub mod media;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod queue;
pub mod reactions;
pub mod settings;
pub mod stats;
pub mod stories;
pub mod uploads;

mod convert;
mod error;

pub use chats::ChatFlag;
pub use database::Database;
pub use error::StoreError;
pub use models::*;
