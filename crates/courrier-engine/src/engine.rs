//! The engine facade consumed by the host UI.
//!
//! Reads and writes go through the local store first; the backend only ever
//! sees work through the sync queue (outbound) and the reconciler
//! (inbound).  Store writes and queue enqueues are synchronous; delivery is
//! the background drain's problem.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use courrier_shared::crypto::{self, SymmetricKey};
use courrier_shared::protocol::{MessageSend, RemoteEvent, SyncOperation};
use courrier_shared::types::{
    CallDirection, CallOutcome, ChatId, ChatKind, MessageId, MessageKind, MessageStatus, StoryId,
    UploadStatus, UserId,
};
use courrier_store::{
    backup::BackupPayload, backup::ImportStats, CallLog, Chat, ChatFlag, Database, MediaFile,
    MediaOwner, Message, PendingUpload, Reaction, StorageStats, Story, SyncQueueEntry,
};
use courrier_sync::{
    DrainReport, LifecycleScheduler, ReconcileOutcome, Reconciler, RemoteBackend, SharedDatabase,
    SyncQueue,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::host::HostPlatform;
use crate::keyring;
use crate::workers::{self, DrainCommand};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A message resolved for display: content decrypted at the read boundary,
/// reactions attached, references left as ids.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MessageView {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    /// Decrypted text, when the kind carries any and decryption succeeded.
    pub text: Option<String>,
    /// Decryption failed: the message must render as unreadable, never as
    /// empty.
    pub unreadable: bool,
    pub status: MessageStatus,
    pub edited: bool,
    pub deleted_for_everyone: bool,
    pub reply_to: Option<MessageId>,
    pub file_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reactions: Vec<Reaction>,
}

/// One row of the chat list: the chat plus its resolved last message.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChatListEntry {
    pub chat: Chat,
    pub last_message: Option<MessageView>,
}

/// A story resolved for display.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StoryView {
    pub id: StoryId,
    pub author_id: UserId,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub unreadable: bool,
    pub media_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The running engine.  Constructed at app start, torn down at app stop.
pub struct Engine<B: RemoteBackend> {
    store: SharedDatabase,
    key: SymmetricKey,
    self_id: UserId,
    config: EngineConfig,
    queue: Arc<SyncQueue<B>>,
    reconciler: Reconciler,
    /// Inline sweeps for quota recovery; the periodic instance lives in its
    /// worker task.
    cleanup: LifecycleScheduler,
    events_tx: mpsc::Sender<EngineEvent>,
    drain_tx: mpsc::Sender<DrainCommand>,
    drain_handle: JoinHandle<()>,
    scheduler_tx: mpsc::Sender<()>,
    scheduler_handle: JoinHandle<()>,
}

impl<B> Engine<B>
where
    B: RemoteBackend + Send + Sync + 'static,
{
    /// Open the store, load or create the encryption key, request durable
    /// storage from the host and spawn the background workers.
    ///
    /// Returns the engine plus the notification channel for the UI.
    pub async fn start(
        self_id: UserId,
        config: EngineConfig,
        backend: B,
        host: &dyn HostPlatform,
    ) -> anyhow::Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let db = match &config.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        let store: SharedDatabase = Arc::new(Mutex::new(db));

        let key = keyring::get_or_create_key(&store)?;

        let durable = host.request_durable_storage();
        {
            let db = store.lock().map_err(|_| EngineError::LockPoisoned)?;
            db.set_durable_storage(durable)?;
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let staleness_ms = config.queue_staleness.as_millis() as i64;
        let queue = Arc::new(SyncQueue::new(
            store.clone(),
            backend,
            config.retry.clone(),
        ));
        let reconciler = Reconciler::new(store.clone(), key, self_id);
        let cleanup = LifecycleScheduler::new(store.clone(), staleness_ms);

        let (drain_tx, drain_handle) = workers::spawn_drain_worker(
            queue.clone(),
            config.drain_batch_size,
            config.drain_interval,
            events_tx.clone(),
        );
        let (scheduler_tx, scheduler_handle) = workers::spawn_scheduler(
            LifecycleScheduler::new(store.clone(), staleness_ms),
            config.cleanup_interval,
        );

        if !durable {
            tracing::warn!("durable storage denied, running in degraded mode");
            workers::emit(&events_tx, EngineEvent::DegradedStorage);
        }

        tracing::info!(user = %self_id, "engine started");

        Ok((
            Self {
                store,
                key,
                self_id,
                config,
                queue,
                reconciler,
                cleanup,
                events_tx,
                drain_tx,
                drain_handle,
                scheduler_tx,
                scheduler_handle,
            },
            events_rx,
        ))
    }

    /// Stop the background workers and drop the store handle.
    pub async fn shutdown(self) {
        let _ = self.drain_tx.send(DrainCommand::Shutdown).await;
        let _ = self.scheduler_tx.send(()).await;
        let _ = self.drain_handle.await;
        let _ = self.scheduler_handle.await;
        tracing::info!("engine stopped");
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, EngineError> {
        self.store.lock().map_err(|_| EngineError::LockPoisoned)
    }

    /// Run a store write; on a quota error, sweep once and retry before
    /// failing the caller permanently.
    fn with_quota_retry<T>(
        &self,
        f: impl Fn(&Database) -> Result<T, courrier_store::StoreError>,
    ) -> Result<T, EngineError> {
        {
            let db = self.db()?;
            match f(&db) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_quota() => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!("storage quota exceeded, sweeping before retry");
        self.cleanup.sweep(Utc::now());

        let db = self.db()?;
        f(&db).map_err(Into::into)
    }

    fn nudge_drain(&self) {
        let _ = self.drain_tx.try_send(DrainCommand::DrainNow);
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Send a text message: optimistic local write plus a durable queue
    /// entry, both before this returns.  Delivery happens in phase two.
    pub fn send_text_message(
        &self,
        chat_id: ChatId,
        receiver_id: Option<UserId>,
        text: &str,
    ) -> Result<MessageId, EngineError> {
        let (ciphertext, nonce) = crypto::encrypt(&self.key, text.as_bytes())?;
        self.send_prepared(
            chat_id,
            receiver_id,
            MessageKind::Text,
            ciphertext,
            Some(nonce.to_vec()),
            None,
        )
    }

    /// Send a media message.  The binary travels through the pending-upload
    /// tracker; the message itself carries only the file reference.
    pub fn send_media_message(
        &self,
        chat_id: ChatId,
        receiver_id: Option<UserId>,
        kind: MessageKind,
        mime_type: &str,
        local_path: &str,
        data: &[u8],
    ) -> Result<MessageId, EngineError> {
        let now = Utc::now();
        let message_id = MessageId::new();

        let media = MediaFile {
            id: Uuid::new_v4(),
            owner_kind: MediaOwner::Message,
            owner_id: message_id.0,
            kind,
            mime_type: mime_type.to_string(),
            size_bytes: data.len() as i64,
            checksum: Some(courrier_store::media::checksum_bytes(data)),
            thumbnail: None,
            local_path: Some(local_path.to_string()),
            remote_url: None,
            downloaded: true,
            progress: 1.0,
            created_at: now,
        };

        self.with_quota_retry(|db| {
            db.insert_media(&media)?;
            db.insert_upload(&PendingUpload {
                id: Uuid::new_v4(),
                owner_kind: MediaOwner::Message,
                owner_id: message_id.0,
                media_id: media.id,
                status: UploadStatus::Pending,
                retry_count: 0,
                created_at: now,
            })?;
            Ok(())
        })?;

        self.send_prepared_with_id(
            message_id,
            chat_id,
            receiver_id,
            kind,
            Vec::new(),
            None,
            Some(media.id),
        )
    }

    fn send_prepared(
        &self,
        chat_id: ChatId,
        receiver_id: Option<UserId>,
        kind: MessageKind,
        content: Vec<u8>,
        nonce: Option<Vec<u8>>,
        file_id: Option<Uuid>,
    ) -> Result<MessageId, EngineError> {
        self.send_prepared_with_id(
            MessageId::new(),
            chat_id,
            receiver_id,
            kind,
            content,
            nonce,
            file_id,
        )
    }

    fn send_prepared_with_id(
        &self,
        message_id: MessageId,
        chat_id: ChatId,
        receiver_id: Option<UserId>,
        kind: MessageKind,
        content: Vec<u8>,
        nonce: Option<Vec<u8>>,
        file_id: Option<Uuid>,
    ) -> Result<MessageId, EngineError> {
        let now = Utc::now();

        let chat_kind = match receiver_id {
            Some(receiver) if ChatId::direct(receiver) == chat_id => ChatKind::Direct,
            _ => ChatKind::Group,
        };

        // Phase one, step 1: the optimistic local write.
        let message = self.with_quota_retry(|db| {
            db.upsert_chat(&Chat::new(chat_id, chat_kind, now))?;

            let expires_at = db
                .get_chat(chat_id)?
                .disappearing_ttl_secs
                .map(|ttl| now + ChronoDuration::seconds(ttl));

            let message = Message {
                id: message_id,
                chat_id,
                sender_id: self.self_id,
                receiver_id,
                kind,
                content: content.clone(),
                nonce: nonce.clone(),
                file_id,
                thumbnail: None,
                reply_to: None,
                forwarded_from: None,
                status: MessageStatus::Pending,
                deleted_locally: false,
                deleted_for_everyone: false,
                edited_at: None,
                expires_at,
                synced: false,
                deleted_on_backend: false,
                created_at: now,
                updated_at: now,
            };

            db.upsert_message(&message)?;
            db.record_outgoing_message(chat_id, message_id, now)?;
            Ok(message)
        })?;

        // Phase one, step 2: the durable queue entry (the only handoff
        // artifact to phase two).
        self.queue.enqueue(&SyncOperation::SendMessage(MessageSend {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            kind: message.kind,
            content: message.content,
            nonce: message.nonce,
            file_id: message.file_id,
            reply_to: message.reply_to,
            forwarded_from: message.forwarded_from,
            expires_at: message.expires_at,
            created_at: message.created_at,
        }))?;

        self.nudge_drain();
        Ok(message_id)
    }

    /// Edit a sent message.  Projected to the backend as a re-send of the
    /// same id; id-stable upserts make that an update there too.
    pub fn edit_message(&self, id: MessageId, new_text: &str) -> Result<(), EngineError> {
        let now = Utc::now();
        let (ciphertext, nonce) = crypto::encrypt(&self.key, new_text.as_bytes())?;

        let message = {
            let db = self.db()?;
            if !db.set_message_edited(id, &ciphertext, Some(&nonce), now)? {
                return Err(courrier_store::StoreError::NotFound.into());
            }
            db.get_message(id)?
        };

        self.queue.enqueue(&SyncOperation::SendMessage(MessageSend {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            kind: message.kind,
            content: message.content,
            nonce: message.nonce,
            file_id: message.file_id,
            reply_to: message.reply_to,
            forwarded_from: message.forwarded_from,
            expires_at: message.expires_at,
            created_at: message.created_at,
        }))?;

        self.nudge_drain();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reactions, deletion, receipts
    // ------------------------------------------------------------------

    pub fn react(&self, message_id: MessageId, emoji: &str) -> Result<(), EngineError> {
        let now = Utc::now();
        let chat_id = {
            let db = self.db()?;
            let chat_id = db.get_message(message_id)?.chat_id;
            db.add_reaction(message_id, chat_id, self.self_id, emoji, now)?;
            chat_id
        };

        self.queue.enqueue(&SyncOperation::Reaction {
            message_id,
            chat_id,
            user_id: self.self_id,
            emoji: emoji.to_string(),
            remove: false,
        })?;
        self.nudge_drain();
        Ok(())
    }

    pub fn remove_reaction(&self, message_id: MessageId, emoji: &str) -> Result<(), EngineError> {
        let chat_id = {
            let db = self.db()?;
            let chat_id = db.get_message(message_id)?.chat_id;
            db.remove_reaction(message_id, self.self_id, emoji)?;
            chat_id
        };

        self.queue.enqueue(&SyncOperation::Reaction {
            message_id,
            chat_id,
            user_id: self.self_id,
            emoji: emoji.to_string(),
            remove: true,
        })?;
        self.nudge_drain();
        Ok(())
    }

    /// Delete a message.  Local-only deletion is a soft flag; deleting for
    /// everyone scrubs content immediately and projects to the backend.
    pub fn delete_message(&self, id: MessageId, for_everyone: bool) -> Result<(), EngineError> {
        let now = Utc::now();
        let chat_id = {
            let db = self.db()?;
            let chat_id = db.get_message(id)?.chat_id;
            if for_everyone {
                db.clear_message_for_everyone(id, now)?;
            } else {
                db.mark_message_deleted_locally(id, now)?;
            }
            chat_id
        };

        if for_everyone {
            self.queue.enqueue(&SyncOperation::Delete {
                message_id: id,
                chat_id,
                for_everyone,
            })?;
            self.nudge_drain();
        }
        Ok(())
    }

    /// Reset the unread counter and tell the backend how far we have read.
    pub fn mark_chat_read(&self, chat_id: ChatId) -> Result<(), EngineError> {
        let last_message = {
            let db = self.db()?;
            db.mark_chat_read(chat_id)?;
            db.get_chat(chat_id)?.last_message_id
        };

        if let Some(up_to) = last_message {
            self.queue.enqueue(&SyncOperation::ReadReceipt {
                chat_id,
                user_id: self.self_id,
                up_to,
            })?;
            self.nudge_drain();
        }
        Ok(())
    }

    /// Ephemeral typing indicator.  One delivery attempt, never retried.
    pub fn set_typing(&self, chat_id: ChatId, active: bool) -> Result<(), EngineError> {
        self.queue.enqueue_with_budget(
            &SyncOperation::Typing {
                chat_id,
                user_id: self.self_id,
                active,
            },
            1,
        )?;
        self.nudge_drain();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// Ensure a 1:1 chat with `user` exists and return its id.
    pub fn start_chat(&self, user: UserId) -> Result<ChatId, EngineError> {
        let chat_id = ChatId::direct(user);
        self.with_quota_retry(|db| {
            db.upsert_chat(&Chat::new(chat_id, ChatKind::Direct, Utc::now()))
        })?;
        Ok(chat_id)
    }

    pub fn set_chat_flag(&self, id: ChatId, flag: ChatFlag, value: bool) -> Result<(), EngineError> {
        self.db()?.set_chat_flag(id, flag, value)?;
        Ok(())
    }

    pub fn set_disappearing_ttl(&self, id: ChatId, ttl_secs: Option<i64>) -> Result<(), EngineError> {
        self.db()?.set_disappearing_ttl(id, ttl_secs)?;
        Ok(())
    }

    pub fn set_chat_wallpaper(&self, id: ChatId, wallpaper: Option<&str>) -> Result<(), EngineError> {
        self.db()?.set_chat_wallpaper(id, wallpaper)?;
        Ok(())
    }

    /// Delete a chat and everything it owns.
    pub fn delete_chat(&self, id: ChatId) -> Result<bool, EngineError> {
        Ok(self.db()?.delete_chat(id)?)
    }

    /// The chat list: pinned first, then by recency, last messages resolved.
    pub fn list_chats(&self, include_hidden: bool) -> Result<Vec<ChatListEntry>, EngineError> {
        let db = self.db()?;
        let chats = db.chats_ordered_by_recency(include_hidden)?;

        let mut entries = Vec::with_capacity(chats.len());
        for chat in chats {
            let last_message = match chat.last_message_id {
                Some(id) => match db.get_message(id) {
                    Ok(msg) => {
                        let reactions = db.reactions_for_message(id)?;
                        Some(self.view_of(msg, reactions))
                    }
                    Err(courrier_store::StoreError::NotFound) => None,
                    Err(e) => return Err(e.into()),
                },
                None => None,
            };
            entries.push(ChatListEntry { chat, last_message });
        }
        Ok(entries)
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Message history, oldest first, decrypted at this boundary.
    pub fn messages(
        &self,
        chat_id: ChatId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageView>, EngineError> {
        let db = self.db()?;
        let messages = db.messages_by_chat(chat_id, limit, offset)?;

        let mut views = Vec::with_capacity(messages.len());
        for msg in messages {
            let reactions = db.reactions_for_message(msg.id)?;
            views.push(self.view_of(msg, reactions));
        }
        Ok(views)
    }

    /// Case-insensitive content search across one chat or all of them,
    /// decrypt-and-match, newest first, capped at 100 results.
    pub fn search_messages(
        &self,
        query: &str,
        chat_id: Option<ChatId>,
    ) -> Result<Vec<MessageView>, EngineError> {
        let query_lower = query.to_lowercase();
        let db = self.db()?;

        let target_chats: Vec<ChatId> = match chat_id {
            Some(id) => vec![id],
            None => db
                .chats_ordered_by_recency(true)?
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };

        let mut results = Vec::new();
        for chat in target_chats {
            for msg in db.messages_by_chat(chat, 10_000, 0)? {
                let reactions = db.reactions_for_message(msg.id)?;
                let view = self.view_of(msg, reactions);
                let matches = view
                    .text
                    .as_deref()
                    .map(|t| t.to_lowercase().contains(&query_lower))
                    .unwrap_or(false);
                if matches {
                    results.push(view);
                }
            }
        }

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(100);
        Ok(results)
    }

    fn view_of(&self, msg: Message, reactions: Vec<Reaction>) -> MessageView {
        let (text, unreadable) = if msg.deleted_for_everyone {
            (None, false)
        } else if msg.kind.is_encrypted() {
            decrypt_to_text(&self.key, &msg.content, msg.nonce.as_deref())
        } else {
            (String::from_utf8(msg.content.clone()).ok(), false)
        };

        MessageView {
            id: msg.id,
            chat_id: msg.chat_id,
            sender_id: msg.sender_id,
            kind: msg.kind,
            text,
            unreadable,
            status: msg.status,
            edited: msg.edited_at.is_some(),
            deleted_for_everyone: msg.deleted_for_everyone,
            reply_to: msg.reply_to,
            file_id: msg.file_id,
            expires_at: msg.expires_at,
            created_at: msg.created_at,
            reactions,
        }
    }

    // ------------------------------------------------------------------
    // Stories
    // ------------------------------------------------------------------

    /// Publish a text story, expiring after the configured story TTL.
    pub fn publish_story(&self, text: &str) -> Result<StoryId, EngineError> {
        let now = Utc::now();
        let (ciphertext, nonce) = crypto::encrypt(&self.key, text.as_bytes())?;
        let ttl = ChronoDuration::from_std(self.config.story_ttl)
            .unwrap_or_else(|_| ChronoDuration::seconds(0));

        let story = Story {
            id: StoryId::new(),
            author_id: self.self_id,
            kind: MessageKind::Text,
            content: ciphertext,
            nonce: Some(nonce.to_vec()),
            media_id: None,
            created_at: now,
            expires_at: now + ttl,
        };

        self.with_quota_retry(|db| db.upsert_story(&story))?;
        Ok(story.id)
    }

    /// Stories still alive right now, newest first.
    pub fn active_stories(&self) -> Result<Vec<StoryView>, EngineError> {
        let db = self.db()?;
        let stories = db.active_stories(Utc::now())?;

        Ok(stories
            .into_iter()
            .map(|story| {
                let (text, unreadable) =
                    decrypt_to_text(&self.key, &story.content, story.nonce.as_deref());
                StoryView {
                    id: story.id,
                    author_id: story.author_id,
                    kind: story.kind,
                    text,
                    unreadable,
                    media_id: story.media_id,
                    created_at: story.created_at,
                    expires_at: story.expires_at,
                }
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn record_call(&self, call: &CallLog) -> Result<(), EngineError> {
        self.db()?.insert_call_log(call)?;
        Ok(())
    }

    pub fn end_call(
        &self,
        id: Uuid,
        outcome: CallOutcome,
        ended_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.db()?.end_call(id, outcome, ended_at)?;
        Ok(())
    }

    pub fn calls_for_chat(&self, chat_id: ChatId, limit: u32) -> Result<Vec<CallLog>, EngineError> {
        Ok(self.db()?.calls_for_chat(chat_id, limit)?)
    }

    /// Convenience for logging a finished call from the (external) call UI.
    pub fn log_call(
        &self,
        chat_id: ChatId,
        peer_id: UserId,
        direction: CallDirection,
        video: bool,
        outcome: CallOutcome,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Uuid, EngineError> {
        let call = CallLog {
            id: Uuid::new_v4(),
            chat_id,
            peer_id,
            direction,
            video,
            outcome,
            started_at,
            ended_at,
        };
        self.record_call(&call)?;
        Ok(call.id)
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    /// Feed one backend-pushed realtime event into the store.
    pub fn apply_remote_event(
        &self,
        event: RemoteEvent,
    ) -> Result<ReconcileOutcome, EngineError> {
        let outcome = self.reconciler.apply_remote_event(event)?;

        match &outcome {
            ReconcileOutcome::MessageInserted {
                chat_id,
                message_id,
            } => workers::emit(
                &self.events_tx,
                EngineEvent::MessageArrived {
                    chat_id: *chat_id,
                    message_id: *message_id,
                },
            ),
            ReconcileOutcome::StatusMerged { message_id, status } => workers::emit(
                &self.events_tx,
                EngineEvent::MessageStatusChanged {
                    message_id: *message_id,
                    status: *status,
                },
            ),
            ReconcileOutcome::ContactUpdated { user_id } => workers::emit(
                &self.events_tx,
                EngineEvent::ContactUpdated { user_id: *user_id },
            ),
            ReconcileOutcome::MessageEchoed { .. } | ReconcileOutcome::Ignored => {}
        }

        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Sync surface
    // ------------------------------------------------------------------

    /// Drain the queue immediately (e.g. a connectivity-restored hook).
    pub async fn drain_now(&self) -> Result<DrainReport, EngineError> {
        Ok(self.queue.drain(self.config.drain_batch_size).await?)
    }

    /// Queue entries whose retry budget is spent, for the UI's failed
    /// state.
    pub fn permanent_failures(&self) -> Result<Vec<SyncQueueEntry>, EngineError> {
        Ok(self.queue.permanent_failures()?)
    }

    // ------------------------------------------------------------------
    // Keys, backup, maintenance
    // ------------------------------------------------------------------

    /// Export the active encryption key as an opaque backup blob.
    pub fn export_encryption_key(&self) -> Result<String, EngineError> {
        keyring::export_key_blob(&self.key)
    }

    /// Import a key backup blob.  Validation happens before anything is
    /// touched; on failure the active key is unchanged.
    pub fn import_encryption_key(&mut self, blob: &str) -> Result<(), EngineError> {
        let key = keyring::import_key_blob(&self.store, blob)?;
        self.key = key;
        self.reconciler = Reconciler::new(self.store.clone(), key, self.self_id);
        Ok(())
    }

    /// Export the full local database for backup.
    pub fn export_backup(&self) -> Result<BackupPayload, EngineError> {
        Ok(self.db()?.export_backup()?)
    }

    /// Merge a backup payload into the local database.
    pub fn import_backup(&self, payload: &BackupPayload) -> Result<ImportStats, EngineError> {
        Ok(self.db()?.import_backup(payload)?)
    }

    /// [`Self::export_backup`] as pretty JSON, ready to write to a file.
    pub fn export_backup_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(&self.export_backup()?)?)
    }

    /// Merge a JSON backup produced by [`Self::export_backup_json`].
    pub fn import_backup_json(&self, json: &str) -> Result<ImportStats, EngineError> {
        let payload: BackupPayload = serde_json::from_str(json)?;
        self.import_backup(&payload)
    }

    pub fn storage_stats(&self) -> Result<StorageStats, EngineError> {
        Ok(self.db()?.storage_stats()?)
    }
}

/// Decrypt a stored content column for display.
///
/// A decryption failure renders as unreadable, never as empty or as raw
/// ciphertext.
fn decrypt_to_text(
    key: &SymmetricKey,
    content: &[u8],
    nonce: Option<&[u8]>,
) -> (Option<String>, bool) {
    let nonce: crypto::Nonce = match nonce.map(TryInto::try_into) {
        Some(Ok(nonce)) => nonce,
        _ => return (None, true),
    };

    match crypto::decrypt(key, content, &nonce) {
        Ok(plain) => match String::from_utf8(plain) {
            Ok(text) => (Some(text), false),
            Err(_) => (None, true),
        },
        Err(_) => (None, true),
    }
}
