//! Folding backend-pushed events into the local store.
//!
//! Reconciliation never blocks on network: it operates purely on
//! already-received event payloads against the already-open store.  The
//! concurrency mechanism against a simultaneously running drain is not a
//! lock but the store's id-keyed upserts and the monotonic status merge —
//! whichever writer commits second merges instead of overwriting.

use std::sync::MutexGuard;

use chrono::{Duration, Utc};

use courrier_shared::crypto::{self, SymmetricKey};
use courrier_shared::protocol::{RemoteContact, RemoteEvent, RemoteMessage};
use courrier_shared::types::{ChatId, ChatKind, MessageId, MessageStatus, UserId};
use courrier_store::{Chat, Contact, Database, Message};

use crate::error::SyncError;
use crate::SharedDatabase;

/// What a reconciled event did to the store, for host notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A genuinely new message was stored; chat pointer and unread counter
    /// moved.
    MessageInserted {
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// The message already existed (e.g. an echo of our own send); status
    /// was merged and the row marked backend-acknowledged.
    MessageEchoed { message_id: MessageId },
    /// A status event was merged.
    StatusMerged {
        message_id: MessageId,
        status: MessageStatus,
    },
    /// Presence or friend data was upserted.
    ContactUpdated { user_id: UserId },
    /// The event referred to state this device does not hold.
    Ignored,
}

/// Applies inbound realtime events.  One per engine, constructed with the
/// store handle and the at-rest key (inbound plaintext is encrypted before
/// it touches the store).
pub struct Reconciler {
    store: SharedDatabase,
    key: SymmetricKey,
    /// This device's own user id, to tell echoes and peer messages apart.
    self_id: UserId,
}

impl Reconciler {
    pub fn new(store: SharedDatabase, key: SymmetricKey, self_id: UserId) -> Self {
        Self {
            store,
            key,
            self_id,
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, Database>, SyncError> {
        self.store.lock().map_err(|_| SyncError::LockPoisoned)
    }

    /// Single entry point for backend-pushed events.
    pub fn apply_remote_event(&self, event: RemoteEvent) -> Result<ReconcileOutcome, SyncError> {
        match event {
            RemoteEvent::Message(msg) => self.apply_message(msg),
            RemoteEvent::Status {
                message_id, status, ..
            } => self.apply_status(message_id, status),
            RemoteEvent::Presence {
                user_id,
                online,
                last_seen,
            } => self.apply_presence(user_id, online, last_seen),
            RemoteEvent::Friend(contact) => self.apply_friend(contact),
        }
    }

    fn apply_message(&self, remote: RemoteMessage) -> Result<ReconcileOutcome, SyncError> {
        let now = Utc::now();
        let db = self.store()?;

        // The chat shell may not exist yet (first message from a new peer).
        let chat_kind = if remote.chat_id.0 == remote.sender_id.0 {
            ChatKind::Direct
        } else {
            ChatKind::Group
        };
        db.upsert_chat(&Chat::new(remote.chat_id, chat_kind, now))?;

        // Inbound content is transport plaintext; encrypt before storage.
        let (content, nonce) = if remote.kind.is_encrypted() {
            let (ciphertext, nonce) = crypto::encrypt(&self.key, remote.content.as_bytes())?;
            (ciphertext, Some(nonce.to_vec()))
        } else {
            (remote.content.into_bytes(), None)
        };

        // Chat-level disappearing TTL applies when the event itself carries
        // no expiry.
        let expires_at = match remote.expires_at {
            Some(at) => Some(at),
            None => db
                .get_chat(remote.chat_id)?
                .disappearing_ttl_secs
                .map(|ttl| remote.timestamp + Duration::seconds(ttl)),
        };

        let message = Message {
            id: remote.id,
            chat_id: remote.chat_id,
            sender_id: remote.sender_id,
            receiver_id: remote.receiver_id,
            kind: remote.kind,
            content,
            nonce,
            file_id: remote.file_id,
            thumbnail: None,
            reply_to: remote.reply_to,
            forwarded_from: remote.forwarded_from,
            status: remote.status,
            deleted_locally: false,
            deleted_for_everyone: false,
            edited_at: None,
            expires_at,
            synced: true,
            deleted_on_backend: false,
            created_at: remote.timestamp,
            updated_at: now,
        };

        if db.upsert_message(&message)? {
            // New message: move the chat pointer, bump unread only for
            // messages from peers.
            if remote.sender_id == self.self_id {
                db.record_outgoing_message(remote.chat_id, remote.id, remote.timestamp)?;
            } else {
                db.record_incoming_message(remote.chat_id, remote.id, remote.timestamp)?;
            }

            tracing::debug!(message = %remote.id, chat = %remote.chat_id, "remote message stored");
            Ok(ReconcileOutcome::MessageInserted {
                chat_id: remote.chat_id,
                message_id: remote.id,
            })
        } else {
            // Duplicate id: an echo of a send this device already holds.
            // Merge status monotonically and mark the row acknowledged;
            // never touch counters or pointers again.
            db.merge_message_status(remote.id, remote.status, now)?;
            db.mark_message_synced(remote.id, now)?;

            Ok(ReconcileOutcome::MessageEchoed {
                message_id: remote.id,
            })
        }
    }

    fn apply_status(
        &self,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<ReconcileOutcome, SyncError> {
        let db = self.store()?;
        if db.merge_message_status(message_id, status, Utc::now())? {
            Ok(ReconcileOutcome::StatusMerged { message_id, status })
        } else {
            Ok(ReconcileOutcome::Ignored)
        }
    }

    fn apply_presence(
        &self,
        user_id: UserId,
        online: bool,
        last_seen: chrono::DateTime<Utc>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let db = self.store()?;

        if !db.set_contact_presence(user_id, online, last_seen, last_seen)? {
            // First sighting of this user: create the contact row.
            db.upsert_contact(&Contact {
                id: user_id,
                display_name: None,
                avatar_url: None,
                is_friend: false,
                is_online: online,
                last_seen: Some(last_seen),
                updated_at: last_seen,
            })?;
        }

        Ok(ReconcileOutcome::ContactUpdated { user_id })
    }

    fn apply_friend(&self, remote: RemoteContact) -> Result<ReconcileOutcome, SyncError> {
        let db = self.store()?;
        let user_id = remote.id;

        db.upsert_contact(&Contact {
            id: remote.id,
            display_name: remote.display_name,
            avatar_url: remote.avatar_url,
            is_friend: remote.is_friend,
            is_online: false,
            last_seen: None,
            updated_at: remote.timestamp,
        })?;

        Ok(ReconcileOutcome::ContactUpdated { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use courrier_shared::types::MessageKind;

    fn setup() -> (SharedDatabase, Reconciler, SymmetricKey, UserId) {
        let store: SharedDatabase = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let key = crypto::generate_symmetric_key();
        let self_id = UserId::new();
        let reconciler = Reconciler::new(store.clone(), key, self_id);
        (store, reconciler, key, self_id)
    }

    fn remote_text(sender: UserId, chat_id: ChatId, content: &str) -> RemoteMessage {
        RemoteMessage {
            id: MessageId::new(),
            chat_id,
            sender_id: sender,
            receiver_id: None,
            kind: MessageKind::Text,
            content: content.to_string(),
            file_id: None,
            reply_to: None,
            forwarded_from: None,
            status: MessageStatus::Delivered,
            expires_at: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_message_creates_chat_and_bumps_unread() {
        let (store, reconciler, key, _) = setup();

        let sender = UserId::new();
        let chat_id = ChatId::direct(sender);
        let remote = remote_text(sender, chat_id, "Bonjour !");

        let outcome = reconciler
            .apply_remote_event(RemoteEvent::Message(remote.clone()))
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::MessageInserted { .. }));

        let db = store.lock().unwrap();
        let chat = db.get_chat(chat_id).unwrap();
        assert_eq!(chat.unread_count, 1);
        assert_eq!(chat.last_message_id, Some(remote.id));

        // Stored ciphertext decrypts back to the transport plaintext.
        let stored = db.get_message(remote.id).unwrap();
        assert_ne!(stored.content, b"Bonjour !");
        let nonce: [u8; 24] = stored.nonce.as_deref().unwrap().try_into().unwrap();
        let plain = crypto::decrypt(&key, &stored.content, &nonce).unwrap();
        assert_eq!(plain, b"Bonjour !");
    }

    #[test]
    fn echo_of_known_message_does_not_duplicate() {
        let (store, reconciler, _, _) = setup();

        let sender = UserId::new();
        let chat_id = ChatId::direct(sender);
        let remote = remote_text(sender, chat_id, "once");

        reconciler
            .apply_remote_event(RemoteEvent::Message(remote.clone()))
            .unwrap();
        let outcome = reconciler
            .apply_remote_event(RemoteEvent::Message(remote.clone()))
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::MessageEchoed { .. }));

        let db = store.lock().unwrap();
        assert_eq!(db.messages_by_chat(chat_id, 50, 0).unwrap().len(), 1);
        // The duplicate never bumps unread twice.
        assert_eq!(db.get_chat(chat_id).unwrap().unread_count, 1);
    }

    #[test]
    fn own_echo_skips_unread() {
        let (store, reconciler, _, self_id) = setup();

        let chat_id = ChatId::new();
        let remote = remote_text(self_id, chat_id, "mine");

        reconciler
            .apply_remote_event(RemoteEvent::Message(remote))
            .unwrap();

        let db = store.lock().unwrap();
        assert_eq!(db.get_chat(chat_id).unwrap().unread_count, 0);
    }

    #[test]
    fn out_of_order_status_lands_on_read() {
        let (store, reconciler, _, _) = setup();

        let sender = UserId::new();
        let chat_id = ChatId::direct(sender);
        let remote = remote_text(sender, chat_id, "status race");
        reconciler
            .apply_remote_event(RemoteEvent::Message(remote.clone()))
            .unwrap();

        // Two devices report read then delivered, out of order.
        for status in [MessageStatus::Read, MessageStatus::Delivered] {
            reconciler
                .apply_remote_event(RemoteEvent::Status {
                    message_id: remote.id,
                    chat_id,
                    status,
                    timestamp: Utc::now(),
                })
                .unwrap();
        }

        let db = store.lock().unwrap();
        assert_eq!(
            db.get_message(remote.id).unwrap().status,
            MessageStatus::Read
        );
    }

    #[test]
    fn chat_ttl_stamps_expiry_on_arrival() {
        let (store, reconciler, _, _) = setup();

        let sender = UserId::new();
        let chat_id = ChatId::direct(sender);

        // Chat exists with a disappearing TTL configured.
        {
            let db = store.lock().unwrap();
            db.upsert_chat(&Chat::new(chat_id, ChatKind::Direct, Utc::now()))
                .unwrap();
            db.set_disappearing_ttl(chat_id, Some(60)).unwrap();
        }

        let remote = remote_text(sender, chat_id, "ephemeral");
        reconciler
            .apply_remote_event(RemoteEvent::Message(remote.clone()))
            .unwrap();

        let db = store.lock().unwrap();
        let stored = db.get_message(remote.id).unwrap();
        let expires = stored.expires_at.expect("TTL should stamp expiry");
        assert_eq!(
            (expires - remote.timestamp).num_seconds(),
            60,
            "expiry should be created_at + ttl"
        );
    }

    #[test]
    fn presence_creates_then_updates_contact() {
        let (store, reconciler, _, _) = setup();
        let user = UserId::new();
        let now = Utc::now();

        reconciler
            .apply_remote_event(RemoteEvent::Presence {
                user_id: user,
                online: true,
                last_seen: now,
            })
            .unwrap();

        assert!(store.lock().unwrap().get_contact(user).unwrap().is_online);

        reconciler
            .apply_remote_event(RemoteEvent::Presence {
                user_id: user,
                online: false,
                last_seen: now + Duration::seconds(10),
            })
            .unwrap();

        let contact = store.lock().unwrap().get_contact(user).unwrap();
        assert!(!contact.is_online);
    }

    #[test]
    fn friend_event_upserts_profile() {
        let (store, reconciler, _, _) = setup();
        let user = UserId::new();

        reconciler
            .apply_remote_event(RemoteEvent::Friend(RemoteContact {
                id: user,
                display_name: Some("Benoît".to_string()),
                avatar_url: None,
                is_friend: true,
                timestamp: Utc::now(),
            }))
            .unwrap();

        let contact = store.lock().unwrap().get_contact(user).unwrap();
        assert!(contact.is_friend);
        assert_eq!(contact.display_name.as_deref(), Some("Benoît"));
    }
}
