//! End-to-end flows through a running engine with a scripted backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use courrier_engine::{DefaultHost, Engine, EngineConfig, EngineEvent, HostPlatform};
use courrier_shared::protocol::{RemoteEvent, RemoteMessage, SyncOperation};
use courrier_shared::types::{ChatId, MessageId, MessageKind, MessageStatus, UserId};
use courrier_sync::{PushAck, RemoteBackend, RetryPolicy, SyncError};

/// Backend whose connectivity the test flips.
struct TestBackend {
    offline: AtomicBool,
    pushed: Mutex<Vec<SyncOperation>>,
}

impl TestBackend {
    fn new(offline: bool) -> Arc<Self> {
        Arc::new(Self {
            offline: AtomicBool::new(offline),
            pushed: Mutex::new(Vec::new()),
        })
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn pushed(&self) -> Vec<SyncOperation> {
        self.pushed.lock().unwrap().clone()
    }
}

/// Cloneable handle wired into the engine as its backend.  A local newtype is
/// required because the orphan rule forbids implementing the foreign
/// `RemoteBackend` trait directly for `Arc<TestBackend>`.  The `Arc` lets the
/// test retain a handle to the same state the engine drains against.
#[derive(Clone)]
struct TestBackendHandle(Arc<TestBackend>);

impl RemoteBackend for TestBackendHandle {
    async fn push(&self, op: SyncOperation) -> Result<PushAck, SyncError> {
        if self.0.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Delivery("offline".to_string()));
        }
        self.0.pushed.lock().unwrap().push(op);
        Ok(PushAck {
            server_time: Utc::now(),
        })
    }
}

fn test_config(dir: &tempfile::TempDir) -> EngineConfig {
    EngineConfig {
        db_path: Some(dir.path().join("courrier.db")),
        // Long intervals so only explicit drains run during the test.
        drain_interval: std::time::Duration::from_secs(3_600),
        cleanup_interval: std::time::Duration::from_secs(3_600),
        retry: RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        },
        ..EngineConfig::default()
    }
}

async fn start_engine(
    backend: Arc<TestBackend>,
    dir: &tempfile::TempDir,
) -> (
    Engine<TestBackendHandle>,
    tokio::sync::mpsc::Receiver<EngineEvent>,
) {
    // RUST_LOG=debug makes failing runs readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    Engine::start(UserId::new(), test_config(dir), TestBackendHandle(backend), &DefaultHost)
        .await
        .expect("engine should start")
}

#[tokio::test]
async fn offline_send_then_reconnect_drain() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(true);
    let (engine, _events) = start_engine(backend.clone(), &dir).await;

    let peer = UserId::new();
    let chat_id = engine.start_chat(peer).unwrap();
    let msg_id = engine
        .send_text_message(chat_id, Some(peer), "envoyé hors ligne")
        .unwrap();

    // Offline: the message is pending locally.
    let history = engine.messages(chat_id, 50, 0).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, MessageStatus::Pending);
    assert_eq!(history[0].text.as_deref(), Some("envoyé hors ligne"));

    // A drain against a dead backend fails without losing the entry.
    let report = engine.drain_now().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(
        engine.messages(chat_id, 50, 0).unwrap()[0].status,
        MessageStatus::Pending
    );

    // Connectivity returns.  (The background worker may race this drain;
    // the final state is what matters.)
    backend.set_offline(false);
    engine.drain_now().await.unwrap();

    let history = engine.messages(chat_id, 50, 0).unwrap();
    assert_eq!(history[0].status, MessageStatus::Sent);

    // Queue is empty: nothing further to drain.
    let report = engine.drain_now().await.unwrap();
    assert_eq!(report.attempted, 0);

    let pushed = backend.pushed();
    assert!(!pushed.is_empty());
    assert!(pushed
        .iter()
        .all(|op| matches!(op, SyncOperation::SendMessage(send) if send.id == msg_id)));

    engine.shutdown().await;
}

#[tokio::test]
async fn remote_arrival_updates_chat_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, mut events) = start_engine(backend, &dir).await;

    let sender = UserId::new();
    let chat_id = ChatId::direct(sender);
    let message_id = MessageId::new();

    engine
        .apply_remote_event(RemoteEvent::Message(RemoteMessage {
            id: message_id,
            chat_id,
            sender_id: sender,
            receiver_id: None,
            kind: MessageKind::Text,
            content: "Salut !".to_string(),
            file_id: None,
            reply_to: None,
            forwarded_from: None,
            status: MessageStatus::Delivered,
            expires_at: None,
            timestamp: Utc::now(),
        }))
        .unwrap();

    let chats = engine.list_chats(false).unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].chat.unread_count, 1);
    let last = chats[0].last_message.as_ref().unwrap();
    assert_eq!(last.text.as_deref(), Some("Salut !"));

    assert_eq!(
        events.recv().await,
        Some(EngineEvent::MessageArrived {
            chat_id,
            message_id
        })
    );

    engine.shutdown().await;
}

#[tokio::test]
async fn out_of_order_receipts_land_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, _events) = start_engine(backend, &dir).await;

    let peer = UserId::new();
    let chat_id = engine.start_chat(peer).unwrap();
    let msg_id = engine
        .send_text_message(chat_id, Some(peer), "deux appareils")
        .unwrap();
    engine.drain_now().await.unwrap();

    // Read arrives before delivered.
    for status in [MessageStatus::Read, MessageStatus::Delivered] {
        engine
            .apply_remote_event(RemoteEvent::Status {
                message_id: msg_id,
                chat_id,
                status,
                timestamp: Utc::now(),
            })
            .unwrap();
    }

    let history = engine.messages(chat_id, 50, 0).unwrap();
    assert_eq!(history[0].status, MessageStatus::Read);

    engine.shutdown().await;
}

#[tokio::test]
async fn corrupt_key_import_keeps_old_content_readable() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (mut engine, _events) = start_engine(backend, &dir).await;

    let peer = UserId::new();
    let chat_id = engine.start_chat(peer).unwrap();
    engine
        .send_text_message(chat_id, Some(peer), "toujours lisible")
        .unwrap();

    assert!(engine.import_encryption_key("garbage blob").is_err());

    // The active key is unchanged: history still decrypts.
    let history = engine.messages(chat_id, 50, 0).unwrap();
    assert_eq!(history[0].text.as_deref(), Some("toujours lisible"));
    assert!(!history[0].unreadable);

    engine.shutdown().await;
}

#[tokio::test]
async fn key_export_round_trips_between_installs() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, _events) = start_engine(backend.clone(), &dir).await;

    let peer = UserId::new();
    let chat_id = engine.start_chat(peer).unwrap();
    engine
        .send_text_message(chat_id, Some(peer), "sauvegardé")
        .unwrap();

    let key_blob = engine.export_encryption_key().unwrap();
    let backup = engine.export_backup().unwrap();
    engine.shutdown().await;

    // Fresh install restores the backup and the key.
    let dir2 = tempfile::tempdir().unwrap();
    let (mut restored, _events) = start_engine(backend, &dir2).await;
    restored.import_encryption_key(&key_blob).unwrap();
    restored.import_backup(&backup).unwrap();

    let history = restored.messages(chat_id, 50, 0).unwrap();
    assert_eq!(history[0].text.as_deref(), Some("sauvegardé"));

    restored.shutdown().await;
}

#[tokio::test]
async fn read_receipt_resets_unread_and_projects() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, _events) = start_engine(backend.clone(), &dir).await;

    let sender = UserId::new();
    let chat_id = ChatId::direct(sender);
    engine
        .apply_remote_event(RemoteEvent::Message(RemoteMessage {
            id: MessageId::new(),
            chat_id,
            sender_id: sender,
            receiver_id: None,
            kind: MessageKind::Text,
            content: "non lu".to_string(),
            file_id: None,
            reply_to: None,
            forwarded_from: None,
            status: MessageStatus::Delivered,
            expires_at: None,
            timestamp: Utc::now(),
        }))
        .unwrap();

    engine.mark_chat_read(chat_id).unwrap();
    assert_eq!(engine.list_chats(false).unwrap()[0].chat.unread_count, 0);

    engine.drain_now().await.unwrap();
    assert!(backend
        .pushed()
        .iter()
        .any(|op| matches!(op, SyncOperation::ReadReceipt { .. })));

    engine.shutdown().await;
}

#[tokio::test]
async fn disappearing_ttl_stamps_outgoing_messages() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, _events) = start_engine(backend, &dir).await;

    let peer = UserId::new();
    let chat_id = engine.start_chat(peer).unwrap();
    engine.set_disappearing_ttl(chat_id, Some(300)).unwrap();

    engine
        .send_text_message(chat_id, Some(peer), "éphémère")
        .unwrap();

    let history = engine.messages(chat_id, 50, 0).unwrap();
    let expires = history[0].expires_at.expect("TTL should stamp expiry");
    assert_eq!((expires - history[0].created_at).num_seconds(), 300);

    engine.shutdown().await;
}

#[tokio::test]
async fn denied_durable_storage_is_surfaced() {
    struct DenyingHost;
    impl HostPlatform for DenyingHost {
        fn request_durable_storage(&self) -> bool {
            false
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, mut events) =
        Engine::start(UserId::new(), test_config(&dir), TestBackendHandle(backend), &DenyingHost)
            .await
            .unwrap();

    assert_eq!(events.recv().await, Some(EngineEvent::DegradedStorage));

    engine.shutdown().await;
}

#[tokio::test]
async fn hidden_and_pinned_flags_compose_in_listings() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, _events) = start_engine(backend, &dir).await;

    let visible = engine.start_chat(UserId::new()).unwrap();
    let secret = engine.start_chat(UserId::new()).unwrap();
    engine
        .set_chat_flag(secret, courrier_store::ChatFlag::Hidden, true)
        .unwrap();
    engine
        .set_chat_flag(secret, courrier_store::ChatFlag::Pinned, true)
        .unwrap();

    let default_view = engine.list_chats(false).unwrap();
    assert_eq!(default_view.len(), 1);
    assert_eq!(default_view[0].chat.id, visible);

    let full_view = engine.list_chats(true).unwrap();
    assert_eq!(full_view.len(), 2);
    // Pinned-first ordering holds inside the "show hidden" view.
    assert_eq!(full_view[0].chat.id, secret);
    assert!(full_view[0].chat.is_hidden && full_view[0].chat.is_pinned);

    engine.shutdown().await;
}

#[tokio::test]
async fn search_finds_decrypted_content() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(false);
    let (engine, _events) = start_engine(backend, &dir).await;

    let peer = UserId::new();
    let chat_id = engine.start_chat(peer).unwrap();
    engine
        .send_text_message(chat_id, Some(peer), "rendez-vous demain midi")
        .unwrap();
    engine
        .send_text_message(chat_id, Some(peer), "autre chose")
        .unwrap();

    let hits = engine.search_messages("Rendez-Vous", None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text.as_deref(), Some("rendez-vous demain midi"));

    engine.shutdown().await;
}
