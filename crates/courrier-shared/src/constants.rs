/// Application name
pub const APP_NAME: &str = "Courrier";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Known plaintext encrypted into every exported key blob.  Import decrypts
/// it and compares before accepting a key.
pub const KEY_CHECK_VALUE: &[u8] = b"courrier-key-check-v1";

/// Version tag written into exported key blobs.
pub const KEY_BLOB_VERSION: u8 = 1;

/// Settings key under which the serialized encryption key blob is persisted.
/// Losing this value makes all stored ciphertext permanently unreadable.
pub const SETTING_ENCRYPTION_KEY: &str = "encryption.key";

/// Settings key holding the RFC 3339 timestamp of the last cleanup sweep.
pub const SETTING_LAST_CLEANUP: &str = "lifecycle.last_cleanup";

/// Settings key recording whether the host granted durable storage.
pub const SETTING_DURABLE_STORAGE: &str = "storage.durable";

/// Priority band for message sends.  Strictly above status/reaction updates
/// so a message always reaches the backend before operations that refer to
/// it.
pub const PRIORITY_MESSAGE: i64 = 100;

/// Priority band for status updates, reactions, deletes and read receipts.
pub const PRIORITY_UPDATE: i64 = 50;

/// Priority band for typing indicators.
pub const PRIORITY_TYPING: i64 = 10;

/// Default retry budget for a sync-queue entry.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default exponential backoff base in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;

/// Default backoff cap in milliseconds (5 minutes).
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default staleness window after which exhausted queue entries are swept
/// (24 hours, in milliseconds).
pub const DEFAULT_QUEUE_STALENESS_MS: u64 = 86_400_000;

/// Default lifecycle sweep interval in seconds (hourly).
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3_600;

/// Default story lifetime in seconds (24 hours).
pub const DEFAULT_STORY_TTL_SECS: i64 = 86_400;
