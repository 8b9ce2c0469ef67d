use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] courrier_store::StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] courrier_shared::CryptoError),

    #[error("Sync error: {0}")]
    Sync(#[from] courrier_sync::SyncError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}
