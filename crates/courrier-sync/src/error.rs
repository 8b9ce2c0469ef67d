use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The backend rejected the operation or was unreachable.  Retried with
    /// backoff up to the entry's budget, then left queued in a visible
    /// failed state.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Store error: {0}")]
    Store(#[from] courrier_store::StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] courrier_shared::CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] courrier_shared::ProtocolError),

    /// Another holder of the store mutex panicked.
    #[error("Store lock poisoned")]
    LockPoisoned,
}
