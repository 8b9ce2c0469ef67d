//! The remote backend seam.
//!
//! The engine never talks HTTP/WebSocket itself; the host hands it an
//! implementation of [`RemoteBackend`] and feeds inbound realtime events to
//! the [`Reconciler`](crate::Reconciler) directly.

use std::future::Future;

use chrono::{DateTime, Utc};

use courrier_shared::protocol::SyncOperation;

use crate::error::SyncError;

/// Acknowledgement for a successfully pushed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PushAck {
    /// Backend-side receive time.
    pub server_time: DateTime<Utc>,
}

/// Transport to the remote backend, implemented by the host.
///
/// `push` is called once per queue entry during a drain, always outside any
/// store lock.  A returned error counts against the entry's retry budget.
pub trait RemoteBackend {
    fn push(
        &self,
        op: SyncOperation,
    ) -> impl Future<Output = Result<PushAck, SyncError>> + Send;
}
