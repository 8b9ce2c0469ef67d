//! # courrier-sync
//!
//! The synchronization half of the engine: draining the durable sync queue
//! against the remote backend, folding backend-pushed events back into the
//! store, and the periodic lifecycle sweep.
//!
//! Everything here operates on an explicitly injected store handle; there is
//! no module-level state.

pub mod backend;
pub mod queue;
pub mod reconcile;
pub mod scheduler;

mod error;

use std::sync::{Arc, Mutex};

use courrier_store::Database;

pub use backend::{PushAck, RemoteBackend};
pub use error::SyncError;
pub use queue::{DrainReport, RetryPolicy, SyncQueue};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use scheduler::{CleanupReport, LifecycleScheduler};

/// The store handle shared between the UI-facing engine, the queue drain,
/// reconciliation and the scheduler.  Guarded by a synchronous mutex; no
/// holder ever keeps it across an await point.
pub type SharedDatabase = Arc<Mutex<Database>>;
