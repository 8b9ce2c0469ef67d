//! Engine configuration.
//!
//! Every recognized knob is a typed field with a default; there is no
//! string-keyed settings blob to misspell.  Values the install must
//! remember across runs (key material, cleanup timestamps) live in the
//! store's settings table instead.

use std::path::PathBuf;
use std::time::Duration;

use courrier_shared::constants::{
    DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_QUEUE_STALENESS_MS, DEFAULT_STORY_TTL_SECS,
};
use courrier_sync::RetryPolicy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit database file path.  `None` uses the platform data dir.
    pub db_path: Option<PathBuf>,

    /// Entries pushed per drain pass.
    pub drain_batch_size: u32,

    /// Cadence of the background drain between explicit nudges.
    pub drain_interval: Duration,

    /// Retry/backoff policy for queue entries.
    pub retry: RetryPolicy,

    /// Cadence of the lifecycle sweep.  The first sweep runs at startup.
    pub cleanup_interval: Duration,

    /// Exhausted queue entries older than this are swept.
    pub queue_staleness: Duration,

    /// Lifetime stamped on newly published stories.
    pub story_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            drain_batch_size: 16,
            drain_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            queue_staleness: Duration::from_millis(DEFAULT_QUEUE_STALENESS_MS),
            story_ttl: Duration::from_secs(DEFAULT_STORY_TTL_SECS as u64),
        }
    }
}
