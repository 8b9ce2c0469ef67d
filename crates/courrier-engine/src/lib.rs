//! # courrier-engine
//!
//! Composition root of the Courrier sync engine.  The host UI constructs an
//! [`Engine`] at app start with its backend transport and platform hooks,
//! reads and writes through it, feeds it backend realtime events, and tears
//! it down at app stop.  No module-level state anywhere.
//!
//! Writes follow a two-phase protocol: phase one is a synchronous local
//! write plus a durable queue entry; phase two is the background drain.
//! The queue entry is the only handoff artifact between the phases.

pub mod config;
pub mod engine;
pub mod events;
pub mod host;
pub mod keyring;

mod error;
mod workers;

pub use config::EngineConfig;
pub use engine::{ChatListEntry, Engine, MessageView, StoryView};
pub use error::EngineError;
pub use events::EngineEvent;
pub use host::{DefaultHost, HostPlatform};
