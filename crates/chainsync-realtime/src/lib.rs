//! chainsync-realtime — the realtime head-following sync service.
//!
//! Tracks the unfinalized suffix of the canonical chain, reconciles forks
//! of bounded depth, maintains a monotonic finality checkpoint, and feeds
//! matched logs into the event store. Consumers subscribe to the typed
//! event stream via [`SyncHandle`].

mod error;
mod service;

pub use error::SyncError;
pub use service::{RealtimeSync, SetupSummary, SyncHandle};
