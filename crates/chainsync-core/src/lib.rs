//! chainsync-core — shared types and pure helpers for the realtime sync
//! engine.
//!
//! # Architecture
//!
//! ```text
//! RealtimeSync ──► TaskQueue      (block tasks, lowest number first)
//!       │
//!       ├── LocalChain            (unfinalized suffix, parent-hash linked)
//!       ├── bloom pre-screen ───► log filter ───► EventStore
//!       └── EventPublisher        (typed events for the outer scheduler)
//! ```

pub mod bloom;
pub mod chain;
pub mod config;
pub mod event;
pub mod filter;
pub mod interval;
pub mod queue;
pub mod telemetry;
pub mod types;

pub use chain::LocalChain;
pub use config::{LogFilterConfig, NetworkConfig};
pub use event::{EventPublisher, SyncEvent};
pub use filter::LogFilterSpec;
pub use interval::CachedInterval;
pub use queue::TaskQueue;
pub use types::{Block, BlockHeader, ContractCall, Log, Transaction};
