//! Service-level error type.

use thiserror::Error;

use chainsync_rpc::RpcError;
use chainsync_store::StoreError;

/// Errors surfaced by the realtime sync service.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The endpoint returned data the service cannot interpret.
    #[error("malformed block data: {0}")]
    MalformedBlock(String),

    /// Local state no longer satisfies the service's own invariants.
    /// Never retried — this indicates corruption, not a transient fault.
    #[error("sync invariant violated: {0}")]
    InvariantViolation(String),
}

impl SyncError {
    /// Returns `true` if retrying the failed task can help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(error) => error.is_retryable(),
            Self::Store(StoreError::Database(_)) => true,
            Self::Store(_) => false,
            Self::MalformedBlock(_) | Self::InvariantViolation(_) => false,
        }
    }
}
