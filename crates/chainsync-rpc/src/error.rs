//! RPC-layer error types.

use thiserror::Error;

/// Errors that can occur while talking to the JSON-RPC endpoint or while
/// decoding what it returns.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, timeout, 5xx, ...).
    #[error("http error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response could not be deserialized.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A hex quantity in a response failed to parse.
    #[error("invalid quantity {value:?} in field {field}")]
    InvalidQuantity { field: &'static str, value: String },

    /// The endpoint returned null for a block the caller required.
    #[error("block {0} not found")]
    BlockNotFound(String),
}

impl RpcError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        // A missing block is usually the endpoint lagging behind its own
        // head announcement, so the task-level retry covers it.
        matches!(self, Self::Http(_) | Self::BlockNotFound(_))
    }
}
