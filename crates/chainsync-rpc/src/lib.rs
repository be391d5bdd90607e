//! chainsync-rpc — JSON-RPC transport and typed Ethereum models for the
//! ChainSync realtime engine.

pub mod client;
pub mod error;
pub mod eth;
pub mod models;
pub mod policy;
pub mod wire;

pub use client::{HttpClientConfig, HttpRpcClient};
pub use error::RpcError;
pub use eth::{BlockTag, EthRpcClient};
pub use models::{BlockTransactions, RpcBlock, RpcLog, RpcTransaction};
pub use policy::RetryConfig;
