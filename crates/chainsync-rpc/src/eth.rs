//! Typed Ethereum JSON-RPC surface consumed by the realtime service.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::HttpRpcClient;
use crate::error::RpcError;
use crate::models::{RpcBlock, RpcLog};

/// Block selector for `eth_getBlockByNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    fn to_param(self) -> Value {
        match self {
            Self::Latest => "latest".into(),
            Self::Number(n) => format!("0x{n:x}").into(),
        }
    }
}

/// The three methods the realtime service needs from an EVM endpoint.
#[async_trait]
pub trait EthRpcClient: Send + Sync {
    /// `eth_getBlockByNumber`. `None` if the endpoint has no such block.
    async fn block_by_number(
        &self,
        tag: BlockTag,
        full_transactions: bool,
    ) -> Result<Option<RpcBlock>, RpcError>;

    /// `eth_getBlockByHash`. `None` if the endpoint has no such block.
    async fn block_by_hash(
        &self,
        hash: &str,
        full_transactions: bool,
    ) -> Result<Option<RpcBlock>, RpcError>;

    /// `eth_getLogs` scoped to a single block hash.
    async fn logs_by_block_hash(&self, block_hash: &str) -> Result<Vec<RpcLog>, RpcError>;
}

#[async_trait]
impl EthRpcClient for HttpRpcClient {
    async fn block_by_number(
        &self,
        tag: BlockTag,
        full_transactions: bool,
    ) -> Result<Option<RpcBlock>, RpcError> {
        let result = self
            .request(
                "eth_getBlockByNumber",
                vec![tag.to_param(), full_transactions.into()],
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    async fn block_by_hash(
        &self,
        hash: &str,
        full_transactions: bool,
    ) -> Result<Option<RpcBlock>, RpcError> {
        let result = self
            .request(
                "eth_getBlockByHash",
                vec![hash.into(), full_transactions.into()],
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    async fn logs_by_block_hash(&self, block_hash: &str) -> Result<Vec<RpcLog>, RpcError> {
        let result = self
            .request("eth_getLogs", vec![json!({ "blockHash": block_hash })])
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}
