//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(id: u64, method: &'static str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Unwrap the result value or surface the node's error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(error) = self.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = RpcRequest::new(1, "eth_getBlockByNumber", vec!["latest".into(), true.into()]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""jsonrpc":"2.0""#));
        assert!(json.contains(r#""method":"eth_getBlockByNumber""#));
        assert!(json.contains(r#""params":["latest",true]"#));
    }

    #[test]
    fn response_into_result_ok() {
        let resp: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::String("0x10".into()));
    }

    #[test]
    fn response_into_result_error() {
        let resp: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
        )
        .unwrap();
        match resp.into_result().unwrap_err() {
            RpcError::Rpc { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn null_result_becomes_null_value() {
        let resp: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }
}
