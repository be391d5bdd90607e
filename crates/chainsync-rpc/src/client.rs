//! HTTP JSON-RPC client backed by `reqwest`, with automatic retry for
//! transient transport errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::error::RpcError;
use crate::policy::RetryConfig;
use crate::wire::{RpcRequest, RpcResponse};

/// Configuration for [`HttpRpcClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP JSON-RPC client for a single endpoint.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryConfig,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: config.retry,
            next_id: AtomicU64::new(0),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, RpcError> {
        Self::new(url, HttpClientConfig::default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC call, retrying transient transport failures with
    /// exponential backoff. JSON-RPC protocol errors are not retried here.
    pub async fn request(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&request).await {
                Ok(response) => return response.into_result(),
                Err(error) if error.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            method,
                            error = %error,
                            "retrying rpc request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, method, error = %error, "rpc retries exhausted");
                        return Err(error);
                    }
                },
                Err(error) => return Err(error),
            }
        }
    }

    async fn send_once(&self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {status}: {body}")));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))
    }
}
