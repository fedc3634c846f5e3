//! JSON-RPC chain provider.
//!
//! Methods:
//! - eth_chainId
//! - eth_getBalance(address, "latest")

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gasless_session::{ChainProvider, Signer};
use gasless_types::{parse_hex_quantity, Address, GaslessError, Result, Wei};

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// Read-only provider talking to an HTTP JSON-RPC endpoint.
pub struct RpcChainProvider {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcChainProvider {
    pub fn new(url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(20_000);
        Self {
            url: url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn request(&self, method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: method.to_string(),
            params,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = self.request(method, params);

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GaslessError::Timeout {
                        operation: method.to_string(),
                        after_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    GaslessError::Network(format!("rpc request failed: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            return Err(GaslessError::Network(format!(
                "rpc endpoint returned status {}",
                resp.status()
            )));
        }

        let body: RpcResponse = resp
            .json()
            .await
            .map_err(|e| GaslessError::Network(format!("failed to parse rpc response: {e}")))?;

        unwrap_response(method, body)
    }
}

/// Extract `result`, turning a JSON-RPC `error` into a network error.
pub fn unwrap_response(method: &str, body: RpcResponse) -> Result<Value> {
    if let Some(err) = body.error {
        return Err(GaslessError::Network(format!(
            "{method} failed ({}): {}",
            err.code, err.message
        )));
    }
    body.result
        .ok_or_else(|| GaslessError::Network(format!("{method} returned no result")))
}

fn quantity(method: &str, value: Value) -> Result<u128> {
    let text = value
        .as_str()
        .ok_or_else(|| GaslessError::Network(format!("{method} result is not a hex string")))?;
    parse_hex_quantity(text)
}

#[async_trait]
impl ChainProvider for RpcChainProvider {
    async fn chain_id(&self) -> Result<u64> {
        let id = quantity("eth_chainId", self.call("eth_chainId", json!([])).await?)?;
        u64::try_from(id).map_err(|_| GaslessError::Network(format!("chain id {id} out of range")))
    }

    async fn get_balance(&self, address: &Address) -> Result<Wei> {
        let result = self
            .call("eth_getBalance", json!([address.as_str(), "latest"]))
            .await?;
        quantity("eth_getBalance", result)
    }

    async fn signer(&self) -> Result<Arc<dyn Signer>> {
        Err(GaslessError::Precondition("rpc provider is read-only".into()))
    }
}
