//! HTTP client for a Gelato-style relay service.
//!
//! Endpoints:
//! - POST /relays/v2/sponsored-call
//! - POST /relays/v2/call-with-sync-fee
//! - GET /tasks/status/<task_id>

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gasless_config::RelayConfig;
use gasless_safe::{RelayEnvelope, RelayOptions, SafeTransaction, SignedRelayEnvelope};
use gasless_types::{GaslessError, Hex, RelayFailure, Result};

use crate::{prepare_envelope, RelayKit, RelayResponse, TaskState, TaskStatus};

/// Placeholder token address meaning "pay the fee in the native currency".
const NATIVE_FEE_TOKEN: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsoredCallRequest {
    pub chain_id: String,
    pub target: String,
    pub data: Hex,
    pub sponsor_api_key: String,
    pub gas_limit: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFeeCallRequest {
    pub chain_id: String,
    pub target: String,
    pub data: Hex,
    pub fee_token: String,
    pub is_relay_context: bool,
    pub gas_limit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    task: StatusTask,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusTask {
    task_id: String,
    task_state: TaskState,
    transaction_hash: Option<Hex>,
}

/// Relay client for submitting Safe transactions.
pub struct GelatoRelayClient {
    base_url: String,
    chain_id: u64,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl GelatoRelayClient {
    pub fn new(base_url: &str, chain_id: u64, api_key: Option<String>, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn from_config(config: &RelayConfig, chain_id: u64, timeout: Duration) -> Self {
        Self::new(
            &config.base_url,
            chain_id,
            config.api_key.clone(),
            Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        )
    }

    /// Body for `POST /relays/v2/sponsored-call`.
    pub fn sponsored_call_body(&self, signed: &SignedRelayEnvelope) -> Result<SponsoredCallRequest> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| GaslessError::Config("relay API key is not configured".into()))?;
        Ok(SponsoredCallRequest {
            chain_id: self.chain_id.to_string(),
            target: signed.target.to_string(),
            data: signed.calldata.clone(),
            sponsor_api_key: api_key,
            gas_limit: signed.envelope.options.gas_limit.to_string(),
        })
    }

    /// Body for `POST /relays/v2/call-with-sync-fee`.
    pub fn sync_fee_call_body(&self, signed: &SignedRelayEnvelope) -> SyncFeeCallRequest {
        SyncFeeCallRequest {
            chain_id: self.chain_id.to_string(),
            target: signed.target.to_string(),
            data: signed.calldata.clone(),
            fee_token: NATIVE_FEE_TOKEN.to_string(),
            is_relay_context: false,
            gas_limit: signed.envelope.options.gas_limit.to_string(),
        }
    }

    async fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<RelayResponse> {
        let url = format!("{}{}", self.base_url, endpoint);

        let resp = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("relay submit", e))?;

        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayFailure::Status { code, body }.into());
        }

        resp.json()
            .await
            .map_err(|e| RelayFailure::Rejected(format!("failed to parse relay response: {e}")).into())
    }

    fn transport_error(&self, operation: &str, e: reqwest::Error) -> GaslessError {
        if e.is_timeout() {
            GaslessError::Timeout {
                operation: operation.to_string(),
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            GaslessError::Network(format!("{operation} request failed: {e}"))
        }
    }
}

#[async_trait]
impl RelayKit for GelatoRelayClient {
    async fn create_relayed_transaction(
        &self,
        transaction: SafeTransaction,
        options: RelayOptions,
    ) -> Result<RelayEnvelope> {
        if transaction.chain_id != self.chain_id {
            return Err(RelayFailure::Rejected(format!(
                "transaction for chain {} sent to relay for chain {}",
                transaction.chain_id, self.chain_id
            ))
            .into());
        }
        prepare_envelope(transaction, options)
    }

    async fn execute_relay_transaction(
        &self,
        signed: &SignedRelayEnvelope,
        sponsored: bool,
    ) -> Result<RelayResponse> {
        let response = if sponsored {
            let body = self.sponsored_call_body(signed)?;
            self.post("/relays/v2/sponsored-call", &body).await?
        } else {
            let body = self.sync_fee_call_body(signed);
            self.post("/relays/v2/call-with-sync-fee", &body).await?
        };
        info!(task_id = %response.task_id, target = %signed.target, sponsored, "relay task accepted");
        Ok(response)
    }

    async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let url = format!("{}/tasks/status/{}", self.base_url, task_id);

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("task status", e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(task_id, "relay task not found yet");
            return Ok(TaskStatus {
                task_id: task_id.to_string(),
                task_state: TaskState::NotFound,
                transaction_hash: None,
            });
        }
        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayFailure::Status { code, body }.into());
        }

        let body: StatusResponse = resp
            .json()
            .await
            .map_err(|e| GaslessError::Network(format!("failed to parse task status: {e}")))?;

        Ok(TaskStatus {
            task_id: body.task.task_id,
            task_state: body.task.task_state,
            transaction_hash: body.task.transaction_hash,
        })
    }
}
