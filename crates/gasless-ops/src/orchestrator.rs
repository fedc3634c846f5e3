use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use gasless_balance::BalanceTracker;
use gasless_config::{AppConfig, ChainConfig, RelayConfig, TimeoutConfig};
use gasless_relay::{RelayKit, TaskStatus};
use gasless_safe::{validate_batch, MetaTransaction, RelayOptions, SafeProtocol, TransactionBatch};
use gasless_session::{Session, SessionManager};
use gasless_types::{with_timeout, Address, GaslessError, RelayFailure, Result};

use crate::{RelayOutcome, TransferRequest};

/// Moves value out of the session's primary Safe through the relay.
///
/// Each submission runs: precondition check, signer lookup, Safe transaction
/// build, relay envelope, owner signature, relay execution, then a single
/// balance refresh on success.
pub struct RelayedTransferOrchestrator {
    sessions: Arc<SessionManager>,
    safe: Arc<dyn SafeProtocol>,
    relay: Arc<dyn RelayKit>,
    balances: Arc<BalanceTracker>,
    chain: ChainConfig,
    relay_config: RelayConfig,
    timeouts: TimeoutConfig,
    strict_destination: bool,
}

impl RelayedTransferOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        safe: Arc<dyn SafeProtocol>,
        relay: Arc<dyn RelayKit>,
        balances: Arc<BalanceTracker>,
        config: &AppConfig,
    ) -> Self {
        Self {
            sessions,
            safe,
            relay,
            balances,
            chain: config.chain().clone(),
            relay_config: config.relay.clone(),
            timeouts: config.timeouts.clone(),
            strict_destination: config.transfer.strict_destination,
        }
    }

    fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            sponsored: self.relay_config.sponsored,
            gas_limit: self.relay_config.gas_limit,
        }
    }

    /// Send `request.amount_wei` from the primary Safe to `request.destination`.
    pub async fn submit(&self, session: &Session, request: &TransferRequest) -> RelayOutcome {
        let safe = match primary_safe(session) {
            Ok(safe) => safe,
            Err(reason) => return RelayOutcome::Failed { reason },
        };
        let call = match request.to_call(self.strict_destination) {
            Ok(call) => call,
            Err(reason) => return RelayOutcome::Failed { reason },
        };
        self.run(session, safe, vec![call]).await
    }

    /// Execute an ordered batch atomically as one Safe transaction.
    pub async fn submit_batch(&self, session: &Session, batch: impl Into<TransactionBatch>) -> RelayOutcome {
        let safe = match primary_safe(session) {
            Ok(safe) => safe,
            Err(reason) => return RelayOutcome::Failed { reason },
        };
        let calls = batch.into().into_calls();
        if let Err(reason) = validate_batch(&calls, self.strict_destination) {
            return RelayOutcome::Failed { reason };
        }
        self.run(session, safe, calls).await
    }

    async fn run(&self, session: &Session, safe: Address, calls: Vec<MetaTransaction>) -> RelayOutcome {
        match self.relay_calls(session, &safe, &calls).await {
            Ok(task_id) => {
                info!(
                    safe = %safe,
                    task_id = %task_id,
                    calls = calls.len(),
                    status_url = %self.task_status_url(&task_id),
                    "relay transaction submitted"
                );
                // The relay has not necessarily executed yet; this read may be stale.
                if let Err(e) = self.balances.refresh_all(session).await {
                    warn!(error = %e, "post-transfer balance refresh failed");
                }
                RelayOutcome::Submitted { task_id }
            }
            Err(reason) => {
                warn!(safe = %safe, kind = reason.kind(), error = %reason, "relay transaction failed");
                RelayOutcome::Failed { reason }
            }
        }
    }

    async fn relay_calls(&self, session: &Session, safe: &Address, calls: &[MetaTransaction]) -> Result<String> {
        let t = &self.timeouts;

        let handle = self.sessions.signer().await?;
        if handle.epoch() != session.epoch {
            return Err(GaslessError::Precondition("session changed before submission".into()));
        }
        let provider = self.sessions.provider()?;
        let wallet = with_timeout("safe connect", t.rpc(), self.safe.connect(provider, safe)).await?;

        let transaction = with_timeout("build safe transaction", t.rpc(), wallet.build_transaction(calls)).await?;
        debug!(
            safe = %safe,
            nonce = transaction.nonce,
            estimated_gas = transaction.estimated_gas,
            value_wei = %transaction.total_value(),
            multi_send = transaction.is_multi_send(),
            "safe transaction built"
        );

        let envelope = with_timeout(
            "create relayed transaction",
            t.relay(),
            self.relay.create_relayed_transaction(transaction, self.relay_options()),
        )
        .await?;

        self.sessions.ensure_fresh(&handle).await?;
        let signer = handle.signer();
        let signed = with_timeout("sign relay transaction", t.auth(), wallet.sign(signer.as_ref(), envelope))
            .await
            .map_err(signing_error)?;

        let response = with_timeout(
            "execute relay transaction",
            t.relay(),
            self.relay.execute_relay_transaction(&signed, self.relay_config.sponsored),
        )
        .await?;
        Ok(response.task_id)
    }

    /// Poll the relay until the task reaches a terminal state.
    ///
    /// Never called by [`submit`](Self::submit); execution is out of band.
    pub async fn wait_for_execution(
        &self,
        task_id: &str,
        max_attempts: u32,
        poll_interval: Duration,
    ) -> Result<TaskStatus> {
        for attempt in 0..max_attempts {
            let status = with_timeout(
                "relay task status",
                self.timeouts.relay(),
                self.relay.get_task_status(task_id),
            )
            .await?;
            debug!(task_id, attempt, state = ?status.task_state, "relay task polled");
            if status.task_state.is_terminal() {
                return Ok(status);
            }
            if attempt + 1 < max_attempts {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Err(GaslessError::Timeout {
            operation: format!("relay task {task_id}"),
            after_ms: poll_budget_ms(poll_interval, max_attempts),
        })
    }

    /// Relay status page for a submitted task.
    pub fn task_status_url(&self, task_id: &str) -> String {
        self.relay_config.task_status_url(task_id)
    }

    /// Block explorer page for an account or Safe.
    pub fn explorer_address_url(&self, address: &Address) -> String {
        self.chain.explorer_address_url(address.as_str())
    }
}

/// First Safe of a signed-in session. Touches no collaborator.
fn primary_safe(session: &Session) -> Result<Address> {
    match session.primary_safe() {
        Some(safe) if session.is_authenticated => Ok(safe.clone()),
        _ => Err(GaslessError::Precondition("no smart wallet".into())),
    }
}

/// Total polling time, saturating instead of overflowing.
fn poll_budget_ms(interval: Duration, attempts: u32) -> u64 {
    u64::try_from(interval.as_millis())
        .unwrap_or(u64::MAX)
        .saturating_mul(u64::from(attempts))
}

fn signing_error(e: GaslessError) -> GaslessError {
    match e {
        GaslessError::Relay(_) | GaslessError::Timeout { .. } | GaslessError::Precondition(_) => e,
        other => RelayFailure::SigningFailed(other.to_string()).into(),
    }
}
