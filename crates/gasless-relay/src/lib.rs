//! Gas-sponsoring relay port.
//!
//! - Wrap a Safe transaction into a relay envelope under a gas ceiling
//! - Submit the signed envelope, receive a task id immediately
//! - Look up task status (execution happens out of band)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gasless_safe::{RelayEnvelope, RelayOptions, SafeTransaction, SignedRelayEnvelope};
use gasless_types::{GaslessError, Hex, RelayFailure, Result};

pub mod gelato_client;
pub mod memory;

pub use gelato_client::GelatoRelayClient;

/// Acknowledgement of a submitted relay task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub task_id: String,
}

/// Lifecycle of a relay task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    CheckPending,
    ExecPending,
    WaitingForConfirmation,
    ExecSuccess,
    ExecReverted,
    Cancelled,
    NotFound,
}

impl TaskState {
    /// No further transitions happen from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::ExecSuccess | TaskState::ExecReverted | TaskState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub task_state: TaskState,
    pub transaction_hash: Option<Hex>,
}

/// The relay collaborator.
#[async_trait]
pub trait RelayKit: Send + Sync {
    /// Produce a relay-ready envelope. Fails if the transaction needs more gas
    /// than `options.gas_limit`.
    async fn create_relayed_transaction(
        &self,
        transaction: SafeTransaction,
        options: RelayOptions,
    ) -> Result<RelayEnvelope>;

    /// Hand the signed envelope to the relay. Returns as soon as the relay
    /// accepts the task.
    async fn execute_relay_transaction(
        &self,
        signed: &SignedRelayEnvelope,
        sponsored: bool,
    ) -> Result<RelayResponse>;

    async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus>;
}

/// Attach relay options to a transaction, enforcing the gas ceiling.
pub fn prepare_envelope(transaction: SafeTransaction, options: RelayOptions) -> Result<RelayEnvelope> {
    if options.gas_limit == 0 {
        return Err(GaslessError::Config("gas limit must be non-zero".into()));
    }
    if transaction.estimated_gas > options.gas_limit {
        return Err(RelayFailure::GasLimitExceeded {
            estimated: transaction.estimated_gas,
            limit: options.gas_limit,
        }
        .into());
    }
    Ok(RelayEnvelope { transaction, options })
}
