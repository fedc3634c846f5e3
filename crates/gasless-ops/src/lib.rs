//! Relayed transfers from a Safe smart wallet, plus the action boundary the
//! presentation layer drives.
//!
//! Coordinates the session, Safe protocol, relay and balance modules:
//! - [`RelayedTransferOrchestrator`]: one transfer (or batch) from precondition
//!   check to relay task id
//! - [`GaslessApp`]: user intents, in-flight guards, notices

use serde::{Deserialize, Serialize};

use gasless_safe::MetaTransaction;
use gasless_types::{Address, GaslessError, Result, Wei};

pub mod app;
pub mod guard;
pub mod orchestrator;

pub use app::{AppState, Collaborators, GaslessApp, Notice, NoticeHandler, NoticeLevel, MAX_NOTICES};
pub use guard::{ActionGuards, ActionKind, InFlight};
pub use orchestrator::RelayedTransferOrchestrator;

/// A single native-currency transfer out of the primary Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Taken verbatim from the user; checked only when strict validation is on.
    pub destination: Address,
    pub amount_wei: Wei,
}

impl TransferRequest {
    pub fn new(destination: Address, amount_wei: Wei) -> Self {
        Self { destination, amount_wei }
    }

    /// The call the Safe executes: plain value transfer, empty calldata.
    ///
    /// Zero amounts are rejected. With `strict` the destination must parse as
    /// an address and the parsed form is sent; otherwise the text goes through
    /// verbatim. The amount is never altered.
    pub fn to_call(&self, strict: bool) -> Result<MetaTransaction> {
        if self.amount_wei == 0 {
            return Err(GaslessError::InvalidAmount("transfer amount must be positive".into()));
        }
        let to = if strict {
            Address::parse(self.destination.as_str())?
        } else {
            self.destination.clone()
        };
        Ok(MetaTransaction::transfer(to, self.amount_wei))
    }
}

/// Result of one submission. Nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayOutcome {
    /// Accepted by the relay. Execution happens later, out of band.
    Submitted { task_id: String },
    Failed { reason: GaslessError },
}

impl RelayOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, RelayOutcome::Submitted { .. })
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            RelayOutcome::Submitted { task_id } => Some(task_id),
            RelayOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&GaslessError> {
        match self {
            RelayOutcome::Submitted { .. } => None,
            RelayOutcome::Failed { reason } => Some(reason),
        }
    }
}
