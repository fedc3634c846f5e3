//! Safe smart-wallet port and transaction model.
//!
//! - Ordered meta-transaction batches, executed atomically as one Safe transaction
//! - Relay envelopes (unsigned / signed) passed between the Safe and relay collaborators
//! - `SafeProtocol` / `SafeHandle` traits with an in-memory implementation in [`memory`]

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gasless_session::{ChainProvider, Signer};
use gasless_types::{Address, Hex, Result, Wei};

pub mod batch;
pub mod memory;

pub use batch::{validate_batch, TransactionBatch};

/// How the Safe executes a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Call,
    DelegateCall,
}

/// One entry of a Safe batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
    pub to: Address,
    pub value: Wei,
    pub data: Hex,
    pub operation: OperationType,
}

impl MetaTransaction {
    /// Plain native-currency transfer with empty calldata.
    pub fn transfer(to: Address, value: Wei) -> Self {
        Self {
            to,
            value,
            data: "0x".into(),
            operation: OperationType::Call,
        }
    }
}

/// Owners and signature threshold for a new Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeAccountConfig {
    pub owners: Vec<Address>,
    pub threshold: u32,
}

impl SafeAccountConfig {
    /// Single-owner Safe with threshold 1.
    pub fn single_owner(owner: Address) -> Self {
        Self {
            owners: vec![owner],
            threshold: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        use gasless_types::GaslessError;

        if self.owners.is_empty() {
            return Err(GaslessError::Precondition("safe needs at least one owner".into()));
        }
        if self.threshold == 0 || self.threshold as usize > self.owners.len() {
            return Err(GaslessError::Precondition(format!(
                "threshold {} invalid for {} owner(s)",
                self.threshold,
                self.owners.len()
            )));
        }
        for (i, owner) in self.owners.iter().enumerate() {
            if self.owners[..i].contains(owner) {
                return Err(GaslessError::Precondition(format!("duplicate owner {owner}")));
            }
        }
        Ok(())
    }
}

/// A Safe transaction wrapping an ordered batch of calls.
///
/// A batch of more than one call is executed through MultiSend; either every
/// call is applied or none is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeTransaction {
    pub safe: Address,
    pub chain_id: u64,
    pub nonce: u64,
    pub calls: Vec<MetaTransaction>,
    /// Gas the Safe expects the execution to need.
    pub estimated_gas: u64,
}

impl SafeTransaction {
    pub fn is_multi_send(&self) -> bool {
        self.calls.len() > 1
    }

    pub fn total_value(&self) -> Wei {
        self.calls.iter().map(|c| c.value).sum()
    }
}

/// Relay settings attached to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayOptions {
    pub sponsored: bool,
    pub gas_limit: u64,
}

/// Relay-ready transaction awaiting the owner's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub transaction: SafeTransaction,
    pub options: RelayOptions,
}

/// Signed envelope: the relay posts `calldata` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRelayEnvelope {
    pub envelope: RelayEnvelope,
    pub signatures: Hex,
    pub target: Address,
    pub calldata: Hex,
}

/// The smart-wallet protocol collaborator.
#[async_trait]
pub trait SafeProtocol: Send + Sync {
    /// Bind to an existing Safe.
    async fn connect(
        &self,
        provider: Arc<dyn ChainProvider>,
        safe: &Address,
    ) -> Result<Arc<dyn SafeHandle>>;

    /// Deploy a new Safe and return its address.
    async fn deploy(
        &self,
        provider: Arc<dyn ChainProvider>,
        signer: Arc<dyn Signer>,
        config: &SafeAccountConfig,
    ) -> Result<Address>;
}

/// A connected Safe.
#[async_trait]
pub trait SafeHandle: Send + Sync {
    fn address(&self) -> &Address;

    async fn get_balance(&self) -> Result<Wei>;

    /// Wrap an ordered batch into one Safe transaction. Order is preserved.
    async fn build_transaction(&self, calls: &[MetaTransaction]) -> Result<SafeTransaction>;

    /// Produce the owner signature for a relay envelope.
    async fn sign(&self, signer: &dyn Signer, envelope: RelayEnvelope) -> Result<SignedRelayEnvelope>;
}
