//! In-memory Safe protocol (for testing and demos).
//!
//! Balances are read through the chain provider. Gas estimates are
//! `BASE_GAS + PER_CALL_GAS * calls`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha3::{Digest, Keccak256};
use tracing::debug;

use gasless_types::{GaslessError, RelayFailure};

use crate::*;

pub const BASE_GAS: u64 = 21_000;
pub const PER_CALL_GAS: u64 = 30_000;

/// Selector of `execTransaction(...)` on the Safe singleton.
const EXEC_TRANSACTION_SELECTOR: &str = "6a761202";

#[derive(Default)]
struct SafeState {
    deploy_addresses: Mutex<VecDeque<Address>>,
    deployed: Mutex<Vec<(Address, SafeAccountConfig)>>,
    built: Mutex<Vec<SafeTransaction>>,
    nonce: AtomicU64,
    fail_deploy: AtomicBool,
    fail_sign: AtomicBool,
    connect_calls: AtomicUsize,
    deploy_calls: AtomicUsize,
    build_calls: AtomicUsize,
    sign_calls: AtomicUsize,
}

/// Scriptable Safe protocol. Handles share its state and counters.
pub struct MemorySafeProtocol {
    chain_id: u64,
    state: Arc<SafeState>,
}

impl MemorySafeProtocol {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Arc::new(SafeState::default()),
        }
    }

    /// Address handed out by the next `deploy`.
    pub fn queue_deploy_address(&self, address: Address) {
        self.state.deploy_addresses.lock().unwrap().push_back(address);
    }

    pub fn fail_deploy(&self, fail: bool) {
        self.state.fail_deploy.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sign(&self, fail: bool) {
        self.state.fail_sign.store(fail, Ordering::SeqCst);
    }

    pub fn deployed(&self) -> Vec<(Address, SafeAccountConfig)> {
        self.state.deployed.lock().unwrap().clone()
    }

    /// Every transaction built through any handle, in build order.
    pub fn built_transactions(&self) -> Vec<SafeTransaction> {
        self.state.built.lock().unwrap().clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn deploy_calls(&self) -> usize {
        self.state.deploy_calls.load(Ordering::SeqCst)
    }

    pub fn build_calls(&self) -> usize {
        self.state.build_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.state.sign_calls.load(Ordering::SeqCst)
    }

    /// Total collaborator calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.connect_calls() + self.deploy_calls() + self.build_calls() + self.sign_calls()
    }
}

#[async_trait]
impl SafeProtocol for MemorySafeProtocol {
    async fn connect(
        &self,
        provider: Arc<dyn ChainProvider>,
        safe: &Address,
    ) -> Result<Arc<dyn SafeHandle>> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySafeHandle {
            address: safe.clone(),
            chain_id: self.chain_id,
            provider,
            state: Arc::clone(&self.state),
        }))
    }

    async fn deploy(
        &self,
        _provider: Arc<dyn ChainProvider>,
        signer: Arc<dyn Signer>,
        config: &SafeAccountConfig,
    ) -> Result<Address> {
        self.state.deploy_calls.fetch_add(1, Ordering::SeqCst);
        config.validate()?;
        if !config.owners.contains(signer.address()) {
            return Err(GaslessError::Precondition("deployer must be an owner".into()));
        }
        if self.state.fail_deploy.load(Ordering::SeqCst) {
            return Err(GaslessError::Network("deployment transaction failed".into()));
        }
        let address = self
            .state
            .deploy_addresses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GaslessError::Network("no deployment address queued".into()))?;
        self.state.deployed.lock().unwrap().push((address.clone(), config.clone()));
        debug!(safe = %address, owners = config.owners.len(), "memory safe deployed");
        Ok(address)
    }
}

/// Handle returned by [`MemorySafeProtocol::connect`].
pub struct MemorySafeHandle {
    address: Address,
    chain_id: u64,
    provider: Arc<dyn ChainProvider>,
    state: Arc<SafeState>,
}

#[async_trait]
impl SafeHandle for MemorySafeHandle {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn get_balance(&self) -> Result<Wei> {
        self.provider.get_balance(&self.address).await
    }

    async fn build_transaction(&self, calls: &[MetaTransaction]) -> Result<SafeTransaction> {
        self.state.build_calls.fetch_add(1, Ordering::SeqCst);
        validate_batch(calls, false)?;
        let tx = SafeTransaction {
            safe: self.address.clone(),
            chain_id: self.chain_id,
            nonce: self.state.nonce.load(Ordering::SeqCst),
            calls: calls.to_vec(),
            estimated_gas: BASE_GAS + PER_CALL_GAS * calls.len() as u64,
        };
        self.state.built.lock().unwrap().push(tx.clone());
        Ok(tx)
    }

    async fn sign(&self, signer: &dyn Signer, envelope: RelayEnvelope) -> Result<SignedRelayEnvelope> {
        self.state.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_sign.load(Ordering::SeqCst) {
            return Err(RelayFailure::SigningFailed("safe rejected signer".into()).into());
        }
        if envelope.transaction.safe != self.address {
            return Err(GaslessError::Precondition(format!(
                "envelope for {} signed by handle for {}",
                envelope.transaction.safe, self.address
            )));
        }

        let encoded = serde_json::to_vec(&envelope.transaction)
            .map_err(|e| GaslessError::Precondition(format!("unencodable transaction: {e}")))?;
        let digest: [u8; 32] = Keccak256::digest(&encoded).into();
        let signatures = signer.sign_hash(&digest).await?;

        self.state.nonce.fetch_add(1, Ordering::SeqCst);
        let calldata = format!("0x{}{}", EXEC_TRANSACTION_SELECTOR, hex::encode(digest));
        Ok(SignedRelayEnvelope {
            target: self.address.clone(),
            envelope,
            signatures,
            calldata,
        })
    }
}
