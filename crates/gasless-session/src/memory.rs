//! In-memory auth, chain and signer adapters (for testing and demos).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::*;

/// Deterministic signer: the "signature" is the digest followed by the
/// signer's address bytes and a recovery byte.
pub struct MemorySigner {
    address: Address,
    sign_calls: AtomicUsize,
    reject: AtomicBool,
}

impl MemorySigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            sign_calls: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
        }
    }

    /// Simulate the user declining the signature prompt.
    pub fn reject_signatures(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for MemorySigner {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn sign_hash(&self, hash: &[u8; 32]) -> Result<Hex> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(GaslessError::Auth("user rejected signature request".into()));
        }
        let owner = self.address.normalized();
        let owner = owner.strip_prefix("0x").unwrap_or(&owner);
        Ok(format!("0x{}{}1b", hex::encode(hash), owner))
    }
}

/// Chain provider backed by a balance table.
pub struct MemoryChainProvider {
    chain_id: u64,
    signer: Arc<MemorySigner>,
    balances: Mutex<HashMap<Address, Wei>>,
    balance_queries: Mutex<Vec<Address>>,
    unreachable: AtomicBool,
}

impl MemoryChainProvider {
    pub fn new(chain_id: u64, signer: Arc<MemorySigner>) -> Self {
        Self {
            chain_id,
            signer,
            balances: Mutex::new(HashMap::new()),
            balance_queries: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn set_balance(&self, address: &Address, amount: Wei) {
        self.balances.lock().unwrap().insert(address.clone(), amount);
    }

    /// Every address passed to `get_balance`, in call order.
    pub fn balance_queries(&self) -> Vec<Address> {
        self.balance_queries.lock().unwrap().clone()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn memory_signer(&self) -> Arc<MemorySigner> {
        Arc::clone(&self.signer)
    }
}

#[async_trait]
impl ChainProvider for MemoryChainProvider {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn get_balance(&self, address: &Address) -> Result<Wei> {
        self.balance_queries.lock().unwrap().push(address.clone());
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GaslessError::Network("provider unreachable".into()));
        }
        Ok(self.balances.lock().unwrap().get(address).copied().unwrap_or(0))
    }

    async fn signer(&self) -> Result<Arc<dyn Signer>> {
        Ok(self.signer.clone())
    }
}

/// Scriptable social-login provider.
pub struct MemoryAuthProvider {
    eoa: Address,
    safes: Mutex<Vec<Address>>,
    profile: UserProfile,
    provider: Arc<MemoryChainProvider>,
    authenticated: AtomicBool,
    fail_init: AtomicBool,
    fail_sign_in: AtomicBool,
    fail_user_info: AtomicBool,
    sign_in_delay: Mutex<Option<Duration>>,
    init_calls: AtomicUsize,
    sign_in_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl MemoryAuthProvider {
    /// Provider for `eoa` on chain 100 with no smart wallets.
    pub fn new(eoa: Address) -> Self {
        let signer = Arc::new(MemorySigner::new(eoa.clone()));
        Self {
            eoa,
            safes: Mutex::new(Vec::new()),
            profile: UserProfile {
                name: Some("Test User".into()),
                email: Some("test@example.com".into()),
                profile_image: None,
            },
            provider: Arc::new(MemoryChainProvider::new(100, signer)),
            authenticated: AtomicBool::new(false),
            fail_init: AtomicBool::new(false),
            fail_sign_in: AtomicBool::new(false),
            fail_user_info: AtomicBool::new(false),
            sign_in_delay: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_safes(self, safes: Vec<Address>) -> Self {
        *self.safes.lock().unwrap() = safes;
        self
    }

    /// Report a live session right after `init`.
    pub fn already_authenticated(self) -> Self {
        self.authenticated.store(true, Ordering::SeqCst);
        self
    }

    pub fn chain(&self) -> Arc<MemoryChainProvider> {
        Arc::clone(&self.provider)
    }

    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sign_in(&self, fail: bool) {
        self.fail_sign_in.store(fail, Ordering::SeqCst);
    }

    pub fn fail_user_info(&self, fail: bool) {
        self.fail_user_info.store(fail, Ordering::SeqCst);
    }

    pub fn set_sign_in_delay(&self, delay: Option<Duration>) {
        *self.sign_in_delay.lock().unwrap() = delay;
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn init(&self, _options: &AuthInitOptions) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(GaslessError::Network("auth widget failed to load".into()));
        }
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn sign_in(&self) -> Result<SignInData> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.sign_in_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(GaslessError::Auth("login popup closed".into()));
        }
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(SignInData {
            eoa: self.eoa.clone(),
            safes: self.safes.lock().unwrap().clone(),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.authenticated.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn user_info(&self) -> Result<UserProfile> {
        if self.fail_user_info.load(Ordering::SeqCst) {
            return Err(GaslessError::Network("profile service unavailable".into()));
        }
        Ok(self.profile.clone())
    }

    fn provider(&self) -> Result<Arc<dyn ChainProvider>> {
        Ok(self.provider.clone())
    }
}
