//! Native-currency balances for the signed-in account and its smart wallet.
//!
//! Refreshes are read-only and safe to repeat after every state change. A
//! refresh right after a relayed transfer may not reflect it yet: the relay
//! executes out of band and nothing orders the two.

pub mod rpc_client;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use gasless_safe::SafeProtocol;
use gasless_session::{ChainProvider, Session, SessionManager};
use gasless_types::{format_ether, with_timeout, Address, Result, Wei};

pub use rpc_client::RpcChainProvider;

/// A balance observed at one point in time. Never mutated; a refresh
/// supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub owner: Address,
    pub amount_wei: Wei,
    pub fetched_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn new(owner: Address, amount_wei: Wei) -> Self {
        Self {
            owner,
            amount_wei,
            fetched_at: Utc::now(),
        }
    }

    /// Amount in ether units, e.g. `"0.0001"`.
    pub fn formatted(&self) -> String {
        format_ether(self.amount_wei)
    }
}

/// Result of a combined refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub eoa: BalanceSnapshot,
    pub safe: Option<BalanceSnapshot>,
}

/// Queries and caches balances for the session's accounts.
pub struct BalanceTracker {
    sessions: Arc<SessionManager>,
    safe: Arc<dyn SafeProtocol>,
    read_provider: Option<Arc<dyn ChainProvider>>,
    rpc_timeout: Duration,
    latest: RwLock<HashMap<Address, BalanceSnapshot>>,
    refreshes: AtomicUsize,
}

impl BalanceTracker {
    pub fn new(sessions: Arc<SessionManager>, safe: Arc<dyn SafeProtocol>, rpc_timeout: Duration) -> Self {
        Self {
            sessions,
            safe,
            read_provider: None,
            rpc_timeout,
            latest: RwLock::new(HashMap::new()),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Read balances through a dedicated provider (e.g. [`RpcChainProvider`])
    /// instead of the auth collaborator's.
    pub fn with_read_provider(mut self, provider: Arc<dyn ChainProvider>) -> Self {
        self.read_provider = Some(provider);
        self
    }

    fn provider(&self) -> Result<Arc<dyn ChainProvider>> {
        match &self.read_provider {
            Some(p) => Ok(Arc::clone(p)),
            None => self.sessions.provider(),
        }
    }

    /// Balance of the externally-owned account.
    pub async fn refresh_eoa_balance(&self, session: &Session) -> Result<BalanceSnapshot> {
        let eoa = session.require_eoa()?;
        let provider = self.provider()?;
        let amount = with_timeout("eoa balance", self.rpc_timeout, provider.get_balance(eoa)).await?;
        Ok(self.record(BalanceSnapshot::new(eoa.clone(), amount)).await)
    }

    /// Balance of the first smart wallet, or `None` when there is none yet.
    pub async fn refresh_safe_balance(&self, session: &Session) -> Result<Option<BalanceSnapshot>> {
        match session.primary_safe() {
            Some(safe) => self.refresh_balance_of(safe).await.map(Some),
            None => Ok(None),
        }
    }

    /// Balance of any Safe, read through the Safe protocol.
    pub async fn refresh_balance_of(&self, safe: &Address) -> Result<BalanceSnapshot> {
        let provider = self.provider()?;
        let amount = with_timeout("safe balance", self.rpc_timeout, async {
            let handle = self.safe.connect(provider, safe).await?;
            handle.get_balance().await
        })
        .await?;
        Ok(self.record(BalanceSnapshot::new(safe.clone(), amount)).await)
    }

    /// Refresh the account and smart-wallet balances together.
    pub async fn refresh_all(&self, session: &Session) -> Result<Balances> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let eoa = self.refresh_eoa_balance(session).await;
        let safe = self.refresh_safe_balance(session).await;
        match (eoa, safe) {
            (Ok(eoa), Ok(safe)) => Ok(Balances { eoa, safe }),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "balance refresh failed");
                Err(e)
            }
        }
    }

    /// Latest cached snapshot for an owner.
    pub async fn latest(&self, owner: &Address) -> Option<BalanceSnapshot> {
        self.latest.read().await.get(owner).cloned()
    }

    /// Number of combined refreshes performed so far.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Drop every cached snapshot (after sign-out).
    pub async fn clear(&self) {
        self.latest.write().await.clear();
    }

    async fn record(&self, snapshot: BalanceSnapshot) -> BalanceSnapshot {
        debug!(owner = %snapshot.owner, wei = %snapshot.amount_wei, "balance refreshed");
        self.latest
            .write()
            .await
            .insert(snapshot.owner.clone(), snapshot.clone());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasless_config::AuthInitOptions;
    use gasless_safe::memory::MemorySafeProtocol;
    use gasless_session::memory::MemoryAuthProvider;
    use gasless_types::GaslessError;

    const EOA: &str = "0x1111111111111111111111111111111111111111";
    const SAFE_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const SAFE_B: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    struct Fixture {
        auth: Arc<MemoryAuthProvider>,
        sessions: Arc<SessionManager>,
        tracker: BalanceTracker,
    }

    async fn fixture(safes: Vec<&str>) -> Fixture {
        let auth = Arc::new(
            MemoryAuthProvider::new(Address::new_unchecked(EOA))
                .with_safes(safes.into_iter().map(Address::new_unchecked).collect()),
        );
        let sessions = Arc::new(SessionManager::new(
            auth.clone(),
            AuthInitOptions::default(),
            Duration::from_secs(1),
        ));
        sessions.initialize().await;
        let tracker = BalanceTracker::new(
            sessions.clone(),
            Arc::new(MemorySafeProtocol::new(100)),
            Duration::from_secs(1),
        );
        Fixture { auth, sessions, tracker }
    }

    #[tokio::test]
    async fn test_no_safe_returns_none() {
        let f = fixture(vec![]).await;
        let session = f.sessions.sign_in().await.unwrap();
        assert_eq!(f.tracker.refresh_safe_balance(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_safe_balance_uses_first_wallet() {
        let f = fixture(vec![SAFE_A, SAFE_B]).await;
        let chain = f.auth.chain();
        chain.set_balance(&Address::new_unchecked(SAFE_A), 5);
        chain.set_balance(&Address::new_unchecked(SAFE_B), 9);

        let session = f.sessions.sign_in().await.unwrap();
        let snap = f.tracker.refresh_safe_balance(&session).await.unwrap().unwrap();
        assert_eq!(snap.owner, Address::new_unchecked(SAFE_A));
        assert_eq!(snap.amount_wei, 5);
        assert_eq!(chain.balance_queries(), vec![Address::new_unchecked(SAFE_A)]);
    }

    #[tokio::test]
    async fn test_refresh_all_and_cache() {
        let f = fixture(vec![SAFE_A]).await;
        let chain = f.auth.chain();
        chain.set_balance(&Address::new_unchecked(EOA), 100_000_000_000_000);

        let session = f.sessions.sign_in().await.unwrap();
        let balances = f.tracker.refresh_all(&session).await.unwrap();
        assert_eq!(balances.eoa.formatted(), "0.0001");
        assert_eq!(balances.safe.unwrap().formatted(), "0.0");
        assert_eq!(f.tracker.refresh_count(), 1);

        let cached = f.tracker.latest(&Address::new_unchecked(EOA)).await.unwrap();
        assert_eq!(cached.amount_wei, 100_000_000_000_000);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let f = fixture(vec![]).await;
        f.auth.chain().set_balance(&Address::new_unchecked(EOA), 42);
        let session = f.sessions.sign_in().await.unwrap();
        let a = f.tracker.refresh_eoa_balance(&session).await.unwrap();
        let b = f.tracker.refresh_eoa_balance(&session).await.unwrap();
        assert_eq!(a.amount_wei, b.amount_wei);
        assert!(b.fetched_at >= a.fetched_at);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let f = fixture(vec![]).await;
        let chain = f.auth.chain();
        chain.set_balance(&Address::new_unchecked(EOA), 7);
        let session = f.sessions.sign_in().await.unwrap();
        f.tracker.refresh_eoa_balance(&session).await.unwrap();

        chain.set_unreachable(true);
        let err = f.tracker.refresh_eoa_balance(&session).await.unwrap_err();
        assert!(matches!(err, GaslessError::Network(_)));
        assert_eq!(f.tracker.latest(&Address::new_unchecked(EOA)).await.unwrap().amount_wei, 7);
    }

    #[tokio::test]
    async fn test_logged_out_session_is_precondition() {
        let f = fixture(vec![]).await;
        let err = f.tracker.refresh_eoa_balance(&Session::default()).await.unwrap_err();
        assert!(matches!(err, GaslessError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_clear_drops_cache() {
        let f = fixture(vec![]).await;
        let session = f.sessions.sign_in().await.unwrap();
        f.tracker.refresh_eoa_balance(&session).await.unwrap();
        f.tracker.clear().await;
        assert!(f.tracker.latest(&Address::new_unchecked(EOA)).await.is_none());
    }
}
