//! Authentication state and the ports to the auth / chain collaborators.
//!
//! Defines the `AuthProvider`, `ChainProvider` and `Signer` traits that
//! wallet-connection backends implement, and the [`SessionManager`] that owns
//! the single live [`Session`].
//! Provides in-memory implementations in [`memory`] for testing.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gasless_config::AuthInitOptions;
use gasless_types::{Address, GaslessError, Hex, Result, Wei};

pub mod manager;
pub mod memory;

pub use manager::{InitOutcome, SessionManager};

/// Profile reported by the social-login provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub profile_image: Option<String>,
}

/// Accounts returned by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInData {
    pub eoa: Address,
    pub safes: Vec<Address>,
}

/// The active user's authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub is_authenticated: bool,
    pub eoa: Option<Address>,
    /// Smart wallets in discovery order. Index 0 is the wallet of record.
    pub safes: Vec<Address>,
    pub user_profile: Option<UserProfile>,
    /// Bumped on every sign-in and sign-out.
    pub epoch: u64,
}

impl Session {
    /// The smart wallet every transfer acts on.
    pub fn primary_safe(&self) -> Option<&Address> {
        self.safes.first()
    }

    pub fn has_safe(&self) -> bool {
        !self.safes.is_empty()
    }

    pub fn require_eoa(&self) -> Result<&Address> {
        match (&self.eoa, self.is_authenticated) {
            (Some(eoa), true) => Ok(eoa),
            _ => Err(GaslessError::Precondition("not signed in".into())),
        }
    }
}

/// Produces signatures for one externally-owned account.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> &Address;

    /// Sign a 32-byte digest, returning a 65-byte `r || s || v` hex signature.
    async fn sign_hash(&self, hash: &[u8; 32]) -> Result<Hex>;
}

/// Read access to the chain plus the signer of the connected account.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;
    async fn get_balance(&self, address: &Address) -> Result<Wei>;
    async fn signer(&self) -> Result<Arc<dyn Signer>>;
}

/// The social-login wallet collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn init(&self, options: &AuthInitOptions) -> Result<()>;

    /// Whether a previous session is still valid after `init`.
    fn is_authenticated(&self) -> bool;

    async fn sign_in(&self) -> Result<SignInData>;
    async fn sign_out(&self) -> Result<()>;
    async fn user_info(&self) -> Result<UserProfile>;
    fn provider(&self) -> Result<Arc<dyn ChainProvider>>;
}

/// A signer bound to the session epoch it was issued in.
///
/// A handle from an earlier epoch is rejected by
/// [`SessionManager::ensure_fresh`].
#[derive(Clone)]
pub struct SignerHandle {
    signer: Arc<dyn Signer>,
    epoch: u64,
}

impl SignerHandle {
    pub fn new(signer: Arc<dyn Signer>, epoch: u64) -> Self {
        Self { signer, epoch }
    }

    pub fn address(&self) -> &Address {
        self.signer.address()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn signer(&self) -> Arc<dyn Signer> {
        Arc::clone(&self.signer)
    }
}

impl fmt::Debug for SignerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerHandle")
            .field("address", self.address())
            .field("epoch", &self.epoch)
            .finish()
    }
}
