use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use gasless_config::AuthInitOptions;
use gasless_types::{with_timeout, Address, GaslessError, Result};

use crate::{AuthProvider, ChainProvider, Session, SignerHandle};

/// Result of [`SessionManager::initialize`]. Initialization never fails hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Provider ready, no previous session.
    LoggedOut,
    /// Provider reported a live session and sign-in completed.
    AutoSignedIn(Session),
    /// Provider could not be initialized; the app stays usable but logged out.
    Failed(GaslessError),
}

/// Owns the single live [`Session`].
///
/// Sign-in, sign-out and wallet registration are serialized; readers take
/// snapshots.
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    options: AuthInitOptions,
    auth_timeout: Duration,
    initialized: AtomicBool,
    session: RwLock<Session>,
    transition: Mutex<()>,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthProvider>, options: AuthInitOptions, auth_timeout: Duration) -> Self {
        Self {
            auth,
            options,
            auth_timeout,
            initialized: AtomicBool::new(false),
            session: RwLock::new(Session::default()),
            transition: Mutex::new(()),
        }
    }

    /// Connect to the auth provider and resume a previous session if one exists.
    pub async fn initialize(&self) -> InitOutcome {
        let _serial = self.transition.lock().await;

        let init = with_timeout("auth init", self.auth_timeout, self.auth.init(&self.options)).await;
        if let Err(e) = init {
            warn!(error = %e, "auth provider initialization failed");
            return InitOutcome::Failed(e);
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(chain_id = self.options.chain.chain_id, "auth provider initialized");

        if !self.auth.is_authenticated() {
            return InitOutcome::LoggedOut;
        }

        match self.establish().await {
            Ok(session) => {
                info!(eoa = ?session.eoa, safes = session.safes.len(), "resumed previous session");
                InitOutcome::AutoSignedIn(session)
            }
            Err(e) => {
                warn!(error = %e, "automatic sign-in failed");
                InitOutcome::Failed(e)
            }
        }
    }

    /// Interactive sign-in. On failure the previous session is left unchanged.
    pub async fn sign_in(&self) -> Result<Session> {
        let _serial = self.transition.lock().await;
        self.ensure_initialized()?;
        self.establish().await
    }

    /// Clear the session. Signing out while logged out is a no-op.
    pub async fn sign_out(&self) -> Result<Session> {
        let _serial = self.transition.lock().await;

        let current = self.session.read().await.clone();
        if !current.is_authenticated {
            debug!("sign-out while logged out, nothing to do");
            return Ok(current);
        }

        with_timeout("auth sign-out", self.auth_timeout, self.auth.sign_out())
            .await
            .map_err(into_auth_error)?;

        let cleared = Session {
            epoch: current.epoch + 1,
            ..Session::default()
        };
        *self.session.write().await = cleared.clone();
        info!(epoch = cleared.epoch, "signed out");
        Ok(cleared)
    }

    /// Snapshot of the live session.
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Signer for the signed-in account, bound to the current epoch.
    pub async fn signer(&self) -> Result<SignerHandle> {
        let session = self.session().await;
        let eoa = session.require_eoa()?.clone();

        let provider = self.provider()?;
        let signer = with_timeout("signer lookup", self.auth_timeout, provider.signer()).await?;
        if signer.address() != &eoa {
            return Err(GaslessError::Auth(format!(
                "provider signer {} does not match session account {}",
                signer.address(),
                eoa
            )));
        }
        Ok(SignerHandle::new(signer, session.epoch))
    }

    /// Reject signer handles issued before the latest sign-in or sign-out.
    pub async fn ensure_fresh(&self, handle: &SignerHandle) -> Result<()> {
        let session = self.session.read().await;
        if !session.is_authenticated || handle.epoch() != session.epoch {
            return Err(GaslessError::Precondition("stale signer".into()));
        }
        Ok(())
    }

    /// Append a newly created smart wallet to the session.
    pub async fn register_safe(&self, address: Address) -> Result<Session> {
        let _serial = self.transition.lock().await;
        let mut session = self.session.write().await;
        if !session.is_authenticated {
            return Err(GaslessError::Precondition("not signed in".into()));
        }
        if session.safes.contains(&address) {
            return Err(GaslessError::Precondition(format!("safe {address} already registered")));
        }
        session.safes.push(address.clone());
        info!(safe = %address, count = session.safes.len(), "safe registered");
        Ok(session.clone())
    }

    /// Chain provider handle exposed by the auth collaborator.
    pub fn provider(&self) -> Result<Arc<dyn ChainProvider>> {
        self.ensure_initialized()?;
        self.auth.provider()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GaslessError::Auth("auth provider not initialized".into()))
        }
    }

    /// Run provider sign-in and replace the session. Caller holds `transition`.
    async fn establish(&self) -> Result<Session> {
        let data = with_timeout("auth sign-in", self.auth_timeout, self.auth.sign_in())
            .await
            .map_err(into_auth_error)?;

        let user_profile = match with_timeout("user info", self.auth_timeout, self.auth.user_info()).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "could not load user profile");
                None
            }
        };

        let mut session = self.session.write().await;
        let next = Session {
            is_authenticated: true,
            eoa: Some(data.eoa),
            safes: data.safes,
            user_profile,
            epoch: session.epoch + 1,
        };
        *session = next.clone();
        info!(eoa = ?next.eoa, safes = next.safes.len(), epoch = next.epoch, "signed in");
        Ok(next)
    }
}

/// Provider failures surface as auth errors; timeouts keep their own class.
fn into_auth_error(e: GaslessError) -> GaslessError {
    match e {
        GaslessError::Auth(_) | GaslessError::Timeout { .. } => e,
        other => GaslessError::Auth(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAuthProvider;

    const EOA: &str = "0x1111111111111111111111111111111111111111";
    const SAFE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn manager(auth: Arc<MemoryAuthProvider>) -> SessionManager {
        SessionManager::new(auth, AuthInitOptions::default(), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_initialize_logged_out() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let mgr = manager(auth.clone());
        assert_eq!(mgr.initialize().await, InitOutcome::LoggedOut);
        assert!(!mgr.session().await.is_authenticated);
        assert_eq!(auth.init_calls(), 1);
    }

    #[tokio::test]
    async fn test_initialize_resumes_session() {
        let auth = Arc::new(
            MemoryAuthProvider::new(Address::new_unchecked(EOA))
                .with_safes(vec![Address::new_unchecked(SAFE)])
                .already_authenticated(),
        );
        let mgr = manager(auth.clone());
        match mgr.initialize().await {
            InitOutcome::AutoSignedIn(session) => {
                assert!(session.is_authenticated);
                assert_eq!(session.safes, vec![Address::new_unchecked(SAFE)]);
                assert_eq!(session.user_profile.unwrap().name.as_deref(), Some("Test User"));
            }
            other => panic!("expected auto sign-in, got {other:?}"),
        }
        assert_eq!(auth.sign_in_calls(), 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_soft() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        auth.fail_init(true);
        let mgr = manager(auth);
        assert!(matches!(mgr.initialize().await, InitOutcome::Failed(_)));
        assert_eq!(mgr.session().await, Session::default());
        // Not initialized: sign-in is refused rather than silently ignored.
        assert!(matches!(mgr.sign_in().await, Err(GaslessError::Auth(_))));
    }

    #[tokio::test]
    async fn test_sign_in_populates_session() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let mgr = manager(auth);
        mgr.initialize().await;
        let session = mgr.sign_in().await.unwrap();
        assert!(session.is_authenticated);
        assert_eq!(session.eoa, Some(Address::new_unchecked(EOA)));
        assert!(session.safes.is_empty());
        assert_eq!(session.epoch, 1);
    }

    #[tokio::test]
    async fn test_failed_sign_in_keeps_prior_session() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let mgr = manager(auth.clone());
        mgr.initialize().await;

        auth.fail_sign_in(true);
        assert!(matches!(mgr.sign_in().await, Err(GaslessError::Auth(_))));
        assert_eq!(mgr.session().await, Session::default());

        auth.fail_sign_in(false);
        let before = mgr.sign_in().await.unwrap();
        auth.fail_sign_in(true);
        assert!(mgr.sign_in().await.is_err());
        assert_eq!(mgr.session().await, before);
    }

    #[tokio::test]
    async fn test_profile_failure_is_tolerated() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        auth.fail_user_info(true);
        let mgr = manager(auth);
        mgr.initialize().await;
        let session = mgr.sign_in().await.unwrap();
        assert!(session.is_authenticated);
        assert!(session.user_profile.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_twice_is_idempotent() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let mgr = manager(auth.clone());
        mgr.initialize().await;
        mgr.sign_in().await.unwrap();

        let first = mgr.sign_out().await.unwrap();
        let second = mgr.sign_out().await.unwrap();
        assert_eq!(first, second);
        assert!(!first.is_authenticated);
        assert!(first.eoa.is_none());
        assert_eq!(auth.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn test_signer_goes_stale_after_sign_out() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let mgr = manager(auth);
        mgr.initialize().await;
        mgr.sign_in().await.unwrap();

        let handle = mgr.signer().await.unwrap();
        assert_eq!(handle.address(), &Address::new_unchecked(EOA));
        mgr.ensure_fresh(&handle).await.unwrap();

        mgr.sign_out().await.unwrap();
        mgr.sign_in().await.unwrap();
        assert!(matches!(
            mgr.ensure_fresh(&handle).await,
            Err(GaslessError::Precondition(_))
        ));
        let renewed = mgr.signer().await.unwrap();
        mgr.ensure_fresh(&renewed).await.unwrap();
    }

    #[tokio::test]
    async fn test_signer_requires_sign_in() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let mgr = manager(auth);
        mgr.initialize().await;
        assert!(matches!(mgr.signer().await, Err(GaslessError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_register_safe_appends_once() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let mgr = manager(auth);
        mgr.initialize().await;
        assert!(mgr.register_safe(Address::new_unchecked(SAFE)).await.is_err());

        mgr.sign_in().await.unwrap();
        let session = mgr.register_safe(Address::new_unchecked(SAFE)).await.unwrap();
        assert_eq!(session.safes, vec![Address::new_unchecked(SAFE)]);
        assert!(mgr
            .register_safe(Address::new_unchecked(&SAFE.to_ascii_uppercase().replace("0X", "0x")))
            .await
            .is_err());
        assert_eq!(mgr.session().await.safes.len(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_timeout_is_distinct() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        auth.set_sign_in_delay(Some(Duration::from_secs(5)));
        let mgr = manager(auth);
        mgr.initialize().await;
        assert!(matches!(mgr.sign_in().await, Err(GaslessError::Timeout { .. })));
        assert!(!mgr.session().await.is_authenticated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sign_ins_are_serialized() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        auth.set_sign_in_delay(Some(Duration::from_millis(20)));
        let mgr = Arc::new(manager(auth));
        mgr.initialize().await;

        let a = tokio::spawn({
            let mgr = Arc::clone(&mgr);
            async move { mgr.sign_in().await }
        });
        let b = tokio::spawn({
            let mgr = Arc::clone(&mgr);
            async move { mgr.sign_in().await }
        });
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        let mut epochs = [a.epoch, b.epoch];
        epochs.sort();
        assert_eq!(epochs, [1, 2]);
        assert_eq!(mgr.session().await.epoch, 2);
    }
}
