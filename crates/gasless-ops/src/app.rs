//! User-facing action boundary.
//!
//! Every intent claims its in-flight guard, runs, and turns the result into a
//! [`Notice`]. No error escapes an intent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use gasless_balance::{BalanceSnapshot, BalanceTracker};
use gasless_config::logging::{init_logging, DEFAULT_FILTER};
use gasless_config::AppConfig;
use gasless_relay::RelayKit;
use gasless_safe::{SafeAccountConfig, SafeProtocol};
use gasless_session::{AuthProvider, ChainProvider, InitOutcome, Session, SessionManager, UserProfile};
use gasless_types::{with_timeout, Address, GaslessError, Result, Wei};

use crate::guard::{ActionGuards, ActionKind};
use crate::{RelayOutcome, RelayedTransferOrchestrator, TransferRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-visible message produced by an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Notices kept in [`AppState`]; older ones are dropped first.
pub const MAX_NOTICES: usize = 50;

/// Callback invoked for every notice as it is raised.
pub type NoticeHandler = Box<dyn Fn(&Notice) + Send + Sync>;

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    pub is_authenticated: bool,
    pub user_profile: Option<UserProfile>,
    pub eoa: Option<Address>,
    pub eoa_balance: Option<BalanceSnapshot>,
    pub safe_balance: Option<BalanceSnapshot>,
    pub wallet_addresses: Vec<Address>,
    /// Raw destination text as last entered.
    pub destination: String,
    pub last_outcome: Option<RelayOutcome>,
    /// Most recent last, at most [`MAX_NOTICES`].
    pub notices: Vec<Notice>,
}

/// External collaborators the app is wired to.
pub struct Collaborators {
    pub auth: Arc<dyn AuthProvider>,
    pub safe: Arc<dyn SafeProtocol>,
    pub relay: Arc<dyn RelayKit>,
    /// Dedicated balance reader; the auth provider's chain handle otherwise.
    pub read_provider: Option<Arc<dyn ChainProvider>>,
}

pub struct GaslessApp {
    config: AppConfig,
    sessions: Arc<SessionManager>,
    safe: Arc<dyn SafeProtocol>,
    balances: Arc<BalanceTracker>,
    orchestrator: RelayedTransferOrchestrator,
    guards: ActionGuards,
    state: RwLock<AppState>,
    on_notice: Option<NoticeHandler>,
}

impl GaslessApp {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Self {
        let Collaborators { auth, safe, relay, read_provider } = collaborators;

        let sessions = Arc::new(SessionManager::new(auth, config.auth.clone(), config.timeouts.auth()));
        let mut tracker = BalanceTracker::new(Arc::clone(&sessions), Arc::clone(&safe), config.timeouts.rpc());
        if let Some(provider) = read_provider {
            tracker = tracker.with_read_provider(provider);
        }
        let balances = Arc::new(tracker);
        let orchestrator = RelayedTransferOrchestrator::new(
            Arc::clone(&sessions),
            Arc::clone(&safe),
            relay,
            Arc::clone(&balances),
            &config,
        );

        Self {
            config,
            sessions,
            safe,
            balances,
            orchestrator,
            guards: ActionGuards::new(),
            state: RwLock::new(AppState::default()),
            on_notice: None,
        }
    }

    pub fn with_notice_handler(mut self, handler: NoticeHandler) -> Self {
        self.on_notice = Some(handler);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn balances(&self) -> &BalanceTracker {
        &self.balances
    }

    pub fn orchestrator(&self) -> &RelayedTransferOrchestrator {
        &self.orchestrator
    }

    pub async fn state(&self) -> AppState {
        self.state.read().await.clone()
    }

    /// Start logging (if enabled) and the auth provider, resuming a previous
    /// session when the provider still has one.
    pub async fn initialize(&self) -> InitOutcome {
        init_logging(self.config.auth.enable_logging, DEFAULT_FILTER);

        let outcome = self.sessions.initialize().await;
        match &outcome {
            InitOutcome::LoggedOut => {}
            InitOutcome::AutoSignedIn(session) => {
                self.apply_session(session).await;
                self.refresh_balances(session).await;
                self.notify(Notice::success("Initialization and auto-login successful!")).await;
            }
            InitOutcome::Failed(e) => {
                error!(error = %e, "initialization failed");
                self.notify(Notice::error("Failed to initialize the auth provider, try again!")).await;
            }
        }
        outcome
    }

    pub async fn login(&self) {
        let _in_flight = match self.guards.try_begin(ActionKind::Auth) {
            Ok(g) => g,
            Err(e) => return self.reject(e).await,
        };
        match self.sessions.sign_in().await {
            Ok(session) => {
                self.apply_session(&session).await;
                self.refresh_balances(&session).await;
                self.notify(Notice::success("Logged in successfully!")).await;
            }
            Err(e) => {
                error!(error = %e, "login failed");
                self.notify(Notice::error("An error occurred during login or logout.")).await;
            }
        }
    }

    pub async fn logout(&self) {
        let _in_flight = match self.guards.try_begin(ActionKind::Auth) {
            Ok(g) => g,
            Err(e) => return self.reject(e).await,
        };
        match self.sessions.sign_out().await {
            Ok(session) => {
                self.balances.clear().await;
                self.apply_session(&session).await;
                self.notify(Notice::success("Logged out successfully!")).await;
            }
            Err(e) => {
                error!(error = %e, "logout failed");
                self.notify(Notice::error("An error occurred during login or logout.")).await;
            }
        }
    }

    /// The single login/logout toggle.
    pub async fn login_or_out(&self) {
        if self.sessions.session().await.is_authenticated {
            self.logout().await
        } else {
            self.login().await
        }
    }

    /// Deploy a single-owner Safe for the signed-in account and register it.
    pub async fn create_wallet(&self) -> Option<Address> {
        let _in_flight = match self.guards.try_begin(ActionKind::CreateWallet) {
            Ok(g) => g,
            Err(e) => {
                self.reject(e).await;
                return None;
            }
        };

        let session = self.sessions.session().await;
        let eoa = match session.require_eoa() {
            Ok(eoa) => eoa.clone(),
            Err(_) => {
                self.notify(Notice::error("No EOA available to create a Safe.")).await;
                return None;
            }
        };

        match self.deploy_wallet(&session, eoa).await {
            Ok(address) => {
                self.notify(Notice::success(format!(
                    "Safe created successfully! Safe address: {address}"
                )))
                .await;
                Some(address)
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "safe creation failed");
                self.notify(Notice::error("Couldn't create a Safe account. Please try again.")).await;
                None
            }
        }
    }

    async fn deploy_wallet(&self, session: &Session, eoa: Address) -> Result<Address> {
        if session.has_safe() {
            return Err(GaslessError::Precondition("a smart wallet already exists".into()));
        }
        let handle = self.sessions.signer().await?;
        let provider = self.sessions.provider()?;
        let account = SafeAccountConfig::single_owner(eoa);

        let address = with_timeout(
            "safe deploy",
            self.config.timeouts.relay(),
            self.safe.deploy(provider, handle.signer(), &account),
        )
        .await?;
        info!(safe = %address, explorer = %self.orchestrator.explorer_address_url(&address), "safe created");

        let updated = self.sessions.register_safe(address.clone()).await?;
        self.apply_session(&updated).await;

        match self.balances.refresh_balance_of(&address).await {
            Ok(snapshot) => self.state.write().await.safe_balance = Some(snapshot),
            Err(e) => warn!(safe = %address, error = %e, "new safe balance unavailable"),
        }
        Ok(address)
    }

    /// Store destination text exactly as entered.
    pub async fn set_destination(&self, text: &str) {
        self.state.write().await.destination = text.to_string();
    }

    /// Send the configured default amount to the current destination.
    pub async fn send(&self) -> RelayOutcome {
        self.send_amount(self.config.transfer.default_amount_wei).await
    }

    pub async fn send_amount(&self, amount_wei: Wei) -> RelayOutcome {
        let _in_flight = match self.guards.try_begin(ActionKind::Send) {
            Ok(g) => g,
            Err(reason) => {
                self.reject(reason.clone()).await;
                return RelayOutcome::Failed { reason };
            }
        };

        let session = self.sessions.session().await;
        let destination = self.state.read().await.destination.clone();
        let request = TransferRequest::new(Address::new_unchecked(destination), amount_wei);

        let outcome = self.orchestrator.submit(&session, &request).await;
        match &outcome {
            RelayOutcome::Submitted { task_id } => {
                self.sync_balances(&session).await;
                self.notify(Notice::success("Successfully sent transaction")).await;
                self.notify(Notice::success(format!(
                    "Track the relay task: {}",
                    self.orchestrator.task_status_url(task_id)
                )))
                .await;
            }
            RelayOutcome::Failed { reason } => {
                self.notify(Notice::error(format!("Unable to send transaction: {reason}"))).await;
            }
        }
        self.state.write().await.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn apply_session(&self, session: &Session) {
        let mut state = self.state.write().await;
        state.is_authenticated = session.is_authenticated;
        state.user_profile = session.user_profile.clone();
        state.eoa = session.eoa.clone();
        state.wallet_addresses = session.safes.clone();
        if !session.is_authenticated {
            state.eoa_balance = None;
            state.safe_balance = None;
            state.last_outcome = None;
        }
    }

    async fn refresh_balances(&self, session: &Session) {
        if let Err(e) = self.balances.refresh_all(session).await {
            warn!(error = %e, "balance refresh failed");
        }
        self.sync_balances(session).await;
    }

    /// Copy the tracker's latest snapshots into the rendered state.
    async fn sync_balances(&self, session: &Session) {
        let eoa_balance = match &session.eoa {
            Some(eoa) => self.balances.latest(eoa).await,
            None => None,
        };
        let safe_balance = match session.primary_safe() {
            Some(safe) => self.balances.latest(safe).await,
            None => None,
        };
        let mut state = self.state.write().await;
        state.eoa_balance = eoa_balance;
        state.safe_balance = safe_balance;
    }

    async fn reject(&self, e: GaslessError) {
        warn!(error = %e, "action rejected");
        self.notify(Notice::error(e.to_string())).await;
    }

    async fn notify(&self, notice: Notice) {
        if let Some(handler) = &self.on_notice {
            handler(&notice);
        }
        let mut state = self.state.write().await;
        state.notices.push(notice);
        if state.notices.len() > MAX_NOTICES {
            let excess = state.notices.len() - MAX_NOTICES;
            state.notices.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use gasless_relay::memory::MemoryRelay;
    use gasless_safe::memory::MemorySafeProtocol;
    use gasless_session::memory::MemoryAuthProvider;

    const EOA: &str = "0x1111111111111111111111111111111111111111";
    const SAFE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn app_with(auth: Arc<MemoryAuthProvider>, safe: Arc<MemorySafeProtocol>) -> GaslessApp {
        let mut config = AppConfig::default();
        config.auth.enable_logging = false;
        GaslessApp::new(
            config,
            Collaborators {
                auth,
                safe,
                relay: Arc::new(MemoryRelay::new()),
                read_provider: None,
            },
        )
    }

    fn last_notice(state: &AppState) -> &Notice {
        state.notices.last().expect("a notice")
    }

    #[tokio::test]
    async fn test_login_or_out_toggles() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        let app = app_with(auth.clone(), Arc::new(MemorySafeProtocol::new(100)));
        assert_eq!(app.initialize().await, InitOutcome::LoggedOut);

        app.login_or_out().await;
        let state = app.state().await;
        assert!(state.is_authenticated);
        assert_eq!(state.eoa, Some(Address::new_unchecked(EOA)));
        assert_eq!(state.user_profile.as_ref().and_then(|p| p.name.as_deref()), Some("Test User"));
        assert!(state.eoa_balance.is_some());
        assert_eq!(last_notice(&state).level, NoticeLevel::Success);

        app.login_or_out().await;
        let state = app.state().await;
        assert!(!state.is_authenticated);
        assert!(state.eoa_balance.is_none());
        assert_eq!(auth.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_sign_in_on_initialize() {
        let auth = Arc::new(
            MemoryAuthProvider::new(Address::new_unchecked(EOA))
                .with_safes(vec![Address::new_unchecked(SAFE)])
                .already_authenticated(),
        );
        let app = app_with(auth, Arc::new(MemorySafeProtocol::new(100)));
        assert!(matches!(app.initialize().await, InitOutcome::AutoSignedIn(_)));
        let state = app.state().await;
        assert_eq!(state.wallet_addresses, vec![Address::new_unchecked(SAFE)]);
        assert!(state.safe_balance.is_some());
    }

    #[tokio::test]
    async fn test_failed_init_becomes_error_notice() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        auth.fail_init(true);
        let app = app_with(auth, Arc::new(MemorySafeProtocol::new(100)));
        assert!(matches!(app.initialize().await, InitOutcome::Failed(_)));
        let state = app.state().await;
        assert!(!state.is_authenticated);
        assert_eq!(last_notice(&state).level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_login_failure_is_caught() {
        let auth = Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA)));
        auth.fail_sign_in(true);
        let app = app_with(auth, Arc::new(MemorySafeProtocol::new(100)));
        app.initialize().await;
        app.login().await;
        let state = app.state().await;
        assert!(!state.is_authenticated);
        assert_eq!(last_notice(&state).message, "An error occurred during login or logout.");
    }

    #[tokio::test]
    async fn test_create_wallet_requires_eoa() {
        let safe = Arc::new(MemorySafeProtocol::new(100));
        let app = app_with(
            Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA))),
            safe.clone(),
        );
        app.initialize().await;
        assert_eq!(app.create_wallet().await, None);
        assert_eq!(safe.deploy_calls(), 0);
        assert_eq!(last_notice(&app.state().await).level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_create_wallet_deploys_single_owner_safe() {
        let safe = Arc::new(MemorySafeProtocol::new(100));
        safe.queue_deploy_address(Address::new_unchecked(SAFE));
        let app = app_with(
            Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA))),
            safe.clone(),
        );
        app.initialize().await;
        app.login().await;

        assert_eq!(app.create_wallet().await, Some(Address::new_unchecked(SAFE)));
        let deployed = safe.deployed();
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].1, SafeAccountConfig::single_owner(Address::new_unchecked(EOA)));

        let state = app.state().await;
        assert_eq!(state.wallet_addresses, vec![Address::new_unchecked(SAFE)]);
        assert_eq!(state.safe_balance.as_ref().map(|b| b.owner.clone()), Some(Address::new_unchecked(SAFE)));

        // Second wallet is refused without touching the protocol.
        assert_eq!(app.create_wallet().await, None);
        assert_eq!(safe.deploy_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_deploy_leaves_session_unchanged() {
        let safe = Arc::new(MemorySafeProtocol::new(100));
        safe.fail_deploy(true);
        let app = app_with(
            Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA))),
            safe,
        );
        app.initialize().await;
        app.login().await;
        assert_eq!(app.create_wallet().await, None);
        assert!(app.sessions().session().await.safes.is_empty());
        assert_eq!(
            last_notice(&app.state().await).message,
            "Couldn't create a Safe account. Please try again."
        );
    }

    #[tokio::test]
    async fn test_destination_kept_verbatim() {
        let app = app_with(
            Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA))),
            Arc::new(MemorySafeProtocol::new(100)),
        );
        app.set_destination("  0xBBBB  ").await;
        assert_eq!(app.state().await.destination, "  0xBBBB  ");
    }

    #[tokio::test]
    async fn test_notice_handler_sees_every_notice() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let app = app_with(
            Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA))),
            Arc::new(MemorySafeProtocol::new(100)),
        )
        .with_notice_handler(Box::new(move |n| sink.lock().unwrap().push(n.clone())));

        app.initialize().await;
        app.login().await;
        app.send().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, app.state().await.notices);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_notices_capped_oldest_dropped() {
        let raised = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&raised);
        let app = app_with(
            Arc::new(MemoryAuthProvider::new(Address::new_unchecked(EOA))),
            Arc::new(MemorySafeProtocol::new(100)),
        )
        .with_notice_handler(Box::new(move |_| *counter.lock().unwrap() += 1));

        app.initialize().await;
        app.login().await;
        app.logout().await;
        assert!(app.state().await.notices.iter().any(|n| n.level == NoticeLevel::Success));

        for _ in 0..MAX_NOTICES {
            app.send().await;
        }
        let state = app.state().await;
        assert_eq!(state.notices.len(), MAX_NOTICES);
        assert!(state.notices.iter().all(|n| n.level == NoticeLevel::Error));
        assert!(*raised.lock().unwrap() > MAX_NOTICES);
    }
}
