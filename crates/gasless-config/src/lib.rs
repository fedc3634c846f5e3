//! Runtime configuration: target chain, auth widget options, relay endpoint,
//! network timeouts and the default transfer.
//!
//! Loaded from JSON. The relay API key is a secret and never read from the
//! config file; it comes from the `GASLESS_RELAY_API_KEY` environment variable.

pub mod logging;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use gasless_types::{GaslessError, Result, Wei};

pub const RELAY_API_KEY_ENV: &str = "GASLESS_RELAY_API_KEY";
pub const RPC_URL_ENV: &str = "GASLESS_RPC_URL";

/// Chain the client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub display_name: String,
    pub rpc_target: String,
    pub block_explorer_url: String,
    pub ticker: String,
    pub ticker_name: String,
}

impl ChainConfig {
    /// Chain id as a 0x-prefixed hex string (e.g. `0x64`).
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Block explorer page for an address.
    pub fn explorer_address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.block_explorer_url.trim_end_matches('/'), address)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 100,
            display_name: "Gnosis".into(),
            rpc_target: "https://gnosis.drpc.org".into(),
            block_explorer_url: "https://gnosisscan.io/".into(),
            ticker: "xDAI".into(),
            ticker_name: "Gnosis Chain".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildEnv {
    Sandbox,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Options handed to the auth collaborator on init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthInitOptions {
    pub show_widget_button: bool,
    pub button_position: ButtonPosition,
    pub build_env: BuildEnv,
    pub enable_logging: bool,
    pub chain: ChainConfig,
}

impl Default for AuthInitOptions {
    fn default() -> Self {
        Self {
            show_widget_button: true,
            button_position: ButtonPosition::TopRight,
            build_env: BuildEnv::Production,
            enable_logging: true,
            chain: ChainConfig::default(),
        }
    }
}

/// Relay service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub base_url: String,
    /// Upper bound on gas for a sponsored call. Requests above it fail.
    pub gas_limit: u64,
    pub sponsored: bool,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl RelayConfig {
    /// Public status page for a relay task.
    pub fn task_status_url(&self, task_id: &str) -> String {
        format!("{}/tasks/status/{}", self.base_url.trim_end_matches('/'), task_id)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gelato.digital".into(),
            gas_limit: 100_000,
            sponsored: true,
            api_key: None,
        }
    }
}

/// Per-call deadlines for external collaborators, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub auth_ms: u64,
    pub rpc_ms: u64,
    pub relay_ms: u64,
}

impl TimeoutConfig {
    pub fn auth(&self) -> Duration {
        Duration::from_millis(self.auth_ms)
    }

    pub fn rpc(&self) -> Duration {
        Duration::from_millis(self.rpc_ms)
    }

    pub fn relay(&self) -> Duration {
        Duration::from_millis(self.relay_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            auth_ms: 60_000,
            rpc_ms: 20_000,
            relay_ms: 30_000,
        }
    }
}

/// Transfer defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Amount sent by the one-click send action (0.0001 of the native currency).
    pub default_amount_wei: Wei,
    /// Reject destinations that are not well-formed addresses.
    pub strict_destination: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            default_amount_wei: 100_000_000_000_000,
            strict_destination: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthInitOptions,
    pub relay: RelayConfig,
    pub timeouts: TimeoutConfig,
    pub transfer: TransferConfig,
}

impl AppConfig {
    pub fn chain(&self) -> &ChainConfig {
        &self.auth.chain
    }

    /// Parse config from a JSON string. Missing sections fall back to defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| GaslessError::Config(format!("failed to parse config: {e}")))
    }

    /// Load config from a JSON file, or defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            GaslessError::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&content)?;
        info!(path = %path.display(), chain_id = config.chain().chain_id, "config loaded");
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(RELAY_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.relay.api_key = Some(key);
        }
        if let Some(url) = lookup(RPC_URL_ENV).filter(|u| !u.is_empty()) {
            self.auth.chain.rpc_target = url;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let chain = self.chain();
        for (name, value) in [
            ("rpc_target", chain.rpc_target.as_str()),
            ("block_explorer_url", chain.block_explorer_url.as_str()),
            ("relay.base_url", self.relay.base_url.as_str()),
        ] {
            if !validate_url(value) {
                return Err(GaslessError::Config(format!("{name} is not an http(s) URL: {value}")));
            }
        }
        if chain.chain_id == 0 {
            return Err(GaslessError::Config("chain_id must be non-zero".into()));
        }
        if self.relay.gas_limit == 0 {
            return Err(GaslessError::Config("relay.gas_limit must be non-zero".into()));
        }
        let t = &self.timeouts;
        if t.auth_ms == 0 || t.rpc_ms == 0 || t.relay_ms == 0 {
            return Err(GaslessError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Validate that a URL is well-formed and uses HTTP or HTTPS.
pub fn validate_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host().is_some()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_target_gnosis() {
        let config = AppConfig::default();
        assert_eq!(config.chain().chain_id_hex(), "0x64");
        assert_eq!(config.chain().ticker, "xDAI");
        assert_eq!(config.relay.gas_limit, 100_000);
        assert_eq!(config.transfer.default_amount_wei, 100_000_000_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explorer_and_status_links() {
        let config = AppConfig::default();
        assert_eq!(
            config.chain().explorer_address_url("0xabc"),
            "https://gnosisscan.io/address/0xabc"
        );
        assert_eq!(
            config.relay.task_status_url("task-1"),
            "https://api.gelato.digital/tasks/status/task-1"
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = AppConfig::from_json(r#"{"relay":{"base_url":"http://localhost:9000","gas_limit":250000,"sponsored":false}}"#).unwrap();
        assert_eq!(config.relay.gas_limit, 250_000);
        assert!(!config.relay.sponsored);
        assert_eq!(config.timeouts, TimeoutConfig::default());
        assert_eq!(config.auth, AuthInitOptions::default());
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = AppConfig::from_json(r#"{"relay":{"gas_limit":250000}}"#).unwrap();
        assert_eq!(config.relay.gas_limit, 250_000);
        assert_eq!(config.relay.base_url, RelayConfig::default().base_url);
        assert!(config.relay.sponsored);

        let config = AppConfig::from_json(
            r#"{"timeouts":{"rpc_ms":5000},"auth":{"enable_logging":false,"chain":{"chain_id":10200}}}"#,
        )
        .unwrap();
        assert_eq!(config.timeouts.rpc_ms, 5_000);
        assert_eq!(config.timeouts.auth_ms, TimeoutConfig::default().auth_ms);
        assert!(!config.auth.enable_logging);
        assert_eq!(config.auth.button_position, ButtonPosition::TopRight);
        assert_eq!(config.chain().chain_id, 10_200);
        assert_eq!(config.chain().ticker, "xDAI");

        let config = AppConfig::from_json(r#"{"transfer":{"strict_destination":false}}"#).unwrap();
        assert_eq!(config.transfer.default_amount_wei, 100_000_000_000_000);
        assert!(!config.transfer.strict_destination);
    }

    #[test]
    fn api_key_never_read_from_file() {
        let config = AppConfig::from_json(r#"{"relay":{"base_url":"http://x.io","gas_limit":1,"sponsored":true,"api_key":"leak"}}"#).unwrap();
        assert!(config.relay.api_key.is_none());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("api_key"));
    }

    #[test]
    fn overrides_apply_api_key_and_rpc() {
        let config = AppConfig::default().with_overrides_from(|key| match key {
            RELAY_API_KEY_ENV => Some("secret".into()),
            RPC_URL_ENV => Some("http://127.0.0.1:8545".into()),
            _ => None,
        });
        assert_eq!(config.relay.api_key.as_deref(), Some("secret"));
        assert_eq!(config.chain().rpc_target, "http://127.0.0.1:8545");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.auth.chain.rpc_target = "ftp://example.com".into();
        assert!(matches!(config.validate(), Err(GaslessError::Config(_))));

        let mut config = AppConfig::default();
        config.relay.gas_limit = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.timeouts.rpc_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_path_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(AppConfig::load_from_path(&missing).unwrap(), AppConfig::default());

        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"transfer":{{"default_amount_wei":5,"strict_destination":false}}}}"#).unwrap();
        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.transfer.default_amount_wei, 5);
        assert!(!config.transfer.strict_destination);
    }

    #[test]
    fn load_from_path_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(AppConfig::load_from_path(&path), Err(GaslessError::Config(_))));
    }
}
