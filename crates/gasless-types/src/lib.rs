use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod address;
pub mod timeout;
pub mod units;

pub use address::{truncate_address, Address, DEFAULT_PREFIX_LEN, DEFAULT_SUFFIX_LEN};
pub use timeout::with_timeout;
pub use units::{format_ether, parse_ether, WEI_PER_ETHER};

/// 0x-prefixed hex string (e.g. "0x1234...").
pub type Hex = String;

/// Amount of native currency in wei.
pub type Wei = u128;

/// Why a relay submission did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum RelayFailure {
    #[error("relay rejected the transaction: {0}")]
    Rejected(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("estimated gas {estimated} exceeds gas limit {limit}")]
    GasLimitExceeded { estimated: u64, limit: u64 },

    #[error("relay returned status {code}: {body}")]
    Status { code: u16, body: String },
}

/// Error taxonomy shared by every gasless crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum GaslessError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("network error: {0}")]
    Network(String),

    #[error(transparent)]
    Relay(#[from] RelayFailure),

    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GaslessError {
    /// Short stable label for the error class, used in notices and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GaslessError::Auth(_) => "auth",
            GaslessError::Precondition(_) => "precondition",
            GaslessError::Network(_) => "network",
            GaslessError::Relay(_) => "relay",
            GaslessError::Timeout { .. } => "timeout",
            GaslessError::InvalidAddress(_) => "invalid_address",
            GaslessError::InvalidAmount(_) => "invalid_amount",
            GaslessError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, GaslessError>;

/// Parse a hex string to a big-endian byte array.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| GaslessError::InvalidAmount(format!("bad hex: {e}")))
}

/// Parse a 0x-prefixed hex quantity (JSON-RPC style, e.g. "0x5af3107a4000").
pub fn parse_hex_quantity(quantity: &str) -> Result<u128> {
    let digits = quantity.strip_prefix("0x").unwrap_or(quantity);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| GaslessError::InvalidAmount(format!("bad quantity {quantity}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_failure_converts_into_relay_error() {
        let err: GaslessError = RelayFailure::GasLimitExceeded { estimated: 120_000, limit: 100_000 }.into();
        assert_eq!(err.kind(), "relay");
        assert_eq!(err.to_string(), "estimated gas 120000 exceeds gas limit 100000");
    }

    #[test]
    fn timeout_is_distinct_from_network() {
        let t = GaslessError::Timeout { operation: "rpc".into(), after_ms: 5 };
        let n = GaslessError::Network("unreachable".into());
        assert_ne!(t.kind(), n.kind());
        assert_eq!(t.to_string(), "rpc timed out after 5 ms");
    }

    #[test]
    fn hex_quantity_parsing() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x5af3107a4000").unwrap(), 100_000_000_000_000);
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn hex_bytes_decoding() {
        assert_eq!(hex_to_bytes("0xdeadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(hex_to_bytes("0x").unwrap(), Vec::<u8>::new());
        assert!(hex_to_bytes("0xzz").is_err());
    }
}
