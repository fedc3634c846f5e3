//! Account addresses and their display helpers.
//!
//! Equality is case-insensitive. Parsing validates EIP-55 checksums for
//! mixed-case input; all-lowercase and all-uppercase input is accepted as-is.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{GaslessError, Result};

pub const DEFAULT_PREFIX_LEN: usize = 6;
pub const DEFAULT_SUFFIX_LEN: usize = 4;

const ADDRESS_HEX_LEN: usize = 40;

/// An account address on the target chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and validate a `0x`-prefixed 20-byte address.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| GaslessError::InvalidAddress(format!("missing 0x prefix: {trimmed}")))?;

        if body.len() != ADDRESS_HEX_LEN || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GaslessError::InvalidAddress(format!(
                "expected 40 hex digits: {trimmed}"
            )));
        }

        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && checksum_body(&body.to_ascii_lowercase()) != body {
            return Err(GaslessError::InvalidAddress(format!("checksum mismatch: {trimmed}")));
        }

        Ok(Self(format!("0x{body}")))
    }

    /// Wrap user text without validation. The text is kept verbatim.
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used for comparisons.
    pub fn normalized(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Whether the text is exactly `0x` followed by 40 hex digits, with no
    /// surrounding whitespace.
    pub fn is_well_formed(&self) -> bool {
        self.0.trim() == self.0 && Self::parse(&self.0).is_ok()
    }

    /// EIP-55 mixed-case rendering.
    pub fn to_checksum(&self) -> Result<String> {
        let parsed = Self::parse(&self.0)?;
        let lower = parsed.0[2..].to_ascii_lowercase();
        Ok(format!("0x{}", checksum_body(&lower)))
    }
}

/// Apply EIP-55 casing to 40 lowercase hex digits.
fn checksum_body(lower: &str) -> String {
    let hash = Keccak256::digest(lower.as_bytes());
    lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = GaslessError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Keep `prefix_len` leading and `suffix_len` trailing characters.
///
/// Text no longer than `prefix_len + suffix_len` is returned unchanged.
pub fn truncate_address(address: &str, prefix_len: usize, suffix_len: usize) -> String {
    let len = address.chars().count();
    if len <= prefix_len + suffix_len {
        return address.to_string();
    }
    let prefix: String = address.chars().take(prefix_len).collect();
    let suffix: String = address.chars().skip(len - suffix_len).collect();
    format!("{prefix}...{suffix}")
}
