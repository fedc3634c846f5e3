//! Ether / wei conversion (18 decimals).

use crate::{GaslessError, Result, Wei};

pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;
const DECIMALS: usize = 18;

/// Render wei as a decimal ether string, always with a fractional part
/// (`0` → `"0.0"`, `10^14` → `"0.0001"`).
pub fn format_ether(wei: Wei) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;
    let frac = format!("{frac:0>width$}", width = DECIMALS);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac}")
    }
}

/// Parse a decimal ether string into wei. More than 18 fractional digits is an error.
pub fn parse_ether(text: &str) -> Result<Wei> {
    let text = text.trim();
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(GaslessError::InvalidAmount(format!("empty amount: {text:?}")));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(GaslessError::InvalidAmount(format!("not a decimal number: {text}")));
    }
    if frac.len() > DECIMALS {
        return Err(GaslessError::InvalidAmount(format!("too many decimals: {text}")));
    }

    let whole: Wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| GaslessError::InvalidAmount(format!("amount too large: {text}")))?
    };
    let frac: Wei = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = DECIMALS);
        padded
            .parse()
            .map_err(|_| GaslessError::InvalidAmount(format!("bad fraction: {text}")))?
    };

    whole
        .checked_mul(WEI_PER_ETHER)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| GaslessError::InvalidAmount(format!("amount too large: {text}")))
}
