//! Batch assembly and validation before a batch reaches the Safe.

use gasless_types::{hex_to_bytes, GaslessError, Result, Wei};

use crate::MetaTransaction;

/// Ordered list of calls executed as one Safe transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionBatch {
    calls: Vec<MetaTransaction>,
}

impl TransactionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(call: MetaTransaction) -> Self {
        Self { calls: vec![call] }
    }

    pub fn push(&mut self, call: MetaTransaction) -> &mut Self {
        self.calls.push(call);
        self
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn calls(&self) -> &[MetaTransaction] {
        &self.calls
    }

    pub fn into_calls(self) -> Vec<MetaTransaction> {
        self.calls
    }
}

impl From<Vec<MetaTransaction>> for TransactionBatch {
    fn from(calls: Vec<MetaTransaction>) -> Self {
        Self { calls }
    }
}

/// Check a batch before building a Safe transaction from it.
///
/// With `strict_addresses` every destination must be a well-formed address;
/// otherwise destinations are passed through verbatim.
pub fn validate_batch(calls: &[MetaTransaction], strict_addresses: bool) -> Result<Wei> {
    if calls.is_empty() {
        return Err(GaslessError::Precondition("empty transaction batch".into()));
    }

    let mut total: Wei = 0;
    for (i, call) in calls.iter().enumerate() {
        if strict_addresses && !call.to.is_well_formed() {
            return Err(GaslessError::InvalidAddress(format!(
                "call {i}: {}",
                call.to.as_str()
            )));
        }
        if hex_to_bytes(&call.data).is_err() {
            return Err(GaslessError::Precondition(format!("call {i}: calldata is not hex")));
        }
        total = total
            .checked_add(call.value)
            .ok_or_else(|| GaslessError::InvalidAmount("batch value overflows".into()))?;
    }
    Ok(total)
}
