//! Native-currency amounts held in wei.
//!
//! All arithmetic happens on the integer wei value. The ether string produced
//! by [`Amount::to_ether_string`] is for display only.

use std::fmt;

use alloy_primitives::utils::{format_ether, parse_ether};
use alloy_primitives::U256;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::errors::{DashboardError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    pub fn from_wei(wei: U256) -> Self {
        Amount(wei)
    }

    pub fn wei(&self) -> U256 {
        self.0
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Parse a user-entered ether amount that must be strictly positive.
    ///
    /// Zero, negative and unparsable input is rejected before anything is
    /// sent to the chain.
    pub fn parse_positive_ether(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DashboardError::InvalidInput("amount is empty".to_string()));
        }
        if trimmed.starts_with('-') {
            return Err(DashboardError::InvalidInput(format!(
                "amount must be positive, got {trimmed}"
            )));
        }
        if !is_plain_decimal(trimmed) {
            return Err(DashboardError::InvalidInput(format!(
                "invalid amount {trimmed:?}: expected a decimal number"
            )));
        }

        let wei = parse_ether(trimmed)
            .map_err(|e| DashboardError::InvalidInput(format!("invalid amount {trimmed:?}: {e}")))?;
        if wei.is_zero() {
            return Err(DashboardError::InvalidInput(format!(
                "amount must be positive, got {trimmed}"
            )));
        }
        Ok(Amount(wei))
    }

    /// Decimal ether rendering without trailing zeros (`1.5`, `0`, `20`).
    pub fn to_ether_string(&self) -> String {
        let full = format_ether(self.0);
        match full.split_once('.') {
            Some((whole, frac)) => {
                let frac = frac.trim_end_matches('0');
                if frac.is_empty() {
                    whole.to_string()
                } else {
                    format!("{whole}.{frac}")
                }
            }
            None => full,
        }
    }
}

/// Digits with at most one decimal point, nothing else.
fn is_plain_decimal(input: &str) -> bool {
    let mut parts = input.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next().unwrap_or_default();
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    !(whole.is_empty() && frac.is_empty()) && digits(whole) && digits(frac)
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ETH", self.to_ether_string())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Amount", 2)?;
        s.serialize_field("wei", &self.0.to_string())?;
        s.serialize_field("ether", &self.to_ether_string())?;
        s.end()
    }
}
