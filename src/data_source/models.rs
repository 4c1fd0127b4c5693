//! Core data models for ledger transactions
//!
//! Raw records coming from a ledger provider are kept loose (every field of
//! a [`Transfer`] is optional) so that a single unreadable entry can be
//! skipped without discarding the whole transaction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque ledger address. Only equality and ordering are meaningful.
pub type Address = String;

/// One `{address, value}` entry on either side of a transaction
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transfer {
    /// Recipient (outputs) or spender (inputs)
    #[serde(default)]
    pub address: Option<Address>,

    /// Amount in normalized decimal units (e.g. BTC, not satoshi)
    #[serde(default)]
    pub value: Option<f64>,
}

impl Transfer {
    pub fn new(address: impl Into<Address>, value: f64) -> Self {
        Self {
            address: Some(address.into()),
            value: Some(value),
        }
    }

    /// Address and value, if both are present and usable.
    ///
    /// Returns `None` for an empty address or a negative/non-finite value.
    pub fn resolved(&self) -> Option<(&str, f64)> {
        let address = self.address.as_deref().filter(|a| !a.is_empty())?;
        let value = self.value.filter(|v| v.is_finite() && *v >= 0.0)?;
        Some((address, value))
    }
}

/// A transaction as returned by a ledger provider. Never mutated after fetch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id (hash)
    pub id: String,

    #[serde(default)]
    pub inputs: Vec<Transfer>,

    #[serde(default)]
    pub outputs: Vec<Transfer>,
}

impl Transaction {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, address: impl Into<Address>, value: f64) -> Self {
        self.inputs.push(Transfer::new(address, value));
        self
    }

    pub fn with_output(mut self, address: impl Into<Address>, value: f64) -> Self {
        self.outputs.push(Transfer::new(address, value));
        self
    }

    /// Distinct resolvable input addresses, in lexicographic order
    pub fn input_addresses(&self) -> BTreeSet<&str> {
        self.inputs
            .iter()
            .filter_map(|input| input.resolved().map(|(address, _)| address))
            .collect()
    }

    /// Whether `address` signs one of this transaction's inputs
    pub fn has_input(&self, address: &str) -> bool {
        self.inputs
            .iter()
            .any(|input| input.address.as_deref() == Some(address))
    }

    /// Sum of resolvable output values
    pub fn total_output(&self) -> f64 {
        self.outputs
            .iter()
            .filter_map(|output| output.resolved().map(|(_, value)| value))
            .sum()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({} in / {} out)",
            self.id,
            self.inputs.len(),
            self.outputs.len()
        )
    }
}
