//! Mock data source for testing and development
//!
//! An in-memory ledger. Spending lookups scan transactions in insertion
//! order, so the order in which transactions are added is the order the
//! tracer sees them.

use super::{Address, DataSource, Transaction};
use crate::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

/// On-disk fixture layout: `{"transactions": [...]}`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerFixture {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Mock data source backed by a list of transactions
#[derive(Debug, Default)]
pub struct MockDataSource {
    transactions: Vec<Transaction>,
    unreachable: HashSet<Address>,
    lookups: Mutex<HashMap<Address, usize>>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alice pays Bob, Bob pays Charlie; each keeps the larger output as change.
    pub fn demo() -> Self {
        Self::new()
            .with_transaction(
                Transaction::new("tx1")
                    .with_input("Alice", 1.0)
                    .with_output("Bob", 0.3)
                    .with_output("Alice_Change", 0.7),
            )
            .with_transaction(
                Transaction::new("tx2")
                    .with_input("Bob", 0.3)
                    .with_output("Charlie", 0.1)
                    .with_output("Bob_Change", 0.2),
            )
    }

    /// Load a JSON ledger fixture
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading ledger fixture {}", path.display()))?;
        let fixture: LedgerFixture = serde_json::from_str(&contents)
            .map_err(|e| Error::parser(format!("ledger fixture {}: {}", path.display(), e)))?;

        tracing::debug!(
            "Loaded {} transactions from {}",
            fixture.transactions.len(),
            path.display()
        );
        Ok(Self::from_transactions(fixture.transactions))
    }

    pub fn from_transactions(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        transactions
            .into_iter()
            .fold(Self::new(), |ds, tx| ds.with_transaction(tx))
    }

    pub fn with_transaction(mut self, tx: Transaction) -> Self {
        self.transactions.push(tx);
        self
    }

    /// Make lookups for `address` fail, simulating a provider outage
    pub fn with_unreachable(mut self, address: impl Into<Address>) -> Self {
        self.unreachable.insert(address.into());
        self
    }

    /// Number of `transactions_spent_from` calls made for `address`
    pub fn lookups(&self, address: &str) -> usize {
        self.lookups
            .lock()
            .map(|counts| counts.get(address).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of `transactions_spent_from` calls
    pub fn total_lookups(&self) -> usize {
        self.lookups
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    fn record_lookup(&self, address: &str) {
        if let Ok(mut counts) = self.lookups.lock() {
            *counts.entry(address.to_string()).or_default() += 1;
        }
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn transactions_spent_from(&self, address: &str) -> Result<Vec<Transaction>> {
        self.record_lookup(address);

        if self.unreachable.contains(address) {
            return Err(Error::provider(format!(
                "mock ledger unreachable for {}",
                address
            )));
        }

        Ok(self
            .transactions
            .iter()
            .filter(|tx| tx.has_input(address))
            .cloned()
            .collect())
    }

    async fn transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        Ok(self.transactions.iter().find(|tx| tx.id == tx_id).cloned())
    }
}
