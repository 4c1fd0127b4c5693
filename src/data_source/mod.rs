//! Data source module - Abstraction for fetching ledger transactions
//!
//! This module provides a trait-based abstraction over ledger providers
//! (Blockchair REST API, in-memory mock ledger). Retry and backoff policy
//! belongs to the implementations; callers only see the final outcome.

use crate::{Config, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub mod blockchair;
pub mod cache;
pub mod mock;
pub mod models;

use crate::cli::DataSourceType;
pub use models::{Address, Transaction, Transfer};

/// Ledger provider consumed by the trace engine
///
/// Implementations:
/// - `BlockchairDataSource`: Blockchair dashboards API
/// - `MockDataSource`: in-memory ledger (demo data, JSON fixtures, tests)
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Transactions in which `address` appears as an input.
    ///
    /// An address that never sent funds yields an empty vector, not an error.
    async fn transactions_spent_from(&self, address: &str) -> Result<Vec<Transaction>>;

    /// Full input/output detail for one transaction id
    async fn transaction(&self, tx_id: &str) -> Result<Option<Transaction>>;
}

/// Create a data source instance based on type and configuration
pub fn create_data_source(
    source_type: DataSourceType,
    config: &Config,
    fixture: Option<&Path>,
    cache_enabled: bool,
    cache_ttl: Duration,
) -> Result<Box<dyn DataSource>> {
    match source_type {
        DataSourceType::Mock => match fixture {
            Some(path) => {
                tracing::info!("Loading mock ledger from {:?}", path);
                Ok(Box::new(mock::MockDataSource::from_file(path)?))
            }
            None => {
                tracing::info!("Using built-in demo ledger");
                Ok(Box::new(mock::MockDataSource::demo()))
            }
        },
        DataSourceType::Blockchair => {
            let mut ds = blockchair::BlockchairDataSource::new(&config.blockchair)?;
            if let Some(key) = config.blockchair_api_key() {
                ds = ds.with_api_key(key);
            }
            if cache_enabled {
                ds = ds.with_cache(cache::DataSourceCache::new(
                    cache_ttl,
                    Some(config.cache_directory()),
                ));
            }
            Ok(Box::new(ds))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_mock_data_source_uses_demo_ledger() {
        let config = Config::default();
        let ds = create_data_source(
            DataSourceType::Mock,
            &config,
            None,
            false,
            Duration::from_secs(0),
        )
        .unwrap();

        let spent = ds.transactions_spent_from("Alice").await.unwrap();
        assert_eq!(spent.len(), 1);
        assert_eq!(spent[0].id, "tx1");
    }

    #[test]
    fn test_create_mock_data_source_missing_fixture() {
        let config = Config::default();
        let result = create_data_source(
            DataSourceType::Mock,
            &config,
            Some(Path::new("/nonexistent/ledger.json")),
            false,
            Duration::from_secs(0),
        );
        assert!(result.is_err());
    }
}
