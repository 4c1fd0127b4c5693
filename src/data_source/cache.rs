//! Caching component
//!
//! File-backed cache for ledger lookups. Entries are plain JSON files named
//! after their key and expire after a fixed TTL based on file mtime.
//! Failures are logged and treated as a miss; the cache never fails a lookup.

use crate::data_source::Transaction;
use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

/// Data Source Cache
#[derive(Debug, Clone)]
pub struct DataSourceCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl DataSourceCache {
    /// Create a new cache instance
    pub fn new(ttl: Duration, cache_dir: Option<PathBuf>) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("flow-tracer")
        });

        Self { cache_dir, ttl }
    }

    pub fn address_key(address: &str, limit: usize) -> String {
        format!("addr_{}_{}", sanitize(address), limit)
    }

    pub fn transaction_key(tx_id: &str) -> String {
        format!("tx_{}", sanitize(tx_id))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    async fn is_fresh(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path).await else {
            return false;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age < self.ttl)
    }

    async fn ensure_cache_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        Ok(())
    }

    /// Read and decode a cached value, if present and not expired
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        if !self.is_fresh(&path).await {
            return None;
        }

        match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => {
                    tracing::debug!("Cache hit for {}", key);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!("Failed to decode cache entry {}: {}", key, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Encode and store a value
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.ensure_cache_dir().await {
            tracing::warn!("Failed to create cache directory: {}", e);
            return;
        }

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = fs::write(self.path_for(key), json).await {
            tracing::warn!("Failed to write cache entry {}: {}", key, e);
        }
    }

    pub async fn get_transaction(&self, tx_id: &str) -> Option<Transaction> {
        self.get(&Self::transaction_key(tx_id)).await
    }

    pub async fn save_transaction(&self, tx: &Transaction) {
        self.put(&Self::transaction_key(&tx.id), tx).await;
    }

    pub async fn get_address_transactions(&self, address: &str, limit: usize) -> Option<Vec<String>> {
        self.get(&Self::address_key(address, limit)).await
    }

    pub async fn save_address_transactions(&self, address: &str, limit: usize, tx_ids: &[String]) {
        self.put(&Self::address_key(address, limit), &tx_ids).await;
    }
}

/// Keep keys usable as file names whatever the address encoding
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transaction_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DataSourceCache::new(Duration::from_secs(60), Some(dir.path().to_path_buf()));

        let tx = Transaction::new("abc")
            .with_input("A", 1.0)
            .with_output("B", 1.0);
        assert!(cache.get_transaction("abc").await.is_none());

        cache.save_transaction(&tx).await;
        assert_eq!(cache.get_transaction("abc").await, Some(tx));
    }

    #[tokio::test]
    async fn test_address_transactions_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DataSourceCache::new(Duration::from_secs(60), Some(dir.path().to_path_buf()));

        let ids = vec!["t1".to_string(), "t2".to_string()];
        cache.save_address_transactions("1Abc", 50, &ids).await;

        assert_eq!(cache.get_address_transactions("1Abc", 50).await, Some(ids));
        assert!(cache.get_address_transactions("1Abc", 10).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DataSourceCache::new(Duration::ZERO, Some(dir.path().to_path_buf()));

        cache.save_transaction(&Transaction::new("abc")).await;
        assert!(cache.get_transaction("abc").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DataSourceCache::new(Duration::from_secs(60), Some(dir.path().to_path_buf()));

        std::fs::write(dir.path().join("tx_abc.json"), "not json").unwrap();
        assert!(cache.get_transaction("abc").await.is_none());
    }

    #[test]
    fn test_keys_are_file_name_safe() {
        assert_eq!(DataSourceCache::address_key("bc1q/../x", 5), "addr_bc1q____x_5");
        assert_eq!(DataSourceCache::transaction_key("ab:cd"), "tx_ab_cd");
    }
}
