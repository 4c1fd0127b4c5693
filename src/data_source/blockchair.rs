//! Blockchair API data source implementation
//!
//! Resolves spending transactions through the Blockchair dashboards API:
//! one address dashboard request for the transaction ids, then one
//! transaction dashboard request per id. Requests are issued one at a time.

use super::{DataSource, Transaction, Transfer};
use crate::config::BlockchairConfig;
use crate::data_source::cache::DataSourceCache;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Blockchair answers 430 once a client has been soft-banned for hammering it
const STATUS_BLOCKCHAIR_BANNED: u16 = 430;

/// Blockchair API client with retry logic
#[derive(Debug, Clone)]
pub struct BlockchairDataSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
    max_backoff: Duration,
    address_tx_limit: usize,
    transactions_per_address: usize,
    unit_divisor: f64,
    cache: Option<Arc<DataSourceCache>>,
}

impl BlockchairDataSource {
    /// Create a new Blockchair data source
    pub fn new(config: &BlockchairConfig) -> Result<Self> {
        crate::ensure!(
            !config.base_url.trim().is_empty(),
            "Blockchair base_url must not be empty"
        );
        crate::ensure!(config.unit_divisor > 0.0, "unit_divisor must be positive");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            address_tx_limit: config.address_tx_limit,
            transactions_per_address: config.transactions_per_address,
            unit_divisor: config.unit_divisor,
            cache: None,
        })
    }

    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn with_cache(mut self, cache: DataSourceCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}", self.base_url, path);
        let mut params: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        if let Some(key) = &self.api_key {
            params.push(format!("key={}", key));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    /// Delay before retry `attempt` (1-based): exponential, capped, plus jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.retry_delay.saturating_mul(factor).min(self.max_backoff);
        base + Duration::from_millis(rand::random::<u64>() % 1000)
    }

    /// GET a JSON document with retry logic
    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                tracing::debug!("Retrying after {:?} (attempt {})", delay, attempt);
                sleep(delay).await;
            }

            match self.try_get_json(url).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    tracing::warn!("Blockchair request failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::provider(format!(
            "failed after {} attempts: {}",
            self.max_retries + 1,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn try_get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        match status {
            StatusCode::PAYMENT_REQUIRED => Err(Error::RateLimitExceeded),
            StatusCode::TOO_MANY_REQUESTS => Err(Error::provider("HTTP 429 Too Many Requests")),
            s if s.as_u16() == STATUS_BLOCKCHAIR_BANNED => {
                Err(Error::provider("HTTP 430 temporarily banned"))
            }
            s if s.is_server_error() => Err(Error::provider(format!("HTTP {}", s))),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::custom(format!("Blockchair rejected request: HTTP {}: {}", s, body)))
            }
        }
    }

    /// Ids of transactions touching `address`, newest first
    async fn address_transaction_ids(&self, address: &str) -> Result<Vec<String>> {
        if let Some(cache) = &self.cache
            && let Some(ids) = cache
                .get_address_transactions(address, self.address_tx_limit)
                .await
        {
            return Ok(ids);
        }

        tracing::debug!("Fetching address dashboard for {}", address);
        let url = self.endpoint(
            &format!("dashboards/address/{}", address),
            &[("limit", self.address_tx_limit.to_string())],
        );
        let body = self.get_json(&url).await?;
        let ids = parse_address_dashboard(address, &body);

        if let Some(cache) = &self.cache {
            cache
                .save_address_transactions(address, self.address_tx_limit, &ids)
                .await;
        }
        Ok(ids)
    }

    async fn fetch_transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        if let Some(cache) = &self.cache
            && let Some(tx) = cache.get_transaction(tx_id).await
        {
            return Ok(Some(tx));
        }

        tracing::debug!("Fetching transaction {} from Blockchair", tx_id);
        let url = self.endpoint(&format!("dashboards/transaction/{}", tx_id), &[]);
        let body = self.get_json(&url).await?;
        let tx = parse_transaction_dashboard(tx_id, &body, self.unit_divisor)?;

        if let (Some(cache), Some(tx)) = (&self.cache, &tx) {
            cache.save_transaction(tx).await;
        }
        Ok(tx)
    }
}

/// Extract `data.{address}.transactions` from an address dashboard.
///
/// Blockchair returns `"data": []` for addresses it has never seen.
pub fn parse_address_dashboard(address: &str, body: &Value) -> Vec<String> {
    body.get("data")
        .and_then(|data| data.get(address))
        .and_then(|entry| entry.get("transactions"))
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Map `data.{tx_id}` of a transaction dashboard to a [`Transaction`].
///
/// Returns `Ok(None)` when the id is unknown. Individual inputs/outputs
/// lacking `recipient` or `value` are kept with empty fields.
pub fn parse_transaction_dashboard(
    tx_id: &str,
    body: &Value,
    unit_divisor: f64,
) -> Result<Option<Transaction>> {
    let Some(entry) = body.get("data").and_then(|data| data.get(tx_id)) else {
        return Ok(None);
    };

    let side = |name: &str| -> Result<Vec<Transfer>> {
        let items = entry
            .get(name)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::malformed(format!("{} has no {} array", tx_id, name)))?;
        Ok(items.iter().map(|item| parse_transfer(item, unit_divisor)).collect())
    };

    Ok(Some(Transaction {
        id: tx_id.to_string(),
        inputs: side("inputs")?,
        outputs: side("outputs")?,
    }))
}

fn parse_transfer(item: &Value, unit_divisor: f64) -> Transfer {
    Transfer {
        address: item
            .get("recipient")
            .and_then(Value::as_str)
            .map(str::to_string),
        value: item
            .get("value")
            .and_then(Value::as_f64)
            .map(|base_units| base_units / unit_divisor),
    }
}

#[async_trait]
impl DataSource for BlockchairDataSource {
    async fn transactions_spent_from(&self, address: &str) -> Result<Vec<Transaction>> {
        let ids = self.address_transaction_ids(address).await?;
        tracing::info!(
            "Found {} transaction references for {}, resolving up to {}",
            ids.len(),
            address,
            self.transactions_per_address
        );

        let mut spent = Vec::new();
        let mut fetched = 0usize;
        let mut last_error = None;
        for tx_id in ids.iter().take(self.transactions_per_address) {
            match self.fetch_transaction(tx_id).await {
                Ok(Some(tx)) => {
                    fetched += 1;
                    if tx.has_input(address) {
                        spent.push(tx);
                    } else {
                        tracing::debug!("{} only pays {}, skipping", tx_id, address);
                    }
                }
                Ok(None) => {
                    fetched += 1;
                    tracing::warn!("Transaction {} not found", tx_id);
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch transaction {}: {}", tx_id, e);
                    last_error = Some(e);
                }
            }
        }

        // Nothing resolved at all: report the outage rather than an empty history
        if fetched == 0
            && let Some(e) = last_error
        {
            return Err(Error::provider(format!(
                "no transaction of {} could be fetched: {}",
                address, e
            )));
        }

        Ok(spent)
    }

    async fn transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        self.fetch_transaction(tx_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> BlockchairConfig {
        BlockchairConfig::default()
    }

    #[test]
    fn test_parse_address_dashboard() {
        let body = json!({
            "data": {
                "1Abc": {
                    "address": { "balance": 0 },
                    "transactions": ["t2", "t1"],
                    "utxo": []
                }
            }
        });
        assert_eq!(parse_address_dashboard("1Abc", &body), vec!["t2", "t1"]);
        assert!(parse_address_dashboard("1Other", &body).is_empty());
    }

    #[test]
    fn test_parse_address_dashboard_empty_data_array() {
        let body = json!({ "data": [], "context": { "code": 200 } });
        assert!(parse_address_dashboard("1Abc", &body).is_empty());
    }

    #[test]
    fn test_parse_transaction_dashboard() {
        let body = json!({
            "data": {
                "t1": {
                    "transaction": { "hash": "t1" },
                    "inputs": [{ "recipient": "1Abc", "value": 100_000_000 }],
                    "outputs": [
                        { "recipient": "1Def", "value": 30_000_000 },
                        { "recipient": "1Abc", "value": 69_990_000 },
                        { "type": "nulldata", "value": 0 }
                    ]
                }
            }
        });

        let tx = parse_transaction_dashboard("t1", &body, 1e8).unwrap().unwrap();
        assert_eq!(tx.inputs[0].resolved(), Some(("1Abc", 1.0)));
        assert_eq!(tx.outputs[0].resolved(), Some(("1Def", 0.3)));
        assert_eq!(tx.outputs.len(), 3);
        assert_eq!(tx.outputs[2].resolved(), None);
    }

    #[test]
    fn test_parse_transaction_dashboard_unknown_id() {
        let body = json!({ "data": {} });
        assert!(parse_transaction_dashboard("t1", &body, 1e8).unwrap().is_none());
    }

    #[test]
    fn test_parse_transaction_dashboard_missing_outputs() {
        let body = json!({ "data": { "t1": { "inputs": [] } } });
        let err = parse_transaction_dashboard("t1", &body, 1e8).unwrap_err();
        assert!(matches!(err, Error::MalformedTransaction(_)));
    }

    #[test]
    fn test_endpoint_includes_api_key() {
        let ds = BlockchairDataSource::new(&config())
            .unwrap()
            .with_api_key("secret".to_string());
        assert_eq!(
            ds.endpoint("dashboards/address/1Abc", &[("limit", "50".to_string())]),
            "https://api.blockchair.com/bitcoin/dashboards/address/1Abc?limit=50&key=secret"
        );
        assert_eq!(
            ds.endpoint("dashboards/transaction/t1", &[]),
            "https://api.blockchair.com/bitcoin/dashboards/transaction/t1?key=secret"
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut cfg = config();
        cfg.retry_delay_ms = 1_000;
        cfg.max_backoff_ms = 3_000;
        let ds = BlockchairDataSource::new(&cfg).unwrap();

        let first = ds.backoff(1);
        assert!(first >= Duration::from_millis(1_000) && first < Duration::from_millis(2_000));
        let capped = ds.backoff(10);
        assert!(capped >= Duration::from_millis(3_000) && capped < Duration::from_millis(4_000));
    }

    #[test]
    fn test_rejects_empty_base_url() {
        let mut cfg = config();
        cfg.base_url = "  ".to_string();
        assert!(BlockchairDataSource::new(&cfg).is_err());
    }

    /// Blockchair source pointed at a closed local port, with ids for
    /// `1Abc` cached and only `cached_tx` resolvable from the cache
    async fn offline_source(
        dir: &std::path::Path,
        ids: &[&str],
        cached_tx: Option<Transaction>,
    ) -> BlockchairDataSource {
        let cache = DataSourceCache::new(Duration::from_secs(60), Some(dir.to_path_buf()));
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        cache.save_address_transactions("1Abc", 50, &ids).await;
        if let Some(tx) = cached_tx {
            cache.save_transaction(&tx).await;
        }

        let mut cfg = config();
        cfg.base_url = "http://127.0.0.1:9".to_string();
        cfg.max_retries = 0;
        cfg.timeout_secs = 5;
        BlockchairDataSource::new(&cfg).unwrap().with_cache(cache)
    }

    #[tokio::test]
    async fn test_all_fetches_failing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ds = offline_source(dir.path(), &["t1"], None).await;

        let err = ds.transactions_spent_from("1Abc").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn test_partial_fetch_failure_keeps_resolved_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = Transaction::new("t1")
            .with_input("1Abc", 1.0)
            .with_output("1Def", 1.0);
        let ds = offline_source(dir.path(), &["t1", "t2"], Some(t1)).await;

        let spent = ds.transactions_spent_from("1Abc").await.unwrap();
        assert_eq!(spent.len(), 1);
        assert_eq!(spent[0].id, "t1");
    }

    #[tokio::test]
    async fn test_cached_lookups_skip_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DataSourceCache::new(Duration::from_secs(60), Some(dir.path().to_path_buf()));
        cache
            .save_address_transactions("1Abc", 50, &["t1".to_string(), "t2".to_string()])
            .await;
        cache
            .save_transaction(
                &Transaction::new("t1")
                    .with_input("1Abc", 1.0)
                    .with_output("1Def", 1.0),
            )
            .await;
        cache
            .save_transaction(
                &Transaction::new("t2")
                    .with_input("1Xyz", 1.0)
                    .with_output("1Abc", 1.0),
            )
            .await;

        let mut cfg = config();
        cfg.base_url = "http://127.0.0.1:9".to_string();
        let ds = BlockchairDataSource::new(&cfg).unwrap().with_cache(cache);

        let spent = ds.transactions_spent_from("1Abc").await.unwrap();
        assert_eq!(spent.len(), 1);
        assert_eq!(spent[0].id, "t1");
    }
}
