//! Service configuration.
//!
//! Loaded from a JSON file; every tunable has a default so a minimal config
//! only needs the two URLs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::ingest::types::ResourceKind;
use crate::ingest::RetryPolicy;

/// Backoff tunables, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Transient attempts before escalating to fatal; <= 0 retries forever.
    #[serde(default = "default_retries_on_error")]
    pub retries_on_error: i64,
    #[serde(default = "default_idle_multiplier")]
    pub idle_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            retries_on_error: default_retries_on_error(),
            idle_multiplier: default_idle_multiplier(),
        }
    }
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_retries_on_error() -> i64 {
    10
}
fn default_idle_multiplier() -> u32 {
    2
}

/// Per-resource publish batch sizes.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSizes {
    #[serde(default = "default_ledger_batch")]
    pub ledgers: usize,
    #[serde(default = "default_batch")]
    pub transactions: usize,
    #[serde(default = "default_batch")]
    pub addresses: usize,
    #[serde(default = "default_batch")]
    pub assets: usize,
    #[serde(default = "default_trade_batch")]
    pub trades: usize,
    #[serde(default = "default_batch")]
    pub orders: usize,
    #[serde(default = "default_batch")]
    pub function_calls: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            ledgers: default_ledger_batch(),
            transactions: default_batch(),
            addresses: default_batch(),
            assets: default_batch(),
            trades: default_trade_batch(),
            orders: default_batch(),
            function_calls: default_batch(),
        }
    }
}

fn default_ledger_batch() -> usize {
    10
}
fn default_batch() -> usize {
    50
}
fn default_trade_batch() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Base URL of the upstream chain query service.
    pub horizon_url: String,
    /// Base URL of the downstream ingestion API.
    pub publisher_url: String,
    /// Directory holding checkpoint files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Ledger sequence to replay from; 0 disables historical replay.
    #[serde(default)]
    pub historical_ledger: u64,
    /// Records requested per page while streaming.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Delay between polls once a stream has caught up, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay between historical forward-scan probes, in milliseconds.
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
    /// Capacity of the account/asset enrichment caches.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Have the downstream persist cursors atomically with each batch.
    #[serde(default)]
    pub publish_checkpoints: bool,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch_sizes: BatchSizes,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_page_limit() -> u32 {
    200
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_probe_delay_ms() -> u64 {
    500
}
fn default_cache_capacity() -> usize {
    1_024
}

impl IngestConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            retries_on_error: self.retry.retries_on_error,
            idle_multiplier: self.retry.idle_multiplier,
        }
    }

    pub fn batch_size(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Ledger => self.batch_sizes.ledgers,
            ResourceKind::Transaction => self.batch_sizes.transactions,
            ResourceKind::Address => self.batch_sizes.addresses,
            ResourceKind::Asset => self.batch_sizes.assets,
            ResourceKind::Trade => self.batch_sizes.trades,
            ResourceKind::Order => self.batch_sizes.orders,
            ResourceKind::FunctionCall => self.batch_sizes.function_calls,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: IngestConfig = serde_json::from_str(
            r#"{"horizon_url": "https://horizon.example", "publisher_url": "https://ingest.example"}"#,
        )
        .unwrap();

        assert_eq!(config.historical_ledger, 0);
        assert_eq!(config.page_limit, 200);
        assert_eq!(config.batch_size(ResourceKind::Trade), 100);
        assert_eq!(config.retry_policy().retries_on_error, 10);
        assert!(!config.publish_checkpoints);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config: IngestConfig = serde_json::from_str(
            r#"{
                "horizon_url": "https://horizon.example",
                "publisher_url": "https://ingest.example",
                "historical_ledger": 123456,
                "retry": {"initial_backoff_ms": 100, "max_backoff_ms": 1600, "retries_on_error": 5},
                "batch_sizes": {"function_calls": 25}
            }"#,
        )
        .unwrap();

        assert_eq!(config.historical_ledger, 123456);
        let policy = config.retry_policy();
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_millis(1600));
        assert_eq!(config.batch_size(ResourceKind::FunctionCall), 25);
        assert_eq!(config.batch_size(ResourceKind::Transaction), 50);
    }
}
