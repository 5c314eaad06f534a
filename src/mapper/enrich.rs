//! Secondary queries needed to complete a mapping.
//!
//! Every enrichment degrades instead of failing the record: a transaction
//! whose operations cannot be fetched contributes nothing, an operation whose
//! effects cannot be fetched gets an empty effect list, and an unavailable
//! account or asset is reported as absent. Account and asset lookups are
//! memoized in a bounded cache so repeated references within and across
//! batches hit the upstream once.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::horizon::{
    AccountRecord, Asset, AssetRecord, ChainQueryClient, EffectRecord, OperationRecord,
    TransactionRecord,
};
use crate::utils::parse_amount;

/// Bounded memoization cache evicting the oldest-inserted entry once
/// capacity is exceeded.
pub(crate) struct BoundedCache<K, V> {
    capacity: usize,
    map: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).cloned()
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if !self.map.contains_key(&key) {
            if self.map.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
        }
        self.map.insert(key, value);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}

/// Orchestrates the auxiliary lookups the mapper and derived pipelines need.
pub struct EntityEnricher {
    client: Arc<dyn ChainQueryClient>,
    accounts: Mutex<BoundedCache<String, AccountRecord>>,
    assets: Mutex<BoundedCache<Asset, AssetRecord>>,
}

impl EntityEnricher {
    pub fn new(client: Arc<dyn ChainQueryClient>, cache_capacity: usize) -> Self {
        Self {
            client,
            accounts: Mutex::new(BoundedCache::new(cache_capacity)),
            assets: Mutex::new(BoundedCache::new(cache_capacity)),
        }
    }

    /// Fetch the operations of a transaction; on failure, log and return an
    /// empty list so the transaction contributes nothing instead of failing
    /// the pipeline.
    pub async fn operations_for_transaction(
        &self,
        transaction: &TransactionRecord,
    ) -> Vec<OperationRecord> {
        match self
            .client
            .operations_for_transaction(&transaction.hash)
            .await
        {
            Ok(operations) => operations,
            Err(e) => {
                warn!(
                    "Failed to fetch operations for transaction {}: {}",
                    transaction.hash, e
                );
                Vec::new()
            }
        }
    }

    /// Fetch the effects of an operation; failure degrades to an empty list.
    pub async fn effects_for_operation(&self, operation_id: &str) -> Vec<EffectRecord> {
        match self.client.effects_for_operation(operation_id).await {
            Ok(effects) => effects,
            Err(e) => {
                warn!(
                    "Failed to fetch effects for operation {}: {}",
                    operation_id, e
                );
                Vec::new()
            }
        }
    }

    /// Fetch full account details; `None` means unavailable and the caller
    /// must skip the account.
    pub async fn account(&self, account_id: &str) -> Option<AccountRecord> {
        if let Some(hit) = self.accounts.lock().await.get(&account_id.to_string()) {
            return Some(hit);
        }

        match self.client.account(account_id).await {
            Ok(Some(account)) => {
                self.accounts
                    .lock()
                    .await
                    .insert(account_id.to_string(), account.clone());
                Some(account)
            }
            Ok(None) => {
                debug!("Account {} not found upstream", account_id);
                None
            }
            Err(e) => {
                warn!("Failed to fetch account {}: {}", account_id, e);
                None
            }
        }
    }

    /// Fetch chain-side statistics for an issued asset, normalizing a
    /// missing or non-numeric circulating amount to `"0"`.
    pub async fn asset_stats(&self, asset: &Asset) -> Option<AssetRecord> {
        let code = asset.code()?;
        let issuer = asset.issuer()?;

        if let Some(hit) = self.assets.lock().await.get(asset) {
            return Some(hit);
        }

        match self.client.asset(code, issuer).await {
            Ok(Some(mut record)) => {
                record.amount = Some(normalize_amount(record.amount.take()));
                self.assets
                    .lock()
                    .await
                    .insert(asset.clone(), record.clone());
                Some(record)
            }
            Ok(None) => {
                debug!("Asset {}:{} not found upstream", code, issuer);
                None
            }
            Err(e) => {
                warn!("Failed to fetch asset {}:{}: {}", code, issuer, e);
                None
            }
        }
    }
}

fn normalize_amount(amount: Option<String>) -> String {
    match amount {
        Some(a) if parse_amount(&a).is_some() => a,
        _ => "0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeChainClient;

    fn credit(code: &str) -> Asset {
        Asset::CreditAlphanum4 {
            code: code.to_string(),
            issuer: "GISSUER".to_string(),
        }
    }

    #[tokio::test]
    async fn asset_lookups_are_deduplicated() {
        let mut client = FakeChainClient::default();
        client.add_asset("USD", "GISSUER", Some("5000.0000000"));
        let client = Arc::new(client);
        let enricher = EntityEnricher::new(client.clone(), 16);

        // Three operations referencing the same (code, issuer) pair.
        for _ in 0..3 {
            let stats = enricher.asset_stats(&credit("USD")).await.unwrap();
            assert_eq!(stats.amount.as_deref(), Some("5000.0000000"));
        }
        assert_eq!(*client.asset_lookups.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn non_numeric_amount_normalizes_to_zero() {
        let mut client = FakeChainClient::default();
        client.add_asset("EUR", "GISSUER", Some("not-a-number"));
        client.add_asset("GBP", "GISSUER", None);
        let enricher = EntityEnricher::new(Arc::new(client), 16);

        let eur = enricher.asset_stats(&credit("EUR")).await.unwrap();
        assert_eq!(eur.amount.as_deref(), Some("0"));

        let gbp = enricher.asset_stats(&credit("GBP")).await.unwrap();
        assert_eq!(gbp.amount.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn native_asset_has_no_stats() {
        let enricher = EntityEnricher::new(Arc::new(FakeChainClient::default()), 16);
        assert!(enricher.asset_stats(&Asset::Native).await.is_none());
    }

    #[tokio::test]
    async fn unfetchable_operations_degrade_to_empty() {
        let client = FakeChainClient::default();
        let enricher = EntityEnricher::new(Arc::new(client), 16);

        let tx = FakeChainClient::transaction("missing", 1, "1-1");
        assert!(enricher.operations_for_transaction(&tx).await.is_empty());
    }

    #[test]
    fn bounded_cache_evicts_oldest_inserted() {
        let mut cache: BoundedCache<u32, u32> = BoundedCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert(3, 30);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.get(&3), Some(30));
    }
}
