//! In-memory fakes for the collaborator traits, shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use futures_util::StreamExt;

use crate::horizon::{
    AccountRecord, Asset, AssetRecord, ChainQueryClient, EffectRecord, HorizonError,
    LedgerRecord, OperationDetail, OperationRecord, RecordStream, StreamEndpoint, TradeRecord,
    TransactionRecord, CURSOR_NOW,
};
use crate::ingest::types::{IngestError, ResourceKind};
use crate::ingest::CheckpointStore;
use crate::publisher::{PublishError, Publisher};

/// Scripted chain query client with lookup counters.
#[derive(Default)]
pub struct FakeChainClient {
    pub ledgers: Vec<LedgerRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub trades: Vec<TradeRecord>,
    pub ledgers_by_seq: HashMap<u64, LedgerRecord>,
    pub ledger_transactions: HashMap<u64, Vec<TransactionRecord>>,
    pub operations: HashMap<String, Vec<OperationRecord>>,
    pub effects: HashMap<String, Vec<EffectRecord>>,
    pub accounts: HashMap<String, AccountRecord>,
    pub assets: HashMap<(String, String), AssetRecord>,
    pub bad_cursors: HashSet<String>,
    pub asset_lookups: Mutex<u64>,
    pub account_lookups: Mutex<u64>,
    pub ledger_transaction_fetches: Mutex<u64>,
}

impl FakeChainClient {
    pub fn transaction(hash: &str, ledger: u64, paging_token: &str) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            ledger,
            source_account: "GSOURCE".to_string(),
            fee_charged: "100".to_string(),
            operation_count: 1,
            created_at: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            paging_token: paging_token.to_string(),
        }
    }

    pub fn operation(id: &str, transaction_hash: &str, detail: OperationDetail) -> OperationRecord {
        OperationRecord {
            id: id.to_string(),
            paging_token: format!("{}-pt", id),
            transaction_hash: transaction_hash.to_string(),
            source_account: "GSOURCE".to_string(),
            created_at: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            detail,
        }
    }

    pub fn add_ledger(&mut self, sequence: u64, paging_token: &str) {
        self.ledgers_by_seq.insert(
            sequence,
            LedgerRecord {
                sequence,
                hash: format!("ledger-{}", sequence),
                prev_hash: Some(format!("ledger-{}", sequence.saturating_sub(1))),
                closed_at: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
                transaction_count: 0,
                fee_pool: "0.0000000".to_string(),
                paging_token: paging_token.to_string(),
            },
        );
    }

    pub fn add_asset(&mut self, code: &str, issuer: &str, amount: Option<&str>) {
        self.assets.insert(
            (code.to_string(), issuer.to_string()),
            AssetRecord {
                asset_type: "credit_alphanum4".to_string(),
                asset_code: Some(code.to_string()),
                asset_issuer: Some(issuer.to_string()),
                amount: amount.map(str::to_string),
                num_accounts: 10,
                flags: Default::default(),
            },
        );
    }
}

/// Yield the scripted records after `cursor`, then stay pending like a live
/// tail that has caught up.
fn stream_of<T, F>(records: &[T], token: F, cursor: &str) -> RecordStream<T>
where
    T: Clone + Send + 'static,
    F: Fn(&T) -> &str,
{
    let start = if cursor == CURSOR_NOW {
        records.len()
    } else {
        records
            .iter()
            .position(|r| token(r) == cursor)
            .map(|pos| pos + 1)
            .unwrap_or(0)
    };

    let items: Vec<Result<T, HorizonError>> = records[start..].iter().cloned().map(Ok).collect();
    Box::pin(futures::stream::iter(items).chain(futures::stream::pending()))
}

#[async_trait::async_trait]
impl ChainQueryClient for FakeChainClient {
    async fn stream_ledgers(
        &self,
        cursor: &str,
    ) -> Result<RecordStream<LedgerRecord>, HorizonError> {
        Ok(stream_of(&self.ledgers, |r| r.paging_token.as_str(), cursor))
    }

    async fn stream_transactions(
        &self,
        cursor: &str,
    ) -> Result<RecordStream<TransactionRecord>, HorizonError> {
        Ok(stream_of(
            &self.transactions,
            |r| r.paging_token.as_str(),
            cursor,
        ))
    }

    async fn stream_trades(&self, cursor: &str) -> Result<RecordStream<TradeRecord>, HorizonError> {
        Ok(stream_of(&self.trades, |r| r.paging_token.as_str(), cursor))
    }

    async fn ledger(&self, sequence: u64) -> Result<LedgerRecord, HorizonError> {
        self.ledgers_by_seq
            .get(&sequence)
            .cloned()
            .ok_or_else(|| HorizonError::NotFound(format!("ledger {}", sequence)))
    }

    async fn transactions_for_ledger(
        &self,
        sequence: u64,
    ) -> Result<Vec<TransactionRecord>, HorizonError> {
        *self.ledger_transaction_fetches.lock().unwrap() += 1;
        Ok(self
            .ledger_transactions
            .get(&sequence)
            .cloned()
            .unwrap_or_default())
    }

    async fn operations_for_transaction(
        &self,
        hash: &str,
    ) -> Result<Vec<OperationRecord>, HorizonError> {
        self.operations
            .get(hash)
            .cloned()
            .ok_or_else(|| HorizonError::NotFound(format!("transaction {}", hash)))
    }

    async fn operations_for_ledger(
        &self,
        sequence: u64,
    ) -> Result<Vec<OperationRecord>, HorizonError> {
        let _ = sequence;
        Ok(Vec::new())
    }

    async fn effects_for_operation(
        &self,
        operation_id: &str,
    ) -> Result<Vec<EffectRecord>, HorizonError> {
        Ok(self.effects.get(operation_id).cloned().unwrap_or_default())
    }

    async fn account(&self, account_id: &str) -> Result<Option<AccountRecord>, HorizonError> {
        *self.account_lookups.lock().unwrap() += 1;
        Ok(self.accounts.get(account_id).cloned())
    }

    async fn asset(&self, code: &str, issuer: &str) -> Result<Option<AssetRecord>, HorizonError> {
        *self.asset_lookups.lock().unwrap() += 1;
        Ok(self
            .assets
            .get(&(code.to_string(), issuer.to_string()))
            .cloned())
    }

    async fn probe(&self, _endpoint: StreamEndpoint, cursor: &str) -> Result<(), HorizonError> {
        if self.bad_cursors.contains(cursor) {
            return Err(HorizonError::BadCursor(format!("invalid cursor {}", cursor)));
        }
        Ok(())
    }
}

/// In-memory checkpoint store that records every write.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    cursors: Mutex<HashMap<ResourceKind, String>>,
    history: Mutex<Vec<String>>,
}

impl MemoryCheckpointStore {
    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }

    pub fn get_sync(&self, kind: ResourceKind) -> Option<String> {
        self.cursors.lock().unwrap().get(&kind).cloned()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, kind: ResourceKind) -> Result<Option<String>, IngestError> {
        Ok(self.cursors.lock().unwrap().get(&kind).cloned())
    }

    async fn set(&self, kind: ResourceKind, cursor: &str) -> Result<(), IngestError> {
        self.cursors
            .lock()
            .unwrap()
            .insert(kind, cursor.to_string());
        self.history.lock().unwrap().push(cursor.to_string());
        Ok(())
    }
}

/// Publisher fake recording every attempt; can be told to fail.
#[derive(Default)]
pub struct FakePublisher {
    attempts: Mutex<Vec<(String, Vec<serde_json::Value>)>>,
    accepted: Mutex<Vec<(String, Vec<serde_json::Value>)>>,
    failures_remaining: Mutex<u32>,
}

impl FakePublisher {
    /// Fail the next `count` publish attempts.
    pub fn fail_times(&self, count: u32) {
        *self.failures_remaining.lock().unwrap() = count;
    }

    /// Every publish attempt, including failed ones.
    pub fn attempts(&self) -> Vec<(String, Vec<serde_json::Value>)> {
        self.attempts.lock().unwrap().clone()
    }

    /// Successfully accepted batches.
    pub fn batches(&self) -> Vec<(String, Vec<serde_json::Value>)> {
        self.accepted.lock().unwrap().clone()
    }

    fn record(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
    ) -> Result<(), PublishError> {
        self.attempts
            .lock()
            .unwrap()
            .push((resource_path.to_string(), batch.to_vec()));

        let mut failures = self.failures_remaining.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(PublishError::Rejected {
                status: 503,
                detail: "scripted failure".to_string(),
            });
        }

        self.accepted
            .lock()
            .unwrap()
            .push((resource_path.to_string(), batch.to_vec()));
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
    ) -> Result<(), PublishError> {
        self.record(resource_path, batch)
    }

    async fn publish_with_checkpoint(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
        _cursor: &str,
    ) -> Result<(), PublishError> {
        self.record(resource_path, batch)
    }
}
