//! Start-cursor resolution.
//!
//! Decides where a subscription resumes from: a configured historical replay
//! ledger wins, else the persisted checkpoint, else the live tail. Historical
//! answers are computed once and cached for the process lifetime. Every
//! resolved cursor is validated with a limit-1 probe before use; a cursor the
//! upstream rejects is a fatal condition, not a retryable one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::horizon::{ChainQueryClient, HorizonError, StreamEndpoint, CURSOR_NOW};
use crate::ingest::checkpoint::CheckpointStore;
use crate::ingest::types::{IngestError, ResourceKind};

pub struct CursorResolver {
    client: Arc<dyn ChainQueryClient>,
    store: Arc<dyn CheckpointStore>,
    /// Ledger sequence to replay from; 0 disables historical replay.
    historical_ledger: u64,
    /// Delay between forward-scan probes, to respect upstream rate limits.
    probe_delay: Duration,
    /// Cached historical answers, computed once per process.
    ledger_cursor: Mutex<Option<String>>,
    transaction_cursor: Mutex<Option<String>>,
}

impl CursorResolver {
    pub fn new(
        client: Arc<dyn ChainQueryClient>,
        store: Arc<dyn CheckpointStore>,
        historical_ledger: u64,
        probe_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            historical_ledger,
            probe_delay,
            ledger_cursor: Mutex::new(None),
            transaction_cursor: Mutex::new(None),
        }
    }

    /// Resolve the cursor a subscription of `kind` should start from.
    pub async fn resolve_start(&self, kind: ResourceKind) -> Result<String, IngestError> {
        if self.historical_ledger > 0 {
            match kind {
                ResourceKind::Ledger => return self.historical_ledger_cursor().await,
                ResourceKind::Transaction
                | ResourceKind::Address
                | ResourceKind::Asset
                | ResourceKind::Order
                | ResourceKind::FunctionCall => {
                    return self.historical_transaction_cursor().await;
                }
                // Trade tokens are not derivable from a ledger sequence;
                // trades resolve checkpoint-else-now even during replay.
                ResourceKind::Trade => {}
            }
        }

        let cursor = self
            .store
            .get(kind)
            .await?
            .unwrap_or_else(|| CURSOR_NOW.to_string());
        debug!("Resolved {} start cursor: {}", kind, cursor);
        Ok(cursor)
    }

    /// Validate a cursor with a limit-1 probe against the endpoint the
    /// subscription will use. Upstream rejection is fatal; a transient probe
    /// failure keeps its own classification.
    pub async fn validate(
        &self,
        kind: ResourceKind,
        endpoint: StreamEndpoint,
        cursor: &str,
    ) -> Result<(), IngestError> {
        match self.client.probe(endpoint, cursor).await {
            Ok(()) => Ok(()),
            Err(HorizonError::BadCursor(detail)) => Err(IngestError::InvalidCursor {
                resource: kind,
                detail,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Paging token of the configured replay ledger.
    async fn historical_ledger_cursor(&self) -> Result<String, IngestError> {
        let mut cached = self.ledger_cursor.lock().await;
        if let Some(cursor) = cached.as_ref() {
            return Ok(cursor.clone());
        }

        let ledger = self.client.ledger(self.historical_ledger).await?;
        info!(
            "Historical replay: ledger {} resolved to cursor {}",
            self.historical_ledger, ledger.paging_token
        );
        *cached = Some(ledger.paging_token.clone());
        Ok(ledger.paging_token)
    }

    /// Paging token of the first transaction in the replay ledger or later.
    ///
    /// Some ledgers contain zero transactions, so the scan probes forward
    /// ledger by ledger, pausing between probes, until one is found.
    async fn historical_transaction_cursor(&self) -> Result<String, IngestError> {
        let mut cached = self.transaction_cursor.lock().await;
        if let Some(cursor) = cached.as_ref() {
            return Ok(cursor.clone());
        }

        let mut sequence = self.historical_ledger;
        loop {
            let transactions = self.client.transactions_for_ledger(sequence).await?;
            if let Some(first) = transactions.first() {
                info!(
                    "Historical replay: first transaction at ledger {} resolved to cursor {}",
                    sequence, first.paging_token
                );
                *cached = Some(first.paging_token.clone());
                return Ok(first.paging_token.clone());
            }

            debug!("Ledger {} has no transactions, probing next", sequence);
            tokio::time::sleep(self.probe_delay).await;
            sequence += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeChainClient, MemoryCheckpointStore};

    fn resolver(client: FakeChainClient, historical_ledger: u64) -> CursorResolver {
        CursorResolver::new(
            Arc::new(client),
            Arc::new(MemoryCheckpointStore::default()),
            historical_ledger,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn defaults_to_now_without_checkpoint() {
        let resolver = resolver(FakeChainClient::default(), 0);
        let cursor = resolver.resolve_start(ResourceKind::Ledger).await.unwrap();
        assert_eq!(cursor, CURSOR_NOW);
    }

    #[tokio::test]
    async fn returns_persisted_checkpoint() {
        let store = Arc::new(MemoryCheckpointStore::default());
        store.set(ResourceKind::Transaction, "7000-3").await.unwrap();
        let resolver = CursorResolver::new(
            Arc::new(FakeChainClient::default()),
            store,
            0,
            Duration::from_millis(1),
        );

        let cursor = resolver
            .resolve_start(ResourceKind::Transaction)
            .await
            .unwrap();
        assert_eq!(cursor, "7000-3");
    }

    #[tokio::test]
    async fn historical_scan_skips_empty_ledgers() {
        let mut client = FakeChainClient::default();
        client.add_ledger(100, "4294967296-0");
        // Ledger 100 is empty; the first transaction lives in ledger 101.
        client.ledger_transactions.insert(100, Vec::new());
        client
            .ledger_transactions
            .insert(101, vec![FakeChainClient::transaction("abc", 101, "4298967297-1")]);

        let resolver = resolver(client, 100);
        let cursor = resolver
            .resolve_start(ResourceKind::Transaction)
            .await
            .unwrap();
        assert_eq!(cursor, "4298967297-1");
    }

    #[tokio::test]
    async fn historical_cursor_is_computed_once() {
        let mut client = FakeChainClient::default();
        client.add_ledger(100, "4294967296-0");
        client
            .ledger_transactions
            .insert(100, vec![FakeChainClient::transaction("abc", 100, "4294967297-1")]);

        let client = Arc::new(client);
        let resolver = CursorResolver::new(
            client.clone(),
            Arc::new(MemoryCheckpointStore::default()),
            100,
            Duration::from_millis(1),
        );

        let first = resolver
            .resolve_start(ResourceKind::FunctionCall)
            .await
            .unwrap();
        let second = resolver
            .resolve_start(ResourceKind::Transaction)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(*client.ledger_transaction_fetches.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn rejected_cursor_is_fatal() {
        let mut client = FakeChainClient::default();
        client.bad_cursors.insert("garbage".to_string());

        let resolver = resolver(client, 0);
        let err = resolver
            .validate(ResourceKind::Ledger, StreamEndpoint::Ledgers, "garbage")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidCursor { .. }));
        assert_eq!(err.failure_kind(), crate::ingest::types::FailureKind::Fatal);
    }
}
