//! Chain query API integration.
//!
//! This module provides the client and types for the upstream Horizon-style
//! query service. The `ChainQueryClient` trait is the boundary the ingestion
//! pipelines are written against; `HorizonClient` is the HTTP implementation.

/// HTTP client for the chain query service
mod client;
/// Type definitions for query API records
mod types;

pub use client::HorizonClient;
pub use types::*;

use futures_util::stream::BoxStream;

/// A continuous, cursor-ordered stream of upstream records.
pub type RecordStream<T> = BoxStream<'static, Result<T, HorizonError>>;

/// Boundary trait for the upstream chain query service.
///
/// All calls may fail with a transient I/O error, a malformed-response error,
/// or a rate-limit error carrying a retry-after duration.
#[async_trait::async_trait]
pub trait ChainQueryClient: Send + Sync {
    /// Stream ledgers in upstream order, starting after `cursor`.
    async fn stream_ledgers(&self, cursor: &str) -> Result<RecordStream<LedgerRecord>, HorizonError>;

    /// Stream transactions in upstream order, starting after `cursor`.
    async fn stream_transactions(
        &self,
        cursor: &str,
    ) -> Result<RecordStream<TransactionRecord>, HorizonError>;

    /// Stream trades in upstream order, starting after `cursor`.
    async fn stream_trades(&self, cursor: &str) -> Result<RecordStream<TradeRecord>, HorizonError>;

    /// Fetch one ledger header by sequence.
    async fn ledger(&self, sequence: u64) -> Result<LedgerRecord, HorizonError>;

    /// Fetch the transactions of one ledger, ascending.
    async fn transactions_for_ledger(
        &self,
        sequence: u64,
    ) -> Result<Vec<TransactionRecord>, HorizonError>;

    /// Fetch the operations of one transaction, ascending.
    async fn operations_for_transaction(
        &self,
        hash: &str,
    ) -> Result<Vec<OperationRecord>, HorizonError>;

    /// Fetch the operations of one ledger, ascending.
    async fn operations_for_ledger(
        &self,
        sequence: u64,
    ) -> Result<Vec<OperationRecord>, HorizonError>;

    /// Fetch the effects of one operation, ascending.
    async fn effects_for_operation(
        &self,
        operation_id: &str,
    ) -> Result<Vec<EffectRecord>, HorizonError>;

    /// Fetch full account details; `None` when the account does not exist.
    async fn account(&self, account_id: &str) -> Result<Option<AccountRecord>, HorizonError>;

    /// Fetch chain-side asset statistics; `None` when the asset is unknown upstream.
    async fn asset(&self, code: &str, issuer: &str) -> Result<Option<AssetRecord>, HorizonError>;

    /// Validate a cursor with a limit-1 query against `endpoint`.
    async fn probe(&self, endpoint: StreamEndpoint, cursor: &str) -> Result<(), HorizonError>;
}
