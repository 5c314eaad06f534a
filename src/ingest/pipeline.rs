use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::horizon::{
	Asset, ChainQueryClient, HorizonError, LedgerRecord, OperationDetail, OperationRecord,
	RecordStream, StreamEndpoint, TradeRecord, TransactionRecord, CURSOR_NOW,
};
use crate::ingest::checkpoint::CheckpointStore;
use crate::ingest::cursor::CursorResolver;
use crate::ingest::progress::IngestProgressTracker;
use crate::ingest::retry::{RetryController, RetryPolicy};
use crate::ingest::types::{IngestError, ResourceKind, ShutdownSignal, SubscriptionOutcome};
use crate::mapper::{assets_of, map_operation, referenced_accounts, EntityEnricher};
use crate::publisher::Publisher;

/// Per-resource behavior plugged into the generic subscription pipeline.
///
/// Primary specs stream their own endpoint; derived specs (addresses,
/// assets, orders, function calls) ride the transactions stream and emit
/// zero or more rows per transaction.
#[async_trait::async_trait]
pub trait PipelineSpec: Send + Sync {
	type Record: Send + 'static;

	fn kind(&self) -> ResourceKind;

	/// The upstream endpoint this spec streams, also used for cursor probing.
	fn endpoint(&self) -> StreamEndpoint;

	/// Open the raw record stream starting after `cursor`.
	async fn open(&self, cursor: &str) -> Result<RecordStream<Self::Record>, HorizonError>;

	/// Paging token of one record; becomes the checkpoint after its batch.
	fn cursor_of(&self, record: &Self::Record) -> String;

	/// Map one raw record into the rows published downstream.
	async fn process(&self, record: &Self::Record) -> Result<Vec<serde_json::Value>, IngestError>;
}

/// Rows accumulated towards the next publish, with the cursor of the last
/// raw record they cover.
struct PendingBatch {
	capacity: usize,
	rows: Vec<serde_json::Value>,
	records: usize,
	cursor: Option<String>,
}

impl PendingBatch {
	fn new(capacity: usize) -> Self {
		Self {
			capacity,
			rows: Vec::new(),
			records: 0,
			cursor: None,
		}
	}

	fn push(&mut self, rows: Vec<serde_json::Value>, cursor: String) {
		self.rows.extend(rows);
		self.records += 1;
		self.cursor = Some(cursor);
	}

	fn is_full(&self) -> bool {
		self.records >= self.capacity
	}

	fn is_empty(&self) -> bool {
		self.records == 0
	}

	fn take(&mut self) -> (Vec<serde_json::Value>, Option<String>) {
		self.records = 0;
		(std::mem::take(&mut self.rows), self.cursor.take())
	}
}

/// One per-resource subscription pipeline.
///
/// Composes cursor resolution and validation, the raw record stream,
/// per-record mapping, fixed-size batching, publishing, and checkpointing,
/// all under retry supervision. The checkpoint advances only after the
/// downstream has accepted a batch, so an error or restart replays at most
/// one batch.
pub struct SubscriptionPipeline<S: PipelineSpec> {
	spec: S,
	resolver: Arc<CursorResolver>,
	store: Arc<dyn CheckpointStore>,
	publisher: Arc<dyn Publisher>,
	policy: RetryPolicy,
	batch_size: usize,
	/// When set, the downstream persists the cursor atomically with each batch.
	publish_checkpoints: bool,
	shutdown: ShutdownSignal,
}

impl<S: PipelineSpec> SubscriptionPipeline<S> {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		spec: S,
		resolver: Arc<CursorResolver>,
		store: Arc<dyn CheckpointStore>,
		publisher: Arc<dyn Publisher>,
		policy: RetryPolicy,
		batch_size: usize,
		publish_checkpoints: bool,
		shutdown: ShutdownSignal,
	) -> Self {
		Self {
			spec,
			resolver,
			store,
			publisher,
			policy,
			batch_size,
			publish_checkpoints,
			shutdown,
		}
	}

	/// Drive the pipeline until shutdown or a fatal condition.
	pub async fn run(self) -> Result<(), IngestError> {
		let kind = self.spec.kind();
		let mut controller = RetryController::new(kind, self.policy.clone(), self.shutdown.clone());
		let mut tracker = IngestProgressTracker::new(kind);
		let mut checkpointed_this_run = false;

		info!("Starting {} pipeline", kind);

		loop {
			if self.shutdown.is_triggered() {
				break;
			}

			match self
				.subscribe_once(&mut controller, &mut tracker, &mut checkpointed_this_run)
				.await
			{
				Ok(SubscriptionOutcome::Shutdown) => break,
				Ok(SubscriptionOutcome::Idle) => {
					if !controller.on_idle().await {
						break;
					}
				}
				Err(e) => {
					if let Err(fatal) = controller.on_error(e).await {
						tracker.log_progress(true);
						return Err(fatal);
					}
				}
			}
		}

		info!("Stopped {} pipeline: {}", kind, tracker.summary());
		Ok(())
	}

	/// One subscription attempt: resolve and validate the start cursor, then
	/// consume the stream until an error, the idle window, or shutdown.
	async fn subscribe_once(
		&self,
		controller: &mut RetryController,
		tracker: &mut IngestProgressTracker,
		checkpointed_this_run: &mut bool,
	) -> Result<SubscriptionOutcome, IngestError> {
		let kind = self.spec.kind();

		// Once this run has checkpointed, resubscription restarts from the
		// durable checkpoint rather than re-asking the resolver, so no
		// progress is lost or replayed past the last accepted batch.
		let start = if *checkpointed_this_run {
			self.store
				.get(kind)
				.await?
				.unwrap_or_else(|| CURSOR_NOW.to_string())
		} else {
			self.resolver.resolve_start(kind).await?
		};
		self.resolver
			.validate(kind, self.spec.endpoint(), &start)
			.await?;

		let mut stream = self.spec.open(&start).await?;
		controller.on_subscribed();
		info!("Subscribed {} stream from cursor {}", kind, start);

		let idle_window = self.policy.idle_window();
		let mut batch = PendingBatch::new(self.batch_size);
		let mut shutdown = self.shutdown.clone();
		let mut last_event = tokio::time::Instant::now();

		loop {
			let timeout = tokio::time::sleep_until(last_event + idle_window);
			tokio::pin!(timeout);

			tokio::select! {
				next = stream.next() => {
					last_event = tokio::time::Instant::now();
					match next {
						Some(Ok(record)) => {
							let rows = self.spec.process(&record).await?;
							batch.push(rows, self.spec.cursor_of(&record));
							tracker.record_processed();
							if batch.is_full() {
								self.flush(&mut batch, tracker, checkpointed_this_run).await?;
								controller.on_success();
							}
							tracker.log_progress(false);
						}
						Some(Err(e)) => return Err(e.into()),
						None => return Err(IngestError::StreamEnded),
					}
				}
				_ = shutdown.triggered() => {
					return Ok(SubscriptionOutcome::Shutdown);
				}
				_ = &mut timeout => {
					// Flush the partial batch so tail records are not held
					// back across the resubscribe.
					if !batch.is_empty() {
						self.flush(&mut batch, tracker, checkpointed_this_run).await?;
						controller.on_success();
					}
					debug!("No {} events within {:?}", kind, idle_window);
					return Ok(SubscriptionOutcome::Idle);
				}
			}
		}
	}

	/// Publish the pending batch and advance the checkpoint to the cursor of
	/// its last record. On publish failure the checkpoint stays put and the
	/// next resubscription replays the batch.
	async fn flush(
		&self,
		batch: &mut PendingBatch,
		tracker: &mut IngestProgressTracker,
		checkpointed_this_run: &mut bool,
	) -> Result<(), IngestError> {
		let kind = self.spec.kind();
		let (rows, cursor) = batch.take();
		let Some(cursor) = cursor else {
			return Ok(());
		};

		if !rows.is_empty() {
			if self.publish_checkpoints {
				self.publisher
					.publish_with_checkpoint(kind.resource_path(), &rows, &cursor)
					.await?;
			} else {
				self.publisher.publish(kind.resource_path(), &rows).await?;
			}
		}

		self.store.set(kind, &cursor).await?;
		*checkpointed_this_run = true;
		tracker.record_batch(rows.len(), &cursor);
		Ok(())
	}
}

/// Primary stream of ledger headers.
pub struct LedgerPipeline {
	client: Arc<dyn ChainQueryClient>,
}

impl LedgerPipeline {
	pub fn new(client: Arc<dyn ChainQueryClient>) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl PipelineSpec for LedgerPipeline {
	type Record = LedgerRecord;

	fn kind(&self) -> ResourceKind {
		ResourceKind::Ledger
	}

	fn endpoint(&self) -> StreamEndpoint {
		StreamEndpoint::Ledgers
	}

	async fn open(&self, cursor: &str) -> Result<RecordStream<LedgerRecord>, HorizonError> {
		self.client.stream_ledgers(cursor).await
	}

	fn cursor_of(&self, record: &LedgerRecord) -> String {
		record.paging_token.clone()
	}

	async fn process(&self, record: &LedgerRecord) -> Result<Vec<serde_json::Value>, IngestError> {
		Ok(vec![serde_json::to_value(record).map_err(HorizonError::from)?])
	}
}

/// Primary stream of transactions.
pub struct TransactionPipeline {
	client: Arc<dyn ChainQueryClient>,
}

impl TransactionPipeline {
	pub fn new(client: Arc<dyn ChainQueryClient>) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl PipelineSpec for TransactionPipeline {
	type Record = TransactionRecord;

	fn kind(&self) -> ResourceKind {
		ResourceKind::Transaction
	}

	fn endpoint(&self) -> StreamEndpoint {
		StreamEndpoint::Transactions
	}

	async fn open(&self, cursor: &str) -> Result<RecordStream<TransactionRecord>, HorizonError> {
		self.client.stream_transactions(cursor).await
	}

	fn cursor_of(&self, record: &TransactionRecord) -> String {
		record.paging_token.clone()
	}

	async fn process(
		&self,
		record: &TransactionRecord,
	) -> Result<Vec<serde_json::Value>, IngestError> {
		Ok(vec![serde_json::to_value(record).map_err(HorizonError::from)?])
	}
}

/// Primary stream of trades.
pub struct TradePipeline {
	client: Arc<dyn ChainQueryClient>,
}

impl TradePipeline {
	pub fn new(client: Arc<dyn ChainQueryClient>) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl PipelineSpec for TradePipeline {
	type Record = TradeRecord;

	fn kind(&self) -> ResourceKind {
		ResourceKind::Trade
	}

	fn endpoint(&self) -> StreamEndpoint {
		StreamEndpoint::Trades
	}

	async fn open(&self, cursor: &str) -> Result<RecordStream<TradeRecord>, HorizonError> {
		self.client.stream_trades(cursor).await
	}

	fn cursor_of(&self, record: &TradeRecord) -> String {
		record.paging_token.clone()
	}

	async fn process(&self, record: &TradeRecord) -> Result<Vec<serde_json::Value>, IngestError> {
		Ok(vec![serde_json::to_value(record).map_err(HorizonError::from)?])
	}
}

/// Derived stream: function calls mapped from each transaction's operations.
pub struct FunctionCallPipeline {
	client: Arc<dyn ChainQueryClient>,
	enricher: Arc<EntityEnricher>,
}

impl FunctionCallPipeline {
	pub fn new(client: Arc<dyn ChainQueryClient>, enricher: Arc<EntityEnricher>) -> Self {
		Self { client, enricher }
	}
}

#[async_trait::async_trait]
impl PipelineSpec for FunctionCallPipeline {
	type Record = TransactionRecord;

	fn kind(&self) -> ResourceKind {
		ResourceKind::FunctionCall
	}

	fn endpoint(&self) -> StreamEndpoint {
		StreamEndpoint::Transactions
	}

	async fn open(&self, cursor: &str) -> Result<RecordStream<TransactionRecord>, HorizonError> {
		self.client.stream_transactions(cursor).await
	}

	fn cursor_of(&self, record: &TransactionRecord) -> String {
		record.paging_token.clone()
	}

	async fn process(
		&self,
		record: &TransactionRecord,
	) -> Result<Vec<serde_json::Value>, IngestError> {
		let operations = self.enricher.operations_for_transaction(record).await;
		let mut rows = Vec::with_capacity(operations.len());
		for (index, operation) in operations.iter().enumerate() {
			let call =
				map_operation(operation, record.ledger, index as u32, &self.enricher).await;
			rows.push(serde_json::to_value(call).map_err(HorizonError::from)?);
		}
		Ok(rows)
	}
}

/// Derived stream: accounts discovered by following transactions.
///
/// The upstream API has no changed-accounts feed, so addresses are extracted
/// from each transaction's operations, deduplicated, and enriched with full
/// account details; unavailable accounts are skipped.
pub struct AddressPipeline {
	client: Arc<dyn ChainQueryClient>,
	enricher: Arc<EntityEnricher>,
}

impl AddressPipeline {
	pub fn new(client: Arc<dyn ChainQueryClient>, enricher: Arc<EntityEnricher>) -> Self {
		Self { client, enricher }
	}
}

#[async_trait::async_trait]
impl PipelineSpec for AddressPipeline {
	type Record = TransactionRecord;

	fn kind(&self) -> ResourceKind {
		ResourceKind::Address
	}

	fn endpoint(&self) -> StreamEndpoint {
		StreamEndpoint::Transactions
	}

	async fn open(&self, cursor: &str) -> Result<RecordStream<TransactionRecord>, HorizonError> {
		self.client.stream_transactions(cursor).await
	}

	fn cursor_of(&self, record: &TransactionRecord) -> String {
		record.paging_token.clone()
	}

	async fn process(
		&self,
		record: &TransactionRecord,
	) -> Result<Vec<serde_json::Value>, IngestError> {
		let operations = self.enricher.operations_for_transaction(record).await;

		let mut ids = BTreeSet::new();
		ids.insert(record.source_account.clone());
		for operation in &operations {
			ids.extend(referenced_accounts(operation));
		}

		let mut rows = Vec::new();
		for id in ids {
			if let Some(account) = self.enricher.account(&id).await {
				rows.push(serde_json::to_value(account).map_err(HorizonError::from)?);
			}
		}
		Ok(rows)
	}
}

/// Derived stream: assets referenced by each transaction's operations,
/// enriched with chain-side statistics.
pub struct AssetPipeline {
	client: Arc<dyn ChainQueryClient>,
	enricher: Arc<EntityEnricher>,
}

impl AssetPipeline {
	pub fn new(client: Arc<dyn ChainQueryClient>, enricher: Arc<EntityEnricher>) -> Self {
		Self { client, enricher }
	}
}

#[async_trait::async_trait]
impl PipelineSpec for AssetPipeline {
	type Record = TransactionRecord;

	fn kind(&self) -> ResourceKind {
		ResourceKind::Asset
	}

	fn endpoint(&self) -> StreamEndpoint {
		StreamEndpoint::Transactions
	}

	async fn open(&self, cursor: &str) -> Result<RecordStream<TransactionRecord>, HorizonError> {
		self.client.stream_transactions(cursor).await
	}

	fn cursor_of(&self, record: &TransactionRecord) -> String {
		record.paging_token.clone()
	}

	async fn process(
		&self,
		record: &TransactionRecord,
	) -> Result<Vec<serde_json::Value>, IngestError> {
		let operations = self.enricher.operations_for_transaction(record).await;

		let mut seen = std::collections::HashSet::new();
		let mut rows = Vec::new();
		for operation in &operations {
			for asset in assets_of(operation) {
				if !seen.insert(asset.clone()) {
					continue;
				}
				if let Some(stats) = self.enricher.asset_stats(&asset).await {
					rows.push(serde_json::to_value(stats).map_err(HorizonError::from)?);
				}
			}
		}
		Ok(rows)
	}
}

/// An offer placement or update, derived from manage-offer operations.
#[derive(Debug, Clone, Serialize)]
pub struct OrderEntity {
	pub account: String,
	pub operation_type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub offer_id: Option<String>,
	pub selling_asset: String,
	pub buying_asset: String,
	pub amount: String,
	pub price: String,
	pub passive: bool,
	pub ledger: u64,
	pub transaction_hash: String,
	pub timestamp: DateTime<Utc>,
}

/// Derived stream: orders extracted from manage-offer operations on the
/// transactions stream (the upstream API has no offers feed).
pub struct OrderPipeline {
	client: Arc<dyn ChainQueryClient>,
	enricher: Arc<EntityEnricher>,
}

impl OrderPipeline {
	pub fn new(client: Arc<dyn ChainQueryClient>, enricher: Arc<EntityEnricher>) -> Self {
		Self { client, enricher }
	}
}

/// Extract an order entity from a manage-offer operation, if it is one.
fn order_entity(operation: &OperationRecord, ledger: u64) -> Option<OrderEntity> {
	let (operation_type, amount, price, offer_id, passive, selling, buying) =
		match &operation.detail {
			OperationDetail::ManageSellOffer {
				amount,
				price,
				offer_id,
				buying_asset_type,
				buying_asset_code,
				buying_asset_issuer,
				selling_asset_type,
				selling_asset_code,
				selling_asset_issuer,
			} => (
				"manage_sell_offer",
				amount,
				price,
				Some(offer_id.clone()),
				false,
				Asset::from_parts(
					selling_asset_type,
					selling_asset_code.as_deref(),
					selling_asset_issuer.as_deref(),
				),
				Asset::from_parts(
					buying_asset_type,
					buying_asset_code.as_deref(),
					buying_asset_issuer.as_deref(),
				),
			),
			OperationDetail::ManageBuyOffer {
				amount,
				price,
				offer_id,
				buying_asset_type,
				buying_asset_code,
				buying_asset_issuer,
				selling_asset_type,
				selling_asset_code,
				selling_asset_issuer,
			} => (
				"manage_buy_offer",
				amount,
				price,
				Some(offer_id.clone()),
				false,
				Asset::from_parts(
					selling_asset_type,
					selling_asset_code.as_deref(),
					selling_asset_issuer.as_deref(),
				),
				Asset::from_parts(
					buying_asset_type,
					buying_asset_code.as_deref(),
					buying_asset_issuer.as_deref(),
				),
			),
			OperationDetail::CreatePassiveSellOffer {
				amount,
				price,
				buying_asset_type,
				buying_asset_code,
				buying_asset_issuer,
				selling_asset_type,
				selling_asset_code,
				selling_asset_issuer,
			} => (
				"create_passive_sell_offer",
				amount,
				price,
				None,
				true,
				Asset::from_parts(
					selling_asset_type,
					selling_asset_code.as_deref(),
					selling_asset_issuer.as_deref(),
				),
				Asset::from_parts(
					buying_asset_type,
					buying_asset_code.as_deref(),
					buying_asset_issuer.as_deref(),
				),
			),
			_ => return None,
		};

	let describe = |asset: &Asset| match asset.code() {
		Some(code) => code.to_string(),
		None => asset.type_code().to_string(),
	};

	Some(OrderEntity {
		account: operation.source_account.clone(),
		operation_type: operation_type.to_string(),
		offer_id,
		selling_asset: describe(&selling),
		buying_asset: describe(&buying),
		amount: amount.clone(),
		price: price.clone(),
		passive,
		ledger,
		transaction_hash: operation.transaction_hash.clone(),
		timestamp: operation.created_at,
	})
}

#[async_trait::async_trait]
impl PipelineSpec for OrderPipeline {
	type Record = TransactionRecord;

	fn kind(&self) -> ResourceKind {
		ResourceKind::Order
	}

	fn endpoint(&self) -> StreamEndpoint {
		StreamEndpoint::Transactions
	}

	async fn open(&self, cursor: &str) -> Result<RecordStream<TransactionRecord>, HorizonError> {
		self.client.stream_transactions(cursor).await
	}

	fn cursor_of(&self, record: &TransactionRecord) -> String {
		record.paging_token.clone()
	}

	async fn process(
		&self,
		record: &TransactionRecord,
	) -> Result<Vec<serde_json::Value>, IngestError> {
		let operations = self.enricher.operations_for_transaction(record).await;
		let mut rows = Vec::new();
		for operation in &operations {
			if let Some(order) = order_entity(operation, record.ledger) {
				rows.push(serde_json::to_value(order).map_err(HorizonError::from)?);
			}
		}
		Ok(rows)
	}
}
