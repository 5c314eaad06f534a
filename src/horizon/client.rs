//!
//! HTTP client for the Horizon-style chain query service.
//!
//! This module provides an async client for walking the upstream query API.
//! Record streams are cursor-paged pull loops running on their own task and
//! feeding a bounded channel, so a slow consumer applies backpressure to the
//! poll loop instead of buffering unboundedly. All methods are async and
//! designed for use with Tokio.

use super::types::*;
use super::RecordStream;
use futures_util::SinkExt;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of in-flight records buffered between the poll loop and the consumer.
const STREAM_BUFFER: usize = 256;

/// Records that carry their own paging token.
trait PagedRecord {
	fn paging_token(&self) -> &str;
}

impl PagedRecord for LedgerRecord {
	fn paging_token(&self) -> &str {
		&self.paging_token
	}
}

impl PagedRecord for TransactionRecord {
	fn paging_token(&self) -> &str {
		&self.paging_token
	}
}

impl PagedRecord for TradeRecord {
	fn paging_token(&self) -> &str {
		&self.paging_token
	}
}

/// Chain query service client
#[derive(Clone)]
pub struct HorizonClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the query service, without a trailing slash.
	base_url: String,
	/// Records requested per page while streaming.
	page_limit: u32,
	/// Delay between polls when the stream has caught up with the live tail.
	poll_interval: Duration,
}

impl HorizonClient {
	/// Create a new query service client.
	///
	/// # Arguments
	/// * `base_url` - Base URL of the query service.
	/// * `page_limit` - Records requested per page while streaming.
	/// * `poll_interval` - Delay between polls once caught up with the tail.
	pub fn new(base_url: String, page_limit: u32, poll_interval: Duration) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			page_limit,
			poll_interval,
		}
	}

	/// Open a continuous record stream over a paged collection endpoint.
	///
	/// The returned stream yields records in upstream order starting after
	/// `cursor`. An empty page means the stream has caught up; the poll loop
	/// sleeps and retries. The first upstream error is forwarded and the
	/// stream ends — resubscription is the caller's concern.
	fn stream_collection<T>(&self, path: &'static str, cursor: &str) -> RecordStream<T>
	where
		T: PagedRecord + DeserializeOwned + Send + 'static,
	{
		let (mut sender, receiver) = futures::channel::mpsc::channel(STREAM_BUFFER);
		let client = self.clone();
		let mut cursor = cursor.to_string();

		tokio::spawn(async move {
			loop {
				match client.fetch_page::<T>(path, &cursor).await {
					Ok(records) => {
						if records.is_empty() {
							tokio::time::sleep(client.poll_interval).await;
							continue;
						}
						for record in records {
							cursor = record.paging_token().to_string();
							if sender.send(Ok(record)).await.is_err() {
								debug!("Consumer dropped {} stream, stopping poll loop", path);
								return;
							}
						}
					}
					Err(e) => {
						// Forward the error and end the stream; the retry
						// layer resubscribes from the last checkpoint.
						let _ = sender.send(Err(e)).await;
						return;
					}
				}
			}
		});

		Box::pin(receiver)
	}

	/// Fetch one page of a collection endpoint, ascending from `cursor`.
	async fn fetch_page<T: DeserializeOwned>(
		&self,
		path: &str,
		cursor: &str,
	) -> Result<Vec<T>, HorizonError> {
		let url = format!("{}/{}", self.base_url, path);
		let limit = self.page_limit.to_string();
		let response = self
			.http_client
			.get(&url)
			.query(&[
				("cursor", cursor),
				("order", "asc"),
				("limit", limit.as_str()),
			])
			.send()
			.await?;

		let body = Self::check_status(response).await?.json().await?;
		Self::embedded_records(body)
	}

	/// Map upstream HTTP statuses onto the error taxonomy.
	///
	/// 429 becomes a rate-limit error carrying the `Retry-After` duration,
	/// 400 an invalid-cursor error, 404 a not-found error; any other
	/// non-success status is surfaced as a transient HTTP error.
	async fn check_status(response: Response) -> Result<Response, HorizonError> {
		match response.status() {
			StatusCode::TOO_MANY_REQUESTS => {
				let retry_after = response
					.headers()
					.get("Retry-After")
					.and_then(|v| v.to_str().ok())
					.and_then(|v| v.parse::<u64>().ok())
					.map(Duration::from_secs)
					.unwrap_or(Duration::from_secs(1));
				warn!("Upstream rate limit hit, retry after {:?}", retry_after);
				Err(HorizonError::RateLimited { retry_after })
			}
			StatusCode::BAD_REQUEST => {
				let detail = response.text().await.unwrap_or_default();
				Err(HorizonError::BadCursor(detail))
			}
			StatusCode::NOT_FOUND => {
				let detail = response.text().await.unwrap_or_default();
				Err(HorizonError::NotFound(detail))
			}
			_ => Ok(response.error_for_status()?),
		}
	}

	/// Extract the `_embedded.records` array of a collection response.
	fn embedded_records<T: DeserializeOwned>(
		body: serde_json::Value,
	) -> Result<Vec<T>, HorizonError> {
		let records = body
			.get("_embedded")
			.and_then(|e| e.get("records"))
			.cloned()
			.ok_or_else(|| {
				HorizonError::Malformed("collection response missing _embedded.records".to_string())
			})?;
		Ok(serde_json::from_value(records)?)
	}

	/// Fetch one resource by URL path.
	async fn fetch_one<T: DeserializeOwned>(&self, path: &str) -> Result<T, HorizonError> {
		let url = format!("{}/{}", self.base_url, path);
		let response = self.http_client.get(&url).send().await?;
		Ok(Self::check_status(response).await?.json().await?)
	}

	/// Fetch every record of a sub-collection, ascending.
	async fn fetch_collection<T: DeserializeOwned>(
		&self,
		path: &str,
	) -> Result<Vec<T>, HorizonError> {
		let url = format!("{}/{}", self.base_url, path);
		let limit = self.page_limit.to_string();
		let response = self
			.http_client
			.get(&url)
			.query(&[("order", "asc"), ("limit", limit.as_str())])
			.send()
			.await?;

		let body = Self::check_status(response).await?.json().await?;
		Self::embedded_records(body)
	}
}

#[async_trait::async_trait]
impl super::ChainQueryClient for HorizonClient {
	async fn stream_ledgers(
		&self,
		cursor: &str,
	) -> Result<RecordStream<LedgerRecord>, HorizonError> {
		debug!("Opening ledger stream from cursor {}", cursor);
		Ok(self.stream_collection(StreamEndpoint::Ledgers.path(), cursor))
	}

	async fn stream_transactions(
		&self,
		cursor: &str,
	) -> Result<RecordStream<TransactionRecord>, HorizonError> {
		debug!("Opening transaction stream from cursor {}", cursor);
		Ok(self.stream_collection(StreamEndpoint::Transactions.path(), cursor))
	}

	async fn stream_trades(&self, cursor: &str) -> Result<RecordStream<TradeRecord>, HorizonError> {
		debug!("Opening trade stream from cursor {}", cursor);
		Ok(self.stream_collection(StreamEndpoint::Trades.path(), cursor))
	}

	async fn ledger(&self, sequence: u64) -> Result<LedgerRecord, HorizonError> {
		self.fetch_one(&format!("ledgers/{}", sequence)).await
	}

	async fn transactions_for_ledger(
		&self,
		sequence: u64,
	) -> Result<Vec<TransactionRecord>, HorizonError> {
		self.fetch_collection(&format!("ledgers/{}/transactions", sequence))
			.await
	}

	async fn operations_for_transaction(
		&self,
		hash: &str,
	) -> Result<Vec<OperationRecord>, HorizonError> {
		self.fetch_collection(&format!("transactions/{}/operations", hash))
			.await
	}

	async fn operations_for_ledger(
		&self,
		sequence: u64,
	) -> Result<Vec<OperationRecord>, HorizonError> {
		self.fetch_collection(&format!("ledgers/{}/operations", sequence))
			.await
	}

	async fn effects_for_operation(
		&self,
		operation_id: &str,
	) -> Result<Vec<EffectRecord>, HorizonError> {
		self.fetch_collection(&format!("operations/{}/effects", operation_id))
			.await
	}

	async fn account(&self, account_id: &str) -> Result<Option<AccountRecord>, HorizonError> {
		match self.fetch_one(&format!("accounts/{}", account_id)).await {
			Ok(account) => Ok(Some(account)),
			Err(HorizonError::NotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn asset(&self, code: &str, issuer: &str) -> Result<Option<AssetRecord>, HorizonError> {
		let url = format!("{}/assets", self.base_url);
		let response = self
			.http_client
			.get(&url)
			.query(&[("asset_code", code), ("asset_issuer", issuer), ("limit", "1")])
			.send()
			.await?;

		let body = Self::check_status(response).await?.json().await?;
		let mut records: Vec<AssetRecord> = Self::embedded_records(body)?;
		Ok(if records.is_empty() {
			None
		} else {
			Some(records.remove(0))
		})
	}

	async fn probe(&self, endpoint: StreamEndpoint, cursor: &str) -> Result<(), HorizonError> {
		let url = format!("{}/{}", self.base_url, endpoint.path());
		let response = self
			.http_client
			.get(&url)
			.query(&[("cursor", cursor), ("order", "asc"), ("limit", "1")])
			.send()
			.await?;

		Self::check_status(response).await?;
		Ok(())
	}
}
