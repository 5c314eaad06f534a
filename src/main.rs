mod config;
mod horizon;
mod ingest;
mod mapper;
mod publisher;
#[cfg(test)]
mod testutil;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::IngestConfig;
use crate::horizon::{ChainQueryClient, HorizonClient};
use crate::ingest::{
	AddressPipeline, AssetPipeline, CheckpointStore, CursorResolver, FileCheckpointStore,
	FunctionCallPipeline, IngestError, LedgerPipeline, OrderPipeline, ResourceKind,
	ShutdownSignal, SubscriptionPipeline, TradePipeline, TransactionPipeline,
};
use crate::mapper::EntityEnricher;
use crate::publisher::{HttpPublisher, Publisher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_target(false)
		.init();

	info!("Starting chain ingestion service");

	let config_path = std::env::args()
		.nth(1)
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from("config/ingest.json"));
	let config = IngestConfig::load(&config_path)?;

	let client: Arc<dyn ChainQueryClient> = Arc::new(HorizonClient::new(
		config.horizon_url.clone(),
		config.page_limit,
		config.poll_interval(),
	));
	let store: Arc<dyn CheckpointStore> =
		Arc::new(FileCheckpointStore::new(config.data_dir.clone()));
	let publisher: Arc<dyn Publisher> = Arc::new(HttpPublisher::new(config.publisher_url.clone()));
	let enricher = Arc::new(EntityEnricher::new(client.clone(), config.cache_capacity));
	let resolver = Arc::new(CursorResolver::new(
		client.clone(),
		store.clone(),
		config.historical_ledger,
		config.probe_delay(),
	));

	info!("Created query client for {}", config.horizon_url);
	if config.historical_ledger > 0 {
		info!(
			"Historical replay enabled from ledger {}",
			config.historical_ledger
		);
	}

	// One long-lived task per resource pipeline. A fatal condition in any of
	// them trips the shared shutdown signal and the rest stop between records.
	let shutdown = ShutdownSignal::new();
	let mut pipelines: JoinSet<Result<(), IngestError>> = JoinSet::new();

	pipelines.spawn(
		SubscriptionPipeline::new(
			LedgerPipeline::new(client.clone()),
			resolver.clone(),
			store.clone(),
			publisher.clone(),
			config.retry_policy(),
			config.batch_size(ResourceKind::Ledger),
			config.publish_checkpoints,
			shutdown.clone(),
		)
		.run(),
	);
	pipelines.spawn(
		SubscriptionPipeline::new(
			TransactionPipeline::new(client.clone()),
			resolver.clone(),
			store.clone(),
			publisher.clone(),
			config.retry_policy(),
			config.batch_size(ResourceKind::Transaction),
			config.publish_checkpoints,
			shutdown.clone(),
		)
		.run(),
	);
	pipelines.spawn(
		SubscriptionPipeline::new(
			TradePipeline::new(client.clone()),
			resolver.clone(),
			store.clone(),
			publisher.clone(),
			config.retry_policy(),
			config.batch_size(ResourceKind::Trade),
			config.publish_checkpoints,
			shutdown.clone(),
		)
		.run(),
	);
	pipelines.spawn(
		SubscriptionPipeline::new(
			FunctionCallPipeline::new(client.clone(), enricher.clone()),
			resolver.clone(),
			store.clone(),
			publisher.clone(),
			config.retry_policy(),
			config.batch_size(ResourceKind::FunctionCall),
			config.publish_checkpoints,
			shutdown.clone(),
		)
		.run(),
	);
	pipelines.spawn(
		SubscriptionPipeline::new(
			AddressPipeline::new(client.clone(), enricher.clone()),
			resolver.clone(),
			store.clone(),
			publisher.clone(),
			config.retry_policy(),
			config.batch_size(ResourceKind::Address),
			config.publish_checkpoints,
			shutdown.clone(),
		)
		.run(),
	);
	pipelines.spawn(
		SubscriptionPipeline::new(
			AssetPipeline::new(client.clone(), enricher.clone()),
			resolver.clone(),
			store.clone(),
			publisher.clone(),
			config.retry_policy(),
			config.batch_size(ResourceKind::Asset),
			config.publish_checkpoints,
			shutdown.clone(),
		)
		.run(),
	);
	pipelines.spawn(
		SubscriptionPipeline::new(
			OrderPipeline::new(client.clone(), enricher.clone()),
			resolver.clone(),
			store.clone(),
			publisher.clone(),
			config.retry_policy(),
			config.batch_size(ResourceKind::Order),
			config.publish_checkpoints,
			shutdown.clone(),
		)
		.run(),
	);

	info!("Spawned {} ingestion pipelines", pipelines.len());

	let mut failure: Option<anyhow::Error> = None;
	while let Some(result) = pipelines.join_next().await {
		match result {
			Ok(Ok(())) => {}
			Ok(Err(e)) => {
				error!("Pipeline stopped with fatal error: {}", e);
				shutdown.trigger();
				failure.get_or_insert(e.into());
			}
			Err(e) => {
				error!("Pipeline task failed: {}", e);
				shutdown.trigger();
				failure.get_or_insert(e.into());
			}
		}
	}

	match failure {
		Some(e) => Err(e),
		None => {
			info!("All pipelines stopped");
			Ok(())
		}
	}
}
