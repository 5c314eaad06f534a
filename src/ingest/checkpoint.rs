use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ingest::types::{IngestError, ResourceKind};

/// Durable cursor storage, one entry per resource kind.
///
/// Read once at subscription start; overwritten only after a batch has been
/// accepted downstream.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
	async fn get(&self, kind: ResourceKind) -> Result<Option<String>, IngestError>;
	async fn set(&self, kind: ResourceKind, cursor: &str) -> Result<(), IngestError>;
}

/// Serialized checkpoint file contents.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
	cursor: String,
	updated_at: String,
}

/// File-based implementation of CheckpointStore
pub struct FileCheckpointStore {
	data_dir: PathBuf,
}

impl FileCheckpointStore {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn checkpoint_filename(&self, kind: ResourceKind) -> PathBuf {
		self.data_dir.join(format!("checkpoint_{}.json", kind.key()))
	}
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
	async fn get(&self, kind: ResourceKind) -> Result<Option<String>, IngestError> {
		let filename = self.checkpoint_filename(kind);
		if !filename.exists() {
			return Ok(None);
		}

		let content = tokio::fs::read_to_string(&filename).await.map_err(|e| {
			IngestError::Checkpoint(format!("Failed to read checkpoint file: {}", e))
		})?;

		let checkpoint: CheckpointFile = serde_json::from_str(&content).map_err(|e| {
			IngestError::Checkpoint(format!("Failed to parse checkpoint file: {}", e))
		})?;

		debug!(
			"Loaded {} checkpoint {} (written {})",
			kind, checkpoint.cursor, checkpoint.updated_at
		);
		Ok(Some(checkpoint.cursor))
	}

	async fn set(&self, kind: ResourceKind, cursor: &str) -> Result<(), IngestError> {
		tokio::fs::create_dir_all(&self.data_dir).await.map_err(|e| {
			IngestError::Checkpoint(format!("Failed to create checkpoint directory: {}", e))
		})?;

		let checkpoint = CheckpointFile {
			cursor: cursor.to_string(),
			updated_at: chrono::Utc::now().to_rfc3339(),
		};

		let content = serde_json::to_string_pretty(&checkpoint).map_err(|e| {
			IngestError::Checkpoint(format!("Failed to serialize checkpoint: {}", e))
		})?;

		let filename = self.checkpoint_filename(kind);
		tokio::fs::write(&filename, content).await.map_err(|e| {
			IngestError::Checkpoint(format!("Failed to write checkpoint file: {}", e))
		})?;

		info!("Checkpoint saved: {} advanced to {}", kind, cursor);
		Ok(())
	}
}
