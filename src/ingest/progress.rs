//! Progress tracking for ingestion pipelines.
//!
//! Records how many upstream records and published batches a pipeline has
//! handled and where its checkpoint stands, and logs progress at intervals so
//! a long-running pipeline stays observable without flooding the logs.

use tracing::info;

use crate::ingest::types::ResourceKind;

/// Per-pipeline progress accounting.
#[derive(Debug, Clone)]
pub struct IngestProgressTracker {
    kind: ResourceKind,
    /// Upstream records consumed.
    records_processed: u64,
    /// Rows emitted downstream (derived pipelines emit 0..n rows per record).
    rows_published: u64,
    /// Batches accepted downstream.
    batches_published: u64,
    /// Cursor of the last checkpointed batch.
    last_checkpoint: Option<String>,
    /// Records consumed at the last progress log line.
    last_logged: u64,
}

impl IngestProgressTracker {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            records_processed: 0,
            rows_published: 0,
            batches_published: 0,
            last_checkpoint: None,
            last_logged: 0,
        }
    }

    /// Record one consumed upstream record.
    pub fn record_processed(&mut self) {
        self.records_processed += 1;
    }

    /// Record a successfully published and checkpointed batch.
    pub fn record_batch(&mut self, rows: usize, cursor: &str) {
        self.rows_published += rows as u64;
        self.batches_published += 1;
        self.last_checkpoint = Some(cursor.to_string());
    }

    /// Log progress every 1000 records, or when forced.
    pub fn log_progress(&mut self, force: bool) {
        let since_last = self.records_processed.saturating_sub(self.last_logged);
        if (force || since_last >= 1000) && self.records_processed > 0 {
            info!(
                "{} progress: {} records, {} rows in {} batches, checkpoint {}",
                self.kind,
                self.records_processed,
                self.rows_published,
                self.batches_published,
                self.last_checkpoint.as_deref().unwrap_or("-")
            );
            self.last_logged = self.records_processed;
        }
    }

    /// Human-readable summary for shutdown logging.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} records, {} rows in {} batches{}",
            self.kind,
            self.records_processed,
            self.rows_published,
            self.batches_published,
            match &self.last_checkpoint {
                Some(cursor) => format!(", checkpoint {}", cursor),
                None => String::new(),
            }
        )
    }
}
