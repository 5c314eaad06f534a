//! Ingestion Pipeline Module
//!
//! This module provides the core logic for continuously walking the upstream
//! query API and republishing normalized records downstream. It is composed of
//! several submodules, each responsible for a specific aspect of ingestion:
//!
//! - `pipeline`: The per-resource subscription pipeline (resolve cursor, stream, map, batch, publish, checkpoint).
//! - `cursor`: Start-cursor resolution, including the historical forward scan and probe validation.
//! - `retry`: Error classification and the backoff/resubscribe state machine.
//! - `checkpoint`: Durable per-resource cursor persistence.
//! - `progress`: Per-pipeline progress accounting and interval logging.
//!
//! Pipelines run one per resource kind on their own task and share only the
//! query client, checkpoint store, and publisher. Checkpoints advance only
//! after a batch has been accepted downstream, so a restart replays at most
//! one batch (at-least-once, safe because mapped records are deterministic).

/// Durable per-resource cursor persistence
pub mod checkpoint;
/// Start-cursor resolution and validation
pub mod cursor;
/// Per-resource subscription pipelines
pub mod pipeline;
/// Progress accounting
pub mod progress;
/// Error classification and backoff state machine
pub mod retry;
/// Shared types for the ingestion layer
pub mod types;

pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use cursor::CursorResolver;
pub use pipeline::*;
pub use retry::{RetryController, RetryPolicy};
pub use types::*;
