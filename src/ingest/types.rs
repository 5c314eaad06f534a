use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::horizon::HorizonError;
use crate::publisher::PublishError;

/// Resource types republished downstream.
///
/// Each kind has its own independent cursor, checkpoint, and publish path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Ledger,
    Transaction,
    Address,
    Asset,
    Trade,
    Order,
    FunctionCall,
}

impl ResourceKind {
    /// Stable key used for checkpoint files and logging.
    pub fn key(&self) -> &'static str {
        match self {
            ResourceKind::Ledger => "ledgers",
            ResourceKind::Transaction => "transactions",
            ResourceKind::Address => "addresses",
            ResourceKind::Asset => "assets",
            ResourceKind::Trade => "trades",
            ResourceKind::Order => "orders",
            ResourceKind::FunctionCall => "function_calls",
        }
    }

    /// Downstream ingestion path for batches of this kind.
    pub fn resource_path(&self) -> &'static str {
        match self {
            ResourceKind::Ledger => "ledgers",
            ResourceKind::Transaction => "transactions",
            ResourceKind::Address => "addresses",
            ResourceKind::Asset => "assets",
            ResourceKind::Trade => "trades",
            ResourceKind::Order => "orders",
            ResourceKind::FunctionCall => "function-calls",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error types for the ingestion pipelines
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("chain query error: {0}")]
    Query(#[from] HorizonError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("incorrect cursor for {resource}: {detail}")]
    InvalidCursor {
        resource: ResourceKind,
        detail: String,
    },

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("subscription stream ended unexpectedly")]
    StreamEnded,
}

/// Failure classification driving the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Configuration/contract violation; stop the process, never retry.
    Fatal,
    /// Upstream throttling; retry after exactly the mandated duration.
    RateLimited(Duration),
    /// Network/IO or malformed response; retry with exponential backoff.
    Transient,
}

impl IngestError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            IngestError::Query(HorizonError::RateLimited { retry_after }) => {
                FailureKind::RateLimited(*retry_after)
            }
            IngestError::Query(HorizonError::BadCursor(_))
            | IngestError::InvalidCursor { .. }
            | IngestError::RetriesExhausted { .. } => FailureKind::Fatal,
            _ => FailureKind::Transient,
        }
    }
}

/// Why a subscription attempt returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// No events within the idle window; resubscribe after the initial backoff.
    Idle,
    /// The process-wide shutdown signal fired.
    Shutdown,
}

/// Process-wide shutdown signal.
///
/// Handed to every pipeline at construction; a fatal condition in any
/// pipeline triggers it and the others stop between records.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signal every pipeline to stop.
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the signal fires.
    pub async fn triggered(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
