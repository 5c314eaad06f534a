//! Error classification and the backoff/resubscribe state machine.
//!
//! Every subscription runs under a `RetryController`. Errors are classified
//! as fatal (stop the process), rate-limited (wait exactly the mandated
//! duration, free of charge), or transient (exponential backoff with an
//! optional attempt ceiling that escalates to fatal). Idle subscriptions are
//! resubscribed after the initial backoff. Resubscription always restarts
//! from the last successfully checkpointed cursor, never an in-memory
//! position, so an error never loses or skips progress.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::ingest::types::{FailureKind, IngestError, ResourceKind, ShutdownSignal};

/// Backoff and retry tunables for one pipeline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Transient attempts allowed before escalating to fatal; <= 0 retries forever.
    pub retries_on_error: i64,
    /// The idle window is `max_backoff * (1 + idle_multiplier)`.
    pub idle_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            retries_on_error: 10,
            idle_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying transient attempt `attempt` (1-based):
    /// `initial_backoff * 2^attempt`, capped at `max_backoff`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let doubled = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt));
        doubled.min(self.max_backoff)
    }

    /// Whether transient attempt `attempt` exceeds the configured ceiling.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.retries_on_error > 0 && i64::from(attempt) > self.retries_on_error
    }

    /// How long a subscription may stay silent before it counts as idle.
    pub fn idle_window(&self) -> Duration {
        self.max_backoff.saturating_mul(1 + self.idle_multiplier)
    }
}

/// Retry state, tracked for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Subscribed,
    Erred,
    BackingOff,
    Resubscribing,
    FatalStop,
}

/// Per-pipeline retry state machine.
pub struct RetryController {
    kind: ResourceKind,
    policy: RetryPolicy,
    shutdown: ShutdownSignal,
    attempt: u32,
    state: RetryState,
}

impl RetryController {
    pub fn new(kind: ResourceKind, policy: RetryPolicy, shutdown: ShutdownSignal) -> Self {
        Self {
            kind,
            policy,
            shutdown,
            attempt: 0,
            state: RetryState::Resubscribing,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Transient attempts consumed since the last sustained success.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Record that the subscription is live.
    pub fn on_subscribed(&mut self) {
        self.state = RetryState::Subscribed;
    }

    /// Record sustained success (a batch accepted downstream); resets the
    /// transient attempt counter.
    pub fn on_success(&mut self) {
        self.attempt = 0;
    }

    /// Handle an idle subscription: wait the initial backoff, then
    /// resubscribe. Returns false if shutdown fired during the wait.
    pub async fn on_idle(&mut self) -> bool {
        info!(
            "{} subscription idle, resubscribing after {:?}",
            self.kind, self.policy.initial_backoff
        );
        self.state = RetryState::BackingOff;
        let keep_going = self.sleep_or_shutdown(self.policy.initial_backoff).await;
        self.state = RetryState::Resubscribing;
        keep_going
    }

    /// Classify a subscription error and delay accordingly.
    ///
    /// Returns `Err` only for fatal conditions (including an exhausted retry
    /// budget); on `Ok(())` the caller should resubscribe from the last
    /// checkpointed cursor.
    pub async fn on_error(&mut self, err: IngestError) -> Result<(), IngestError> {
        self.state = RetryState::Erred;

        match err.failure_kind() {
            FailureKind::Fatal => {
                error!("{} pipeline hit fatal error: {}", self.kind, err);
                self.state = RetryState::FatalStop;
                Err(err)
            }
            FailureKind::RateLimited(retry_after) => {
                // The upstream mandated this delay; it does not consume the
                // retry budget.
                warn!(
                    "{} pipeline rate limited, resubscribing after {:?}",
                    self.kind, retry_after
                );
                self.state = RetryState::BackingOff;
                self.sleep_or_shutdown(retry_after).await;
                self.state = RetryState::Resubscribing;
                Ok(())
            }
            FailureKind::Transient => {
                self.attempt += 1;
                if self.policy.is_exhausted(self.attempt) {
                    error!(
                        "{} pipeline exhausted {} retries: {}",
                        self.kind, self.attempt - 1, err
                    );
                    self.state = RetryState::FatalStop;
                    return Err(IngestError::RetriesExhausted {
                        attempts: self.attempt,
                        last: err.to_string(),
                    });
                }

                let delay = self.policy.backoff_delay(self.attempt);
                warn!(
                    "{} pipeline error (attempt {}), resubscribing after {:?}: {}",
                    self.kind, self.attempt, delay, err
                );
                self.state = RetryState::BackingOff;
                self.sleep_or_shutdown(delay).await;
                self.state = RetryState::Resubscribing;
                Ok(())
            }
        }
    }

    /// Sleep for `delay`, waking early on shutdown. Returns false when
    /// shutdown fired.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.triggered() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::HorizonError;

    fn doubling_policy() -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1600),
            retries_on_error: 5,
            idle_multiplier: 2,
        }
    }

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        let policy = doubling_policy();
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| policy.backoff_delay(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 1600]);
        assert!(!policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }

    #[test]
    fn zero_ceiling_retries_forever() {
        let policy = RetryPolicy {
            retries_on_error: 0,
            ..doubling_policy()
        };
        assert!(!policy.is_exhausted(1_000_000));
    }

    #[test]
    fn idle_window_scales_max_backoff() {
        let policy = doubling_policy();
        assert_eq!(policy.idle_window(), Duration::from_millis(4800));
    }

    fn fast_policy(retries: i64) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            retries_on_error: retries,
            idle_multiplier: 1,
        }
    }

    #[tokio::test]
    async fn escalates_to_fatal_after_ceiling() {
        let mut controller = RetryController::new(
            ResourceKind::Ledger,
            fast_policy(2),
            ShutdownSignal::new(),
        );

        controller.on_error(IngestError::StreamEnded).await.unwrap();
        controller.on_error(IngestError::StreamEnded).await.unwrap();
        let err = controller
            .on_error(IngestError::StreamEnded)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::RetriesExhausted { .. }));
        assert_eq!(err.failure_kind(), FailureKind::Fatal);
        assert_eq!(controller.state(), RetryState::FatalStop);
    }

    #[tokio::test]
    async fn rate_limit_does_not_consume_retry_budget() {
        let mut controller = RetryController::new(
            ResourceKind::Ledger,
            fast_policy(2),
            ShutdownSignal::new(),
        );

        for _ in 0..5 {
            let rate_limited = IngestError::Query(HorizonError::RateLimited {
                retry_after: Duration::from_millis(1),
            });
            controller.on_error(rate_limited).await.unwrap();
        }
        assert_eq!(controller.attempts(), 0);

        controller.on_error(IngestError::StreamEnded).await.unwrap();
        assert_eq!(controller.attempts(), 1);
    }

    #[tokio::test]
    async fn success_resets_attempt_counter() {
        let mut controller = RetryController::new(
            ResourceKind::Ledger,
            fast_policy(2),
            ShutdownSignal::new(),
        );

        controller.on_error(IngestError::StreamEnded).await.unwrap();
        controller.on_error(IngestError::StreamEnded).await.unwrap();
        controller.on_success();

        // The full budget is available again.
        controller.on_error(IngestError::StreamEnded).await.unwrap();
        controller.on_error(IngestError::StreamEnded).await.unwrap();
        assert!(controller
            .on_error(IngestError::StreamEnded)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn fatal_errors_are_never_retried() {
        let mut controller = RetryController::new(
            ResourceKind::Ledger,
            fast_policy(0),
            ShutdownSignal::new(),
        );

        let err = controller
            .on_error(IngestError::InvalidCursor {
                resource: ResourceKind::Ledger,
                detail: "bad".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidCursor { .. }));
    }
}
