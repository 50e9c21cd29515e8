use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::http::{RawResponse, TransportError};

/// HTTP statuses treated as transient.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry decision returned by the outcome classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Stop,
}

/// Bounded linear backoff: after failed attempt `n` the loop waits
/// `base_delay * n` before trying again.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Timeouts, refused connections and retryable statuses are retried;
    /// every other outcome is final, success or not.
    pub fn classify(&self, outcome: &Result<RawResponse, TransportError>) -> RetryAction {
        match outcome {
            Ok(response) if self.is_retryable_status(response.status) => RetryAction::Retry,
            Ok(_) => RetryAction::Stop,
            Err(e) if e.is_retryable() => RetryAction::Retry,
            Err(_) => RetryAction::Stop,
        }
    }
}

/// Bookkeeping for one logical operation.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    backoff: Duration,
}

/// Retry an async operation with linear backoff.
///
/// - `policy`: attempt budget and delay
/// - `cancel`: checked before each fresh attempt; once cancelled the last
///   outcome is returned as-is
/// - `classifier`: inspects an outcome and returns `Retry` or `Stop`
/// - `operation`: the async closure to retry
///
/// When attempts run out the last outcome is returned unchanged, so callers
/// classify the real final response rather than a wrapper error.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    classifier: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&Result<T, E>) -> RetryAction,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut state = RetryState::default();

    loop {
        state.attempt += 1;
        let outcome = operation().await;

        if classifier(&outcome) == RetryAction::Stop {
            return outcome;
        }
        if state.attempt >= max_attempts {
            tracing::warn!(
                attempts = state.attempt,
                backoff_ms = state.backoff.as_millis() as u64,
                "Retries exhausted"
            );
            return outcome;
        }

        let delay = policy.delay_for_attempt(state.attempt);
        tracing::warn!(
            "Retryable outcome (attempt {}/{}), retrying in {:.1}s",
            state.attempt,
            max_attempts,
            delay.as_secs_f64(),
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {}
        }
        state.backoff += delay;

        if cancel.is_cancelled() {
            tracing::info!("Shutdown requested, not starting another attempt");
            return outcome;
        }
    }
}

/// Run an HTTP exchange under `policy`.
pub async fn execute<F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> Result<RawResponse, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawResponse, TransportError>>,
{
    retry_with_backoff(
        policy,
        cancel,
        |outcome| {
            let action = policy.classify(outcome);
            if action == RetryAction::Retry {
                match outcome {
                    Ok(r) => tracing::debug!(status = r.status, "Transient HTTP status"),
                    Err(e) => tracing::debug!("Transient transport error: {}", e),
                }
            }
            action
        },
        operation,
    )
    .await
}
