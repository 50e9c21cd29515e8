//! Sequential batch driver.
//!
//! Walks an identity list in order, runs one operation per identity, records
//! the outcome and sleeps for the pacing interval before the next item. A
//! failing or panicking operation is recorded and the run moves on.

pub mod progress;
pub mod stats;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

pub use self::stats::BatchRunStats;
use crate::outcome::{Failure, FailureKind};
use crate::types::Identity;

/// Emitted once per processed identity, after its outcome is recorded.
#[derive(Debug)]
pub struct ProgressEvent<'a, T> {
    /// 0-based position in the input.
    pub index: usize,
    pub total: usize,
    pub identity: &'a Identity,
    pub outcome: &'a Result<T, Failure>,
    pub stats: &'a BatchRunStats,
}

/// Run `operation` over `identities` one at a time.
///
/// `cancel` is checked before each item and interrupts the pacing sleep; a
/// cancelled run returns the partial stats with `cancelled` set. The
/// progress callback only observes.
pub async fn run_batch<T, F, Fut, P>(
    identities: &[Identity],
    mut operation: F,
    pacing: Duration,
    cancel: &CancellationToken,
    mut on_progress: P,
) -> BatchRunStats
where
    F: FnMut(Identity) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
    P: FnMut(&ProgressEvent<'_, T>),
{
    let total = identities.len();
    let mut stats = BatchRunStats::new(total);

    for (index, identity) in identities.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(
                processed = stats.processed(),
                total,
                "Shutdown requested, stopping batch"
            );
            stats.mark_cancelled();
            break;
        }

        // Calling the closure inside the guarded future also catches panics
        // raised before it hands back its future.
        let outcome = match AssertUnwindSafe(async { operation(identity.clone()).await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(Failure::new(
                FailureKind::Unknown,
                format!("operation panicked: {}", panic_message(panic.as_ref())),
            )),
        };

        match &outcome {
            Ok(_) => stats.record_success(identity),
            Err(failure) => stats.record_failure(identity, failure.clone()),
        }

        on_progress(&ProgressEvent {
            index,
            total,
            identity,
            outcome: &outcome,
            stats: &stats,
        });

        if index + 1 < total && !pacing.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(pacing) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    stats
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
