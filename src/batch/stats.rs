use serde::Serialize;

use crate::outcome::Failure;
use crate::types::Identity;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub id: String,
    pub login_name: String,
    pub failure: Failure,
}

/// Running counts for one batch. Counts only ever grow, and
/// `processed == succeeded + failed` holds after every record call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchRunStats {
    total: usize,
    succeeded: usize,
    failed: usize,
    processed: usize,
    succeeded_items: Vec<String>,
    failed_items: Vec<FailedItem>,
    cancelled: bool,
}

impl BatchRunStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub(crate) fn record_success(&mut self, identity: &Identity) {
        debug_assert!(self.processed < self.total);
        self.succeeded += 1;
        self.processed += 1;
        self.succeeded_items.push(identity.login_name.clone());
    }

    pub(crate) fn record_failure(&mut self, identity: &Identity, failure: Failure) {
        debug_assert!(self.processed < self.total);
        self.failed += 1;
        self.processed += 1;
        self.failed_items.push(FailedItem {
            id: identity.id.clone(),
            login_name: identity.login_name.clone(),
            failure,
        });
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    #[cfg(test)]
    pub fn succeeded_items(&self) -> &[String] {
        &self.succeeded_items
    }

    pub fn failed_items(&self) -> &[FailedItem] {
        &self.failed_items
    }

    /// True when the run stopped before reaching the end of its input.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Fraction of processed items that succeeded; 0.0 before any item.
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.processed as f64
    }
}
