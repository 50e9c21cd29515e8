//! Run summaries and the optional JSON report file.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::BatchRunStats;

/// Failed identities listed in a summary before the rest are elided.
pub const PREVIEW_LIMIT: usize = 10;

/// Split `items` into the shown head and the count left out.
pub fn preview<T>(items: &[T]) -> (&[T], usize) {
    let shown = items.len().min(PREVIEW_LIMIT);
    (&items[..shown], items.len() - shown)
}

pub fn log_summary(label: &str, stats: &BatchRunStats, elapsed: Duration) {
    tracing::info!("── {} Summary ──", label);
    tracing::info!(
        "  {} succeeded, {} failed, {} total",
        stats.succeeded(),
        stats.failed(),
        stats.total()
    );
    tracing::info!("  success rate: {:.1}%", stats.success_rate() * 100.0);
    tracing::info!("  elapsed: {}", format_duration(elapsed));
    if stats.cancelled() {
        tracing::warn!(
            "  interrupted after {} of {} identities",
            stats.processed(),
            stats.total()
        );
    }

    let (shown, remaining) = preview(stats.failed_items());
    for item in shown {
        tracing::error!("  {} (id {}): {}", item.login_name, item.id, item.failure);
    }
    if remaining > 0 {
        tracing::error!("  ... and {} more", remaining);
    }
}

/// Everything a finished `import` or `verify` command produced.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub command: &'static str,
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<BatchRunStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<BatchRunStats>,
}

impl RunReport {
    pub fn new(command: &'static str, base_url: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            command,
            base_url: base_url.to_string(),
            started_at,
            finished_at: started_at,
            import: None,
            verification: None,
        }
    }

    /// Total failures across every batch in the run.
    pub fn failures(&self) -> usize {
        self.import.iter().chain(&self.verification).map(BatchRunStats::failed).sum()
    }
}

pub fn write_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
