use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

use super::ProgressEvent;

/// Longest login name shown in the bar message before it is cut.
const DISPLAY_NAME_CHARS: usize = 15;

/// Print a line above the bar every this many items.
const MILESTONE_EVERY: usize = 100;

/// Console rendering of batch progress events.
pub struct BatchProgress {
    pb: ProgressBar,
    label: &'static str,
}

impl BatchProgress {
    pub fn new(label: &'static str, total: usize, no_progress_bar: bool) -> Self {
        Self {
            pb: create_progress_bar(no_progress_bar, total as u64),
            label,
        }
    }

    pub fn observe<T>(&self, event: &ProgressEvent<'_, T>) {
        let stats = event.stats;
        self.pb.set_position(stats.processed() as u64);
        self.pb.set_message(format!(
            "{} | ok {} failed {} ({:.1}%)",
            display_name(&event.identity.login_name),
            stats.succeeded(),
            stats.failed(),
            stats.success_rate() * 100.0
        ));

        if let Err(failure) = event.outcome {
            self.pb.suspend(|| {
                tracing::error!(
                    login_name = %event.identity.login_name,
                    "{} failed: {}",
                    self.label,
                    failure
                )
            });
        }

        if is_milestone(event.index, event.total) {
            self.pb.suspend(|| {
                tracing::info!(
                    "{}: {}/{} processed, {} succeeded, {} failed ({:.1}%)",
                    self.label,
                    stats.processed(),
                    event.total,
                    stats.succeeded(),
                    stats.failed(),
                    stats.success_rate() * 100.0
                )
            });
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    #[cfg(test)]
    fn bar(&self) -> &ProgressBar {
        &self.pb
    }
}

/// Hidden when the user passed `--no-progress-bar` or stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

/// Login name cut to a fixed width for the bar message.
pub fn display_name(login_name: &str) -> String {
    if login_name.chars().count() <= DISPLAY_NAME_CHARS {
        return login_name.to_string();
    }
    let head: String = login_name.chars().take(DISPLAY_NAME_CHARS).collect();
    format!("{}...", head)
}

fn is_milestone(index: usize, total: usize) -> bool {
    let position = index + 1;
    position % MILESTONE_EVERY == 0 || position == total
}
