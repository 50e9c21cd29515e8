//! Stop a batch between identities when the operator asks.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the run token. The identity in
//! flight completes and the summary still covers everything processed so
//! far. Any later signal exits with status 130.

use tokio_util::sync::CancellationToken;

/// Exit status for an operator abort, as a shell reports SIGINT.
const ABORT_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalResponse {
    /// Let the current identity finish, then stop.
    Drain,
    /// Leave immediately without a summary.
    Abort,
}

fn respond_to(signals_seen: u32) -> SignalResponse {
    if signals_seen <= 1 {
        SignalResponse::Drain
    } else {
        SignalResponse::Abort
    }
}

/// Registered termination signals. Registration happens up front so a
/// failure surfaces as a startup error.
struct TerminationSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    fn register() -> anyhow::Result<Self> {
        #[cfg(unix)]
        {
            use anyhow::Context;
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                terminate: signal(SignalKind::terminate())
                    .context("Could not listen for SIGTERM")?,
                hangup: signal(SignalKind::hangup()).context("Could not listen for SIGHUP")?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Name of the next signal received, or `None` once listening fails.
    async fn next(&mut self) -> Option<&'static str> {
        #[cfg(unix)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result.ok().map(|_| "SIGINT"),
                _ = self.terminate.recv() => Some("SIGTERM"),
                _ = self.hangup.recv() => Some("SIGHUP"),
            }
        }
        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => Some("Ctrl+C"),
                Err(e) => {
                    tracing::warn!("Ctrl+C can no longer stop the run: {}", e);
                    None
                }
            }
        }
    }
}

/// Start listening for termination signals and hand back the token that
/// the first one cancels.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let mut signals = TerminationSignals::register()?;
    let run = CancellationToken::new();

    let cancel = run.clone();
    tokio::spawn(async move {
        let mut seen = 0u32;
        while let Some(name) = signals.next().await {
            seen += 1;
            match respond_to(seen) {
                SignalResponse::Drain => {
                    tracing::info!(
                        signal = name,
                        "Stopping after the current identity; partial results will be reported"
                    );
                    tracing::info!("Send the signal again to abort without a summary");
                    cancel.cancel();
                }
                SignalResponse::Abort => {
                    tracing::warn!(signal = name, "Aborting run");
                    std::process::exit(ABORT_EXIT_CODE);
                }
            }
        }
    });

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_drains_later_ones_abort() {
        assert_eq!(respond_to(1), SignalResponse::Drain);
        assert_eq!(respond_to(2), SignalResponse::Abort);
        assert_eq!(respond_to(5), SignalResponse::Abort);
    }

    #[tokio::test]
    async fn installed_token_starts_live() {
        let run = install_signal_handler().unwrap();
        assert!(!run.is_cancelled());
        let batch = run.child_token();
        run.cancel();
        assert!(batch.is_cancelled());
    }
}
