use thiserror::Error;

/// Failures below the HTTP layer. A response with any status code is never
/// a `TransportError`; callers classify status codes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Transient failures that the retry loop may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout | TransportError::ConnectionRefused(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return TransportError::Timeout;
        }
        // reqwest hides the TLS backend's error type, so certificate and
        // handshake failures are recognised from the source chain. The URL is
        // dropped first so a host or path cannot trip the match.
        let e = e.without_url();
        let detail = error_chain(&e);
        if looks_like_tls(&detail) {
            return TransportError::Tls(detail);
        }
        if e.is_connect() {
            return TransportError::ConnectionRefused(detail);
        }
        TransportError::Other(detail)
    }
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        TransportError::Other(format!("invalid URL: {}", e))
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let msg = inner.to_string();
        if !out.contains(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        source = inner.source();
    }
    out
}

fn looks_like_tls(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle))
}
