//! Typed per-call failures shared by the token and import services.

use std::fmt;

use serde::Serialize;

use crate::http::{RawResponse, TransportError};

/// Longest response-body excerpt kept in a failure message.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Timeout,
    ConnectionError,
    TlsError,
    HttpError,
    DecodeError,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionError => "connection error",
            FailureKind::TlsError => "TLS error",
            FailureKind::HttpError => "HTTP error",
            FailureKind::DecodeError => "decode error",
            FailureKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// Why a single call did not succeed. `http_status` is set whenever the
/// provider answered, even if the body then failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub http_status: Option<u16>,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            message: message.into(),
        }
    }

    /// A terminal response the caller does not accept as success.
    pub fn from_response(response: &RawResponse) -> Self {
        let excerpt = excerpt(&response.body);
        Self {
            kind: FailureKind::HttpError,
            http_status: Some(response.status),
            message: if excerpt.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                excerpt
            },
        }
    }

    /// A response with an acceptable status but an unusable body.
    pub fn decode(response: &RawResponse, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::DecodeError,
            http_status: Some(response.status),
            message: message.into(),
        }
    }

    pub fn from_transport(e: &TransportError) -> Self {
        let kind = match e {
            TransportError::Timeout => FailureKind::Timeout,
            TransportError::ConnectionRefused(_) => FailureKind::ConnectionError,
            TransportError::Tls(_) => FailureKind::TlsError,
            TransportError::Other(_) => FailureKind::Unknown,
        };
        Self::new(kind, e.to_string())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Failure {}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_from_response_keeps_status_and_body() {
        let f = Failure::from_response(&response(409, r#"{"error":"exists"}"#));
        assert_eq!(f.kind, FailureKind::HttpError);
        assert_eq!(f.http_status, Some(409));
        assert_eq!(f.message, r#"{"error":"exists"}"#);
    }

    #[test]
    fn test_from_response_empty_body() {
        let f = Failure::from_response(&response(502, "  "));
        assert_eq!(f.message, "HTTP 502");
    }

    #[test]
    fn test_from_response_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let f = Failure::from_response(&response(500, &body));
        assert_eq!(f.message.chars().count(), BODY_EXCERPT_CHARS + 3);
        assert!(f.message.ends_with("..."));
    }

    #[test]
    fn test_transport_mapping() {
        assert_eq!(
            Failure::from_transport(&TransportError::Timeout).kind,
            FailureKind::Timeout
        );
        assert_eq!(
            Failure::from_transport(&TransportError::ConnectionRefused("x".into())).kind,
            FailureKind::ConnectionError
        );
        assert_eq!(
            Failure::from_transport(&TransportError::Tls("x".into())).kind,
            FailureKind::TlsError
        );
        let other = Failure::from_transport(&TransportError::Other("weird".into()));
        assert_eq!(other.kind, FailureKind::Unknown);
        assert_eq!(other.http_status, None);
        assert_eq!(other.message, "weird");
    }

    #[test]
    fn test_display() {
        let f = Failure::from_response(&response(409, "conflict"));
        assert_eq!(f.to_string(), "HTTP error (HTTP 409): conflict");
        let t = Failure::new(FailureKind::Timeout, "request timed out");
        assert_eq!(t.to_string(), "timeout: request timed out");
    }
}
