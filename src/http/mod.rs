//! Single-request HTTP transport.
//!
//! An [`HttpSession`] wraps a `reqwest::Client` built for one TLS policy and
//! one timeout. Sessions are opened per top-level operation and dropped when
//! it returns, so a long batch never accumulates connection pools.

pub mod error;
#[cfg(test)]
pub(crate) mod testing;
pub mod tls;

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use self::error::TransportError;
pub use self::tls::TlsPolicy;
use crate::config::ClientConfig;
use crate::retry;

/// Status and body of a completed HTTP exchange, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Form(Vec<(&'static str, String)>),
    Json(Value),
}

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Vec<(&'static str, String)>,
    body: Option<RequestBody>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn form(mut self, pairs: Vec<(&'static str, String)>) -> Self {
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Build `{base}{path}` with surrounding whitespace and trailing slashes
/// stripped from the base.
pub fn endpoint_url(base_url: &str, path: &str) -> Result<Url, TransportError> {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(Url::parse(&format!("{}/{}", base, path))?)
}

/// Short-lived HTTP client for a single logical operation.
pub struct HttpSession {
    client: Client,
    timeout: Duration,
}

impl HttpSession {
    pub fn open(tls: TlsPolicy, timeout: Duration) -> Result<Self, TransportError> {
        if tls.accepts_invalid_certs() {
            tracing::debug!("Certificate verification disabled for loopback host");
        }
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(tls.accepts_invalid_certs())
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// Issue one request. Never retries.
    pub async fn send(&self, request: &Request) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        builder = match &request.body {
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder,
        };

        tracing::debug!("{} {}", request.method, request.url);
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }

    /// Issue a request under the retry policy, reusing this session's
    /// connections across attempts.
    pub async fn send_with_retry(
        &self,
        request: &Request,
        policy: &retry::RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        retry::execute(policy, cancel, || self.send(request)).await
    }
}

/// Open a session with the TLS policy derived from the request URL, send the
/// request with retries, and release the session.
pub async fn dispatch(
    config: &ClientConfig,
    cancel: &CancellationToken,
    request: &Request,
) -> Result<RawResponse, TransportError> {
    dispatch_with_tls(config, cancel, request, TlsPolicy::for_url(request.url())).await
}

pub async fn dispatch_with_tls(
    config: &ClientConfig,
    cancel: &CancellationToken,
    request: &Request,
    tls: TlsPolicy,
) -> Result<RawResponse, TransportError> {
    let session = HttpSession::open(tls, config.timeout)?;
    session.send_with_retry(request, &config.retry, cancel).await
}
