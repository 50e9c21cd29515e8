//! OAuth2 token acquisition against the membership service.
//!
//! Every call goes through the shared retry policy and ends in a typed
//! [`TokenResult`]; nothing here returns an error past the service boundary.

pub mod endpoints;
pub mod responses;

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use self::endpoints::{DISCOVERY_PATH, TENANT_HEADER, TOKEN_PATH, X_REQUESTED_WITH};
use self::responses::{DiscoveryDocument, TokenResponse};
use crate::config::ClientConfig;
use crate::http::{self, HttpSession, RawResponse, Request, TlsPolicy};
use crate::outcome::{Failure, FailureKind};
use crate::types::{truncate_secret, Credentials};

/// Upper bound for the discovery-document fetch.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens issued by a successful grant.
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; 0 when the provider omits it.
    pub expires_in: u64,
    pub token_type: Option<String>,
    pub raw: Value,
}

impl TokenGrant {
    /// Scope the provider actually granted, which may be narrower than the
    /// one requested.
    pub fn granted_scope(&self) -> Option<&str> {
        self.raw.get("scope").and_then(Value::as_str)
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &truncate_secret(&self.access_token, 8))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum TokenResult {
    Success(TokenGrant),
    Failure(Failure),
}

impl TokenResult {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, TokenResult::Success(_))
    }

    pub fn into_result(self) -> Result<TokenGrant, Failure> {
        match self {
            TokenResult::Success(grant) => Ok(grant),
            TokenResult::Failure(failure) => Err(failure),
        }
    }
}

/// Password grant, refresh grant and liveness probing.
pub struct TokenService {
    config: ClientConfig,
    cancel: CancellationToken,
}

impl TokenService {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop retrying once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn login(&self, credentials: &Credentials) -> TokenResult {
        let form = vec![
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("grant_type", "password".to_string()),
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
            ("scope", credentials.scope.clone()),
        ];

        tracing::debug!(username = %credentials.username, "Requesting password grant");
        let result = self.request_token(form, credentials.tenant.as_deref()).await;
        match &result {
            TokenResult::Success(_) => {
                tracing::debug!(username = %credentials.username, "Login succeeded");
            }
            TokenResult::Failure(failure) => {
                tracing::debug!(username = %credentials.username, "Login failed: {}", failure);
            }
        }
        result
    }

    /// Exchange a refresh token using the client id, secret, scope and
    /// tenant of `credentials`.
    pub async fn refresh(&self, credentials: &Credentials, refresh_token: &str) -> TokenResult {
        let form = vec![
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("scope", credentials.scope.clone()),
        ];

        tracing::debug!("Requesting refresh grant");
        let result = self.request_token(form, credentials.tenant.as_deref()).await;
        match &result {
            TokenResult::Success(_) => tracing::debug!("Refresh token exchange succeeded"),
            TokenResult::Failure(failure) => {
                tracing::debug!("Refresh token exchange failed: {}", failure);
            }
        }
        result
    }

    /// Fetch the discovery document. A TLS failure gets one more try with
    /// certificate verification disabled. Never fails; returns `false` when
    /// the provider cannot be reached.
    pub async fn probe_liveness(&self) -> bool {
        let url = match self.config.endpoint(DISCOVERY_PATH) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("API status check failed: {}", e);
                return false;
            }
        };
        let request = Request::get(url);
        let tls = TlsPolicy::for_url(request.url());
        liveness_with_fallback(request.url(), tls, |policy| {
            self.fetch_discovery(&request, policy)
        })
        .await
    }

    async fn fetch_discovery(
        &self,
        request: &Request,
        tls: TlsPolicy,
    ) -> Result<DiscoveryDocument, Failure> {
        let timeout = self.config.timeout.min(LIVENESS_TIMEOUT);
        let session = HttpSession::open(tls, timeout).map_err(|e| Failure::from_transport(&e))?;
        let response = session
            .send_with_retry(request, &self.config.retry, &self.cancel)
            .await
            .map_err(|e| Failure::from_transport(&e))?;
        if !response.is_success() {
            return Err(Failure::from_response(&response));
        }
        serde_json::from_str(&response.body).map_err(|e| {
            Failure::decode(&response, format!("discovery document is not JSON: {}", e))
        })
    }

    async fn request_token(
        &self,
        form: Vec<(&'static str, String)>,
        tenant: Option<&str>,
    ) -> TokenResult {
        let url = match self.config.endpoint(TOKEN_PATH) {
            Ok(url) => url,
            Err(e) => return TokenResult::Failure(Failure::from_transport(&e)),
        };
        let mut request =
            Request::post(url).header(X_REQUESTED_WITH, self.config.x_requested_with.clone());
        if let Some(tenant) = tenant.filter(|t| !t.is_empty()) {
            request = request.header(TENANT_HEADER, tenant);
        }
        let request = request.form(form);

        match http::dispatch(&self.config, &self.cancel, &request).await {
            Ok(response) => classify_token_response(&response),
            Err(e) => TokenResult::Failure(Failure::from_transport(&e)),
        }
    }
}

/// Run `fetch` under `tls`; a TLS failure while verifying gets one more
/// attempt with certificate verification disabled.
async fn liveness_with_fallback<F, Fut>(url: &Url, tls: TlsPolicy, mut fetch: F) -> bool
where
    F: FnMut(TlsPolicy) -> Fut,
    Fut: Future<Output = Result<DiscoveryDocument, Failure>>,
{
    let mut outcome = fetch(tls).await;
    if let Err(failure) = &outcome {
        if failure.kind == FailureKind::TlsError && tls == TlsPolicy::Verify {
            tracing::warn!(
                "TLS error during API status check ({}); retrying without certificate verification",
                failure.message
            );
            outcome = fetch(TlsPolicy::AcceptInvalidCerts).await;
        }
    }

    match outcome {
        Ok(doc) => {
            tracing::debug!(
                token_endpoint = doc.token_endpoint.as_deref().unwrap_or("<none>"),
                "Discovery document loaded"
            );
            tracing::info!(
                issuer = doc.issuer.as_deref().unwrap_or("<none>"),
                "API status check succeeded: {}",
                url
            );
            true
        }
        Err(failure) => {
            tracing::error!("API status check failed: {}", failure);
            false
        }
    }
}

/// Only a 200 carrying an `access_token` counts as success.
fn classify_token_response(response: &RawResponse) -> TokenResult {
    if response.status != 200 {
        return TokenResult::Failure(Failure::from_response(response));
    }
    let raw: Value = match serde_json::from_str(&response.body) {
        Ok(raw) => raw,
        Err(e) => {
            return TokenResult::Failure(Failure::decode(
                response,
                format!("token response is not JSON: {}", e),
            ))
        }
    };
    let parsed: TokenResponse = match serde_json::from_value(raw.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            return TokenResult::Failure(Failure::decode(
                response,
                format!("unexpected token response shape: {}", e),
            ))
        }
    };
    match parsed.access_token.filter(|t| !t.is_empty()) {
        Some(access_token) => TokenResult::Success(TokenGrant {
            access_token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in.unwrap_or(0),
            token_type: parsed.token_type,
            raw,
        }),
        None => TokenResult::Failure(Failure::decode(
            response,
            "token response has no access_token",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(base_url: &str) -> ClientConfig {
        ClientConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                ..RetryPolicy::default()
            },
            timeout: Duration::from_secs(5),
            ..ClientConfig::new(base_url)
        }
    }

    fn creds(tenant: Option<&str>) -> Credentials {
        Credentials {
            client_id: "Public.JbJobMembership_Swagger".into(),
            client_secret: "secret".into(),
            username: "a@x.com".into(),
            password: "pw".into(),
            scope: "offline_access JbJobMembership".into(),
            tenant: tenant.map(str::to_string),
        }
    }

    fn token_body() -> Value {
        json!({
            "access_token": "access-123",
            "refresh_token": "refresh-456",
            "expires_in": 3600,
            "token_type": "Bearer"
        })
    }

    #[test]
    fn test_classify_success() {
        let response = RawResponse {
            status: 200,
            body: token_body().to_string(),
        };
        let grant = classify_token_response(&response).into_result().unwrap();
        assert_eq!(grant.access_token, "access-123");
        assert_eq!(grant.refresh_token.as_deref(), Some("refresh-456"));
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.token_type.as_deref(), Some("Bearer"));
        assert_eq!(grant.granted_scope(), None);
    }

    #[test]
    fn test_classify_keeps_granted_scope() {
        let mut body = token_body();
        body["scope"] = json!("offline_access");
        let response = RawResponse {
            status: 200,
            body: body.to_string(),
        };
        let grant = classify_token_response(&response).into_result().unwrap();
        assert_eq!(grant.granted_scope(), Some("offline_access"));
    }

    #[test]
    fn test_classify_missing_access_token_is_decode_error() {
        let response = RawResponse {
            status: 200,
            body: r#"{"token_type":"Bearer"}"#.into(),
        };
        let failure = classify_token_response(&response).into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::DecodeError);
        assert_eq!(failure.http_status, Some(200));
    }

    #[test]
    fn test_classify_malformed_body_is_decode_error() {
        let response = RawResponse {
            status: 200,
            body: "<html>".into(),
        };
        let failure = classify_token_response(&response).into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::DecodeError);
    }

    #[test]
    fn test_classify_other_success_status_is_http_error() {
        let response = RawResponse {
            status: 204,
            body: String::new(),
        };
        let failure = classify_token_response(&response).into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::HttpError);
        assert_eq!(failure.http_status, Some(204));
    }

    #[test]
    fn test_grant_debug_redacts_tokens() {
        let grant = TokenGrant {
            access_token: "access-token-value-long".into(),
            refresh_token: Some("refresh-secret".into()),
            expires_in: 60,
            token_type: None,
            raw: Value::Null,
        };
        let out = format!("{:?}", grant);
        assert!(!out.contains("access-token-value-long"));
        assert!(!out.contains("refresh-secret"));
    }

    #[tokio::test]
    async fn test_login_sends_password_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header(X_REQUESTED_WITH, "XMLHttpRequest"))
            .and(header(TENANT_HEADER, "acme"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=a%40x.com"))
            .and(body_string_contains("scope=offline_access+JbJobMembership"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let service = TokenService::new(fast_config(&server.uri()));
        let result = service.login(&creds(Some("acme"))).await;
        assert!(result.is_success(), "unexpected result: {:?}", result);
    }

    #[tokio::test]
    async fn test_login_rejected_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = TokenService::new(fast_config(&server.uri()));
        let failure = service.login(&creds(None)).await.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::HttpError);
        assert_eq!(failure.http_status, Some(400));
        assert!(failure.message.contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_login_retries_transient_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let service = TokenService::new(fast_config(&server.uri()));
        assert!(service.login(&creds(None)).await.is_success());
    }

    #[tokio::test]
    async fn test_login_unreachable_is_connection_error() {
        let service = TokenService::new(fast_config("http://127.0.0.1:1"));
        let failure = service.login(&creds(None)).await.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::ConnectionError);
        assert_eq!(failure.http_status, None);
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let service = TokenService::new(fast_config(&server.uri()));
        let grant = service
            .refresh(&creds(None), "refresh-456")
            .await
            .into_result()
            .unwrap();
        assert_eq!(grant.access_token, "access-123");
    }

    #[tokio::test]
    async fn test_probe_liveness_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": format!("{}/membership/", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = TokenService::new(fast_config(&format!("{}/", server.uri())));
        assert!(service.probe_liveness().await);
    }

    #[tokio::test]
    async fn test_probe_liveness_down_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = TokenService::new(fast_config(&server.uri()));
        assert!(!service.probe_liveness().await);
    }

    #[tokio::test]
    async fn test_probe_liveness_non_json_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let service = TokenService::new(fast_config(&server.uri()));
        assert!(!service.probe_liveness().await);
    }

    #[tokio::test]
    async fn test_probe_liveness_unreachable_returns_false() {
        let service = TokenService::new(fast_config("http://127.0.0.1:1"));
        assert!(!service.probe_liveness().await);
    }

    fn discovery_doc() -> DiscoveryDocument {
        DiscoveryDocument {
            issuer: Some("https://id.example.com/membership/".into()),
            token_endpoint: None,
        }
    }

    #[tokio::test]
    async fn test_liveness_retries_tls_error_without_verification() {
        let url = Url::parse("https://api.example.com/membership/.well-known/openid-configuration")
            .unwrap();
        let mut attempts = Vec::new();
        let up = liveness_with_fallback(&url, TlsPolicy::Verify, |policy| {
            attempts.push(policy);
            async move {
                match policy {
                    TlsPolicy::Verify => Err(Failure::new(
                        FailureKind::TlsError,
                        "invalid peer certificate: UnknownIssuer",
                    )),
                    TlsPolicy::AcceptInvalidCerts => Ok(discovery_doc()),
                }
            }
        })
        .await;

        assert!(up);
        assert_eq!(attempts, [TlsPolicy::Verify, TlsPolicy::AcceptInvalidCerts]);
    }

    #[tokio::test]
    async fn test_liveness_other_failures_do_not_fall_back() {
        let url = Url::parse("https://api.example.com/").unwrap();
        let mut attempts = Vec::new();
        let up = liveness_with_fallback(&url, TlsPolicy::Verify, |policy| {
            attempts.push(policy);
            async { Err(Failure::new(FailureKind::ConnectionError, "refused")) }
        })
        .await;

        assert!(!up);
        assert_eq!(attempts, [TlsPolicy::Verify]);
    }

    #[tokio::test]
    async fn test_liveness_no_second_try_when_already_lenient() {
        let url = Url::parse("https://localhost:7013/").unwrap();
        let mut attempts = Vec::new();
        let up = liveness_with_fallback(&url, TlsPolicy::AcceptInvalidCerts, |policy| {
            attempts.push(policy);
            async { Err(Failure::new(FailureKind::TlsError, "handshake failure")) }
        })
        .await;

        assert!(!up);
        assert_eq!(attempts, [TlsPolicy::AcceptInvalidCerts]);
    }

    #[tokio::test]
    async fn test_discovery_over_self_signed_tls() {
        let server = crate::http::testing::SelfSignedServer::start(
            r#"{"issuer":"https://127.0.0.1/membership/"}"#,
        )
        .await;
        let service = TokenService::new(fast_config(&server.base_url()));
        let request = Request::get(Url::parse(&server.url(DISCOVERY_PATH)).unwrap());

        let failure = service
            .fetch_discovery(&request, TlsPolicy::Verify)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::TlsError);

        let mut attempts = Vec::new();
        let up = liveness_with_fallback(request.url(), TlsPolicy::Verify, |policy| {
            attempts.push(policy);
            service.fetch_discovery(&request, policy)
        })
        .await;
        assert!(up);
        assert_eq!(attempts, [TlsPolicy::Verify, TlsPolicy::AcceptInvalidCerts]);

        // Loopback hosts skip verification from the start.
        assert!(service.probe_liveness().await);
    }
}
