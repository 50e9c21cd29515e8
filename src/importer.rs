//! Single-identity import against the membership API.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::auth::endpoints::{AUTHORIZATION, IMPORT_PATH, TENANT_HEADER, X_REQUESTED_WITH};
use crate::config::ClientConfig;
use crate::http::{self, RawResponse, Request};
use crate::outcome::Failure;

#[derive(Debug, Clone, PartialEq)]
pub enum ImportResult {
    /// Parsed response body; `Value::Null` when the provider sent none.
    Success { raw: Value },
    Failure(Failure),
}

impl ImportResult {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, ImportResult::Success { .. })
    }

    pub fn into_result(self) -> Result<Value, Failure> {
        match self {
            ImportResult::Success { raw } => Ok(raw),
            ImportResult::Failure(failure) => Err(failure),
        }
    }
}

pub struct ImportService {
    config: ClientConfig,
    cancel: CancellationToken,
}

impl ImportService {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ask the provider to migrate `login_name`. Re-importing an existing
    /// identity is safe; the provider answers with success or a conflict.
    pub async fn import_identity(
        &self,
        login_name: &str,
        access_token: Option<&str>,
        tenant: Option<&str>,
    ) -> ImportResult {
        let url = match self.config.endpoint(IMPORT_PATH) {
            Ok(url) => url,
            Err(e) => return ImportResult::Failure(Failure::from_transport(&e)),
        };
        let mut request =
            Request::post(url).header(X_REQUESTED_WITH, self.config.x_requested_with.clone());
        if let Some(token) = access_token.map(str::trim).filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(tenant) = tenant.filter(|t| !t.is_empty()) {
            request = request.header(TENANT_HEADER, tenant);
        }
        let request = request.json(json!({ "LoginName": login_name }));

        tracing::debug!(login_name = %login_name, "Importing identity");
        match http::dispatch(&self.config, &self.cancel, &request).await {
            Ok(response) => classify_import_response(&response),
            Err(e) => ImportResult::Failure(Failure::from_transport(&e)),
        }
    }
}

fn classify_import_response(response: &RawResponse) -> ImportResult {
    if !response.is_success() {
        return ImportResult::Failure(Failure::from_response(response));
    }
    if response.body.trim().is_empty() {
        return ImportResult::Success { raw: Value::Null };
    }
    match serde_json::from_str(&response.body) {
        Ok(raw) => ImportResult::Success { raw },
        Err(e) => ImportResult::Failure(Failure::decode(
            response,
            format!("import response is not JSON: {}", e),
        )),
    }
}
