use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::cli::ApiArgs;
use crate::http::{self, TransportError};
use crate::retry::RetryPolicy;
use crate::types::Credentials;

/// Settings every outbound call needs. Built once from [`Config`] and handed
/// to each service at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub x_requested_with: String,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    #[cfg(test)]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            x_requested_with: "XMLHttpRequest".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        http::endpoint_url(&self.base_url, path)
    }
}

/// Application configuration.
pub struct Config {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: String,
    pub tenant: Option<String>,
    pub access_token: Option<String>,
    pub x_requested_with: String,
    pub timeout: Duration,
    pub pacing: Duration,
    pub retry: RetryPolicy,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant", &self.tenant)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("pacing", &self.pacing)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Expand ~ to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn seconds(value: f64, name: &str) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{} must be a non-negative number of seconds, got {}", name, value))
}

impl Config {
    pub fn from_cli(api: ApiArgs, no_progress_bar: bool) -> anyhow::Result<Self> {
        let base_url = api.base_url.trim().to_string();
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("Invalid base URL '{}'", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Base URL must use http or https, got '{}'", base_url);
        }
        if api.max_attempts == 0 {
            anyhow::bail!("--max-attempts must be at least 1");
        }
        if api.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }

        Ok(Self {
            base_url,
            client_id: api.client_id,
            client_secret: api.client_secret,
            username: non_empty(api.username),
            password: api.password.filter(|p| !p.is_empty()),
            scope: api.scope,
            tenant: non_empty(api.tenant),
            access_token: non_empty(api.access_token),
            x_requested_with: api.x_requested_with,
            timeout: Duration::from_secs(api.timeout),
            pacing: seconds(api.pacing, "--pacing")?,
            retry: RetryPolicy {
                max_attempts: api.max_attempts,
                base_delay: seconds(api.retry_delay, "--retry-delay")?,
                ..RetryPolicy::default()
            },
            no_progress_bar,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            x_requested_with: self.x_requested_with.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Password-grant credentials for `username` using the configured
    /// client and password.
    pub fn credentials_for(&self, username: &str) -> anyhow::Result<Credentials> {
        let password = self
            .password
            .clone()
            .context("A password is required (set API_PASSWORD or pass --password)")?;
        Ok(Credentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            username: username.to_string(),
            password,
            scope: self.scope.clone(),
            tenant: self.tenant.clone(),
        })
    }
}
