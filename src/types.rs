use serde::Serialize;

/// One account to migrate. `login_name` is the key the provider understands;
/// `id` is whatever the source system calls the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub login_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, login_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            login_name: login_name.into(),
        }
    }
}

/// Password-grant parameters. Never logged: `Debug` redacts the secrets.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub scope: String,
    pub tenant: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scope", &self.scope)
            .field("tenant", &self.tenant)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Shorten a token for display, keeping the first `keep` characters.
pub fn truncate_secret(secret: &str, keep: usize) -> String {
    if secret.chars().count() <= keep {
        return secret.to_string();
    }
    let head: String = secret.chars().take(keep).collect();
    format!("{}...", head)
}
