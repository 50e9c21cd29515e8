use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "identity-migrate",
    version,
    about = "Import identities into the membership API and verify them by logging in"
)]
pub struct Cli {
    #[command(flatten)]
    pub api: ApiArgs,

    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection and credential settings. Every flag falls back to an
/// environment variable, which may come from a `.env` file.
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// Identity provider base URL
    #[arg(
        long,
        env = "API_BASE_URL",
        default_value = "https://localhost:7013",
        global = true
    )]
    pub base_url: String,

    /// OAuth2 client id
    #[arg(
        long,
        env = "API_CLIENT_ID",
        default_value = "Public.JbJobMembership_Swagger",
        global = true
    )]
    pub client_id: String,

    /// OAuth2 client secret
    #[arg(
        long,
        env = "API_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true,
        global = true
    )]
    pub client_secret: String,

    /// Username for the `login` command
    #[arg(short = 'u', long, env = "API_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password used for `login` and for verifying migrated identities.
    /// WARNING: passing via --password is visible in process listings.
    /// Prefer the API_PASSWORD environment variable instead.
    #[arg(short = 'p', long, env = "API_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// OAuth2 scope
    #[arg(
        long,
        env = "API_SCOPE",
        default_value = "offline_access JbJobMembership",
        global = true
    )]
    pub scope: String,

    /// Tenant sent in the `__tenant` header (empty means none)
    #[arg(long, env = "API_TENANT", global = true)]
    pub tenant: Option<String>,

    /// Bearer token attached to import requests
    #[arg(long, env = "API_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// Value of the X-Requested-With header
    #[arg(
        long,
        env = "API_X_REQUESTED_WITH",
        default_value = "XMLHttpRequest",
        global = true
    )]
    pub x_requested_with: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Total attempts per request, including the first
    #[arg(long, env = "API_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    pub max_attempts: u32,

    /// Base retry delay in seconds; attempt n waits n times this
    #[arg(long, env = "API_RETRY_DELAY_SECS", default_value_t = 1.0, global = true)]
    pub retry_delay: f64,

    /// Pause between consecutive identities in seconds
    #[arg(long, env = "API_PACING_SECS", default_value_t = 0.5, global = true)]
    pub pacing: f64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the identity provider's discovery document is reachable
    Probe,
    /// Log in once with the configured username and password
    Login(LoginArgs),
    /// Import identities, then verify each one by logging in
    Import(ImportArgs),
    /// Verify identities by logging in, without importing
    Verify(BatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Also exchange the returned refresh token for a new access token
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// File with one identity per line: `login_name` or `id,login_name`
    #[arg(short = 'i', long)]
    pub input: String,

    /// Only keep login names that look like e-mail addresses
    #[arg(long)]
    pub emails_only: bool,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    pub report: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Skip the login verification pass after importing
    #[arg(long)]
    pub skip_verify: bool,
}
