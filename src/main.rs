//! identity-migrate: bulk identity migration for an OAuth2 membership API.
//!
//! Imports a list of login names through the provider's import endpoint, then
//! proves each account works by logging in with it. Calls are paced, retried
//! with linear backoff on transient failures, and every per-identity outcome
//! ends up in the run summary instead of aborting the batch.

#![warn(clippy::all)]

mod auth;
mod batch;
mod cli;
mod config;
mod http;
mod importer;
mod outcome;
mod report;
mod retry;
mod shutdown;
mod source;
mod types;

use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use auth::{TokenGrant, TokenService};
use batch::progress::BatchProgress;
use batch::BatchRunStats;
use cli::{BatchArgs, Command, ImportArgs, LoginArgs};
use config::Config;
use importer::ImportService;
use report::RunReport;
use source::{FileSource, IdentitySource};
use types::{truncate_secret, Credentials, Identity};

/// Characters of a token shown by `login`.
const TOKEN_PREVIEW_CHARS: usize = 50;

async fn load_identities(args: &BatchArgs) -> anyhow::Result<Vec<Identity>> {
    let source: Box<dyn IdentitySource> = Box::new(
        FileSource::new(config::expand_tilde(&args.input)).emails_only(args.emails_only),
    );
    let identities = source
        .load()
        .await
        .context("Could not load identities; nothing was sent to the API")?;
    tracing::info!("Loaded {} identities from {}", identities.len(), args.input);
    Ok(identities)
}

/// Password-grant template for verification; only `username` varies per
/// identity. Built before any batch work so a missing password fails early.
fn verification_template(config: &Config) -> anyhow::Result<Credentials> {
    config
        .credentials_for("")
        .context("Verifying identities needs the shared password")
}

async fn ensure_api_up(tokens: &TokenService, base_url: &str) -> anyhow::Result<()> {
    if !tokens.probe_liveness().await {
        anyhow::bail!("API at {} is not reachable; no identities were processed", base_url);
    }
    Ok(())
}

async fn import_batch(
    config: &Config,
    importer: &ImportService,
    identities: &[Identity],
    cancel: &CancellationToken,
) -> BatchRunStats {
    tracing::info!("Importing {} identities", identities.len());
    let progress = BatchProgress::new("Import", identities.len(), config.no_progress_bar);
    let started = Instant::now();
    let access_token = config.access_token.as_deref();
    let tenant = config.tenant.as_deref();

    let stats = batch::run_batch(
        identities,
        |identity| async move {
            importer
                .import_identity(&identity.login_name, access_token, tenant)
                .await
                .into_result()
        },
        config.pacing,
        cancel,
        |event| progress.observe(event),
    )
    .await;

    progress.finish();
    report::log_summary("Import", &stats, started.elapsed());
    stats
}

async fn verify_batch(
    config: &Config,
    tokens: &TokenService,
    template: &Credentials,
    identities: &[Identity],
    cancel: &CancellationToken,
) -> BatchRunStats {
    tracing::info!("Verifying {} identities by logging in", identities.len());
    let progress = BatchProgress::new("Verify", identities.len(), config.no_progress_bar);
    let started = Instant::now();

    let stats = batch::run_batch(
        identities,
        |identity| {
            let credentials = Credentials {
                username: identity.login_name,
                ..template.clone()
            };
            async move { tokens.login(&credentials).await.into_result().map(|_| ()) }
        },
        config.pacing,
        cancel,
        |event| progress.observe(event),
    )
    .await;

    progress.finish();
    report::log_summary("Verification", &stats, started.elapsed());
    stats
}

/// Stamp, optionally persist, and turn failures into a non-zero exit.
fn finish_run(mut report: RunReport, report_path: Option<&str>) -> anyhow::Result<()> {
    report.finished_at = Utc::now();
    if let Some(path) = report_path {
        report::write_report(&report, &config::expand_tilde(path))?;
    }
    let failures = report.failures();
    if failures > 0 {
        anyhow::bail!("{} identity operations failed", failures);
    }
    Ok(())
}

async fn run_probe(config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let tokens = TokenService::new(config.client_config()).with_cancellation(cancel);
    ensure_api_up(&tokens, &config.base_url).await?;
    println!("API at {} is up", config.base_url);
    Ok(())
}

fn print_grant(grant: &TokenGrant) {
    println!("  token type:    {}", grant.token_type.as_deref().unwrap_or("<unspecified>"));
    println!("  expires in:    {}s", grant.expires_in);
    if let Some(scope) = grant.granted_scope() {
        println!("  scope:         {}", scope);
    }
    println!(
        "  access token:  {}",
        truncate_secret(&grant.access_token, TOKEN_PREVIEW_CHARS)
    );
    match &grant.refresh_token {
        Some(token) => println!(
            "  refresh token: {}",
            truncate_secret(token, TOKEN_PREVIEW_CHARS)
        ),
        None => println!("  refresh token: <none>"),
    }
}

async fn run_login(
    config: &Config,
    args: LoginArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let username = config
        .username
        .as_deref()
        .context("A username is required (set API_USERNAME or pass --username)")?;
    let credentials = config.credentials_for(username)?;
    let tokens = TokenService::new(config.client_config()).with_cancellation(cancel);

    let grant = tokens
        .login(&credentials)
        .await
        .into_result()
        .map_err(|failure| anyhow::anyhow!("Login failed for {}: {}", username, failure))?;
    println!("Logged in as {}", username);
    print_grant(&grant);

    if args.refresh {
        let refresh_token = grant
            .refresh_token
            .as_deref()
            .context("The login response did not include a refresh token")?;
        let renewed = tokens
            .refresh(&credentials, refresh_token)
            .await
            .into_result()
            .map_err(|failure| anyhow::anyhow!("Refresh failed: {}", failure))?;
        println!("Refreshed tokens");
        print_grant(&renewed);
    }
    Ok(())
}

async fn run_import(
    config: &Config,
    args: ImportArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let started_at = Utc::now();
    let template = if args.skip_verify {
        None
    } else {
        Some(verification_template(config)?)
    };
    let identities = load_identities(&args.batch).await?;
    let mut report = RunReport::new("import", &config.base_url, started_at);
    if identities.is_empty() {
        tracing::warn!("No identities to import");
        return finish_run(report, args.batch.report.as_deref());
    }

    let client = config.client_config();
    let tokens = TokenService::new(client.clone()).with_cancellation(cancel.clone());
    ensure_api_up(&tokens, &config.base_url).await?;

    let importer = ImportService::new(client).with_cancellation(cancel.clone());
    report.import = Some(import_batch(config, &importer, &identities, &cancel).await);

    if let Some(template) = template {
        if cancel.is_cancelled() {
            tracing::warn!("Skipping verification after shutdown request");
        } else {
            report.verification =
                Some(verify_batch(config, &tokens, &template, &identities, &cancel).await);
        }
    }

    finish_run(report, args.batch.report.as_deref())
}

async fn run_verify(
    config: &Config,
    args: BatchArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let started_at = Utc::now();
    let template = verification_template(config)?;
    let identities = load_identities(&args).await?;
    let mut report = RunReport::new("verify", &config.base_url, started_at);
    if identities.is_empty() {
        tracing::warn!("No identities to verify");
        return finish_run(report, args.report.as_deref());
    }

    let tokens = TokenService::new(config.client_config()).with_cancellation(cancel.clone());
    ensure_api_up(&tokens, &config.base_url).await?;
    report.verification =
        Some(verify_batch(config, &tokens, &template, &identities, &cancel).await);

    finish_run(report, args.report.as_deref())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = Config::from_cli(cli.api, cli.no_progress_bar)?;
    tracing::debug!(?config, "Starting identity-migrate");
    let cancel = shutdown::install_signal_handler()?;

    match cli.command {
        Command::Probe => run_probe(&config, cancel).await,
        Command::Login(args) => run_login(&config, args, cancel).await,
        Command::Import(args) => run_import(&config, args, cancel).await,
        Command::Verify(args) => run_verify(&config, args, cancel).await,
    }
}
