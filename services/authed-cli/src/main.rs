//! authed
//!
//! Command-line client for a bearer-token API:
//! 1. Stores the credential pair from an interactive login on disk
//! 2. Sends requests with the access token attached
//! 3. Refreshes and replays transparently when the token has expired
//! 4. Clears the session and asks for a new login when it cannot recover

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use refresh_coordinator::{
    AuthedClient, Classifier, LoggingTerminator, SessionEndReason, SessionTerminator,
};
use session_auth::{CredentialPair, CredentialStore, FileStore, HttpRefresher};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{HttpTransport, RequestDescriptor};

use crate::cli::Command;
use crate::config::Config;

/// Logs the session end and tells the user how to sign back in.
struct PromptTerminator;

impl SessionTerminator for PromptTerminator {
    fn on_session_end(&self, reason: &SessionEndReason) {
        LoggingTerminator.on_session_end(reason);
        eprintln!("session ended ({reason}); run `authed login` to sign in again");
    }
}

async fn build_client(config: &Config) -> Result<AuthedClient> {
    let backend = FileStore::load(config.store.path.clone())
        .await
        .with_context(|| format!("failed to open session store {}", config.store.path.display()))?;
    let store = Arc::new(CredentialStore::new(
        Arc::new(backend),
        config.store.clear_policy(),
    ));

    let http = reqwest::Client::builder()
        .timeout(config.api.timeout())
        .build()
        .context("failed to build HTTP client")?;
    let transport = HttpTransport::new(http.clone(), config.api.base_url.clone(), config.api.timeout());
    let refresher = HttpRefresher::new(http, config.api.refresh_url());

    let client = AuthedClient::builder(
        Arc::new(transport),
        store,
        Arc::new(refresher),
        Arc::new(PromptTerminator),
    )
    .policy(config.retry.clone())
    .classifier(Classifier::new(config.classifier.revoked_patterns.iter().cloned()))
    .build()?;
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output on stderr and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args = cli::parse(std::env::args().skip(1).collect())?;

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        store = %config.store.path.display(),
        max_attempts = config.retry.max_attempts,
        "configuration loaded"
    );

    let client = build_client(&config).await?;

    match args.command {
        Command::Login { access, refresh } => {
            client.login(&CredentialPair::new(access, refresh)).await?;
            eprintln!("credentials stored in {}", config.store.path.display());
        }
        Command::Logout => {
            client.logout().await?;
            eprintln!("logged out");
        }
        Command::Send { method, path, body } => {
            let mut request = RequestDescriptor::new(method, path);
            if let Some(body) = body {
                request = request.json(&body);
            }
            match client.send(request).await {
                Ok(response) => {
                    println!("{}", response.text());
                }
                Err(e) => {
                    if let Some(response) = e.response() {
                        eprintln!("HTTP {}", response.status);
                        println!("{}", response.text());
                    }
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
