//! OAuthorizer demo
//!
//! Exercises both authorization flows against one configured provider:
//! - `login`: CLI flow. Prints the authorization URL, reads the pasted code,
//!   saves the token, then fetches `server.resource_url` if set
//! - `serve`: web flow. `GET /` redirects to the provider until a token is
//!   saved, the callback route completes the exchange
//!
//! Logs go to stderr as JSON so the CLI prompt on stdout stays readable.

mod config;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauthorizer::{CliHelper, FileStorer, HttpOAuthClient, OAuthClient, Storer, WebHelper};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// How long in-flight requests may drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Login,
    Serve,
}

/// Parsed command line: `[login|serve] [--config <path>]`
#[derive(Debug, PartialEq, Eq)]
struct Args {
    command: Command,
    config_path: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut command = None;
    let mut config_path = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                config_path = Some(path.clone());
            }
            "login" if command.is_none() => command = Some(Command::Login),
            "serve" if command.is_none() => command = Some(Command::Serve),
            other => {
                anyhow::bail!("unexpected argument: {other} (usage: [login|serve] [--config <path>])")
            }
        }
    }
    Ok(Args {
        command: command.unwrap_or(Command::Serve),
        config_path,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv)?;

    let config_path = Config::resolve_path(args.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        client_id = %config.oauth.client_id,
        auth_url = %config.oauth.auth_url,
        token_file = %config.storage.token_file.display(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let oauth: Arc<dyn OAuthClient> = Arc::new(
        HttpOAuthClient::new(config.oauth_config(), http)
            .context("invalid OAuth client configuration")?,
    );
    let token_store: Arc<dyn Storer> =
        Arc::new(FileStorer::new(config.storage.token_file.clone()));

    match args.command {
        Command::Login => login(&config, oauth, token_store).await,
        Command::Serve => serve(&config, oauth, token_store).await,
    }
}

/// Run the CLI flow, then use the client once.
async fn login(
    config: &Config,
    oauth: Arc<dyn OAuthClient>,
    token_store: Arc<dyn Storer>,
) -> Result<()> {
    let helper = CliHelper::new(oauth, token_store);
    let client = helper
        .get_client_stdio()
        .await
        .context("authorization failed")?;
    info!("authorized");

    let Some(resource_url) = config.server.resource_url.as_deref() else {
        println!("authorized; token saved to {}", config.storage.token_file.display());
        return Ok(());
    };

    let response = client
        .get(resource_url)
        .await
        .context("failed to prepare resource request")?
        .send()
        .await
        .with_context(|| format!("failed to fetch {resource_url}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .context("failed to read resource body")?;
    println!("{status}\n{body}");
    Ok(())
}

/// Run the web flow server until SIGINT/SIGTERM.
async fn serve(
    config: &Config,
    oauth: Arc<dyn OAuthClient>,
    token_store: Arc<dyn Storer>,
) -> Result<()> {
    let prometheus = metrics::install_recorder()?;

    let nonce_store: Arc<dyn Storer> =
        Arc::new(FileStorer::new(config.storage.nonce_file.clone()));
    let helper = WebHelper::new(oauth, token_store.clone(), nonce_store);

    let state = AppState {
        helper: Arc::new(helper),
        token_store,
        resource_url: config.server.resource_url.clone(),
        prometheus,
    };
    let app = build_router(
        state,
        &config.server.callback_path,
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(
        addr = %listen_addr,
        callback_path = %config.server.callback_path,
        "accepting requests"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    // The drain timer starts at signal receipt
    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
