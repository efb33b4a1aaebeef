//! `server`
//!
//! This crate contains everything web-specific for Shelfmark: configuration,
//! logging, routing and the glue between the HTTP surface and
//! `shelfmark_core`.
use crate::config::Config;
use crate::state::AppState;
use anyhow::Error;
use shelfmark_core::auth::client::AuthClient;
use shelfmark_core::auth::session::SessionManager;
use shelfmark_core::database::queries::Db;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment-driven configuration
mod config;
/// Error types
mod errors;
/// Route handlers for every served page
mod pages;
/// App state management
mod state;

/// Builds the state and serves the app until the process is stopped.
/// # Errors
/// Fails when configuration, the database or the listener cannot be set up;
/// per-request failures never propagate here.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Executed once per run, never across crate boundaries"
)]
pub async fn run() -> Result<(), Error> {
    // also installs the bridge that routes the core crate's `log` records
    // into this subscriber
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env()?;
    let db = Db::init(&config.database_path, config.dedup).await?;
    tracing::info!(
        "Opened collection database at {}",
        config.database_path.display()
    );

    let auth = AuthClient::new(&config.auth_url, &config.auth_api_key)?;
    let sessions = Arc::new(SessionManager::new(auth));
    watch_session_changes(&sessions);

    let state = AppState {
        db: Arc::new(db),
        sessions,
        site_url: config.site_url,
    };
    let app = pages::router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The shell-level observer of the session-change channel. Pages re-check
/// the session on every request; this task only makes transitions visible
/// in the logs.
fn watch_session_changes(sessions: &Arc<SessionManager<AuthClient>>) {
    let mut changes = sessions.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let signed_in = changes.borrow_and_update().is_some();
            if signed_in {
                tracing::info!("Session established");
            } else {
                tracing::info!("Session cleared");
            }
        }
    });
}
