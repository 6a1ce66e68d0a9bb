//! # eprf-server
//!
//! HTTP backend for multi-user ePRF collaboration.
//!
//! This binary provides:
//! - **Authorization** resolving `(user, incident, patient)` to an effective
//!   permission level, fail-closed
//! - **Presence and cursors** so everyone sees who is on a form and which
//!   field they are editing
//! - **Chat** with `@callsign` mention notifications, per incident and per
//!   patient
//! - **Version history** with server-computed diffs and restore
//! - **REST API** (axum) with a long-poll event feed
//! - **Per-client rate limiting** to protect against abuse

mod api;
mod config;
mod error;
mod handlers;
mod rate_limit;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use eprf_collab::Collab;
use eprf_store::Store;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,eprf_server=debug")),
        )
        .init();

    info!("starting ePRF collaboration server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        addr = %config.http_addr,
        admins = config.admin_ids.len(),
        "loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the store and build the collaboration engines
    // -----------------------------------------------------------------------
    let store = match &config.database_path {
        Some(path) => Store::open_at(path).await?,
        None => Store::open_default().await?,
    };
    let collab = Collab::new(store, config.admin_ids.iter().cloned());
    let rate_limiter = RateLimiter::default();

    let app_state = AppState {
        collab: collab.clone(),
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Stale presence/cursor sweeper: bounds the leak from sessions that
    // never sent a leave.
    let sweeper = collab.presence().clone();
    let sweep_secs = config.presence_sweep_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(sweep_secs));
        loop {
            interval.tick().await;
            if let Err(err) = sweeper.sweep().await {
                tracing::warn!(error = %err, "presence sweep failed");
            }
        }
    });

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min).
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
