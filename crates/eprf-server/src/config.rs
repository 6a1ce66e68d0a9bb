//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use eprf_shared::constants::DEFAULT_HTTP_PORT;
use eprf_shared::UserId;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.  When unset the platform data directory is
    /// used.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Discord ids with access to administrative endpoints (record listing,
    /// forced transfer/delete), comma-separated.
    /// Env: `ADMIN_IDS`
    /// Default: empty.
    pub admin_ids: Vec<UserId>,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"ePRF Node"`
    pub instance_name: String,

    /// Interval of the stale presence/cursor sweeper, in seconds.
    /// Env: `PRESENCE_SWEEP_SECS`
    /// Default: `30`
    pub presence_sweep_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            admin_ids: Vec::new(),
            instance_name: "ePRF Node".to_string(),
            presence_sweep_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => {
                    tracing::warn!(value = %addr, "invalid HTTP_ADDR, using default");
                }
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(ids) = std::env::var("ADMIN_IDS") {
            config.admin_ids = parse_admin_ids(&ids);
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("PRESENCE_SWEEP_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.presence_sweep_secs = secs,
                _ => {
                    tracing::warn!(value = %val, "invalid PRESENCE_SWEEP_SECS, using default");
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_admin_ids(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(UserId::from)
        .collect()
}
