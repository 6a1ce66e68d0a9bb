//! Database connection management.
//!
//! The [`Store`] struct wraps a [`tokio_rusqlite::Connection`] — every query
//! runs on the connection's dedicated worker thread, so the handle is cheap
//! to clone and safe to share across concurrent request handlers.
//! Migrations are guaranteed to have run before any other operation.

use std::path::Path;

use directories::ProjectDirs;
use tokio_rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Async handle to the ePRF SQLite database.
///
/// Cloning is cheap — all clones talk to the same worker thread.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/eprf/eprf.db`
    /// - macOS:   `~/Library/Application Support/com.eprf.eprf/eprf.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\eprf\eprf\data\eprf.db`
    pub async fn open_default() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "eprf", "eprf").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("eprf.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path).await
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is useful for tests and for embedding the store inside custom
    /// directory layouts.
    pub async fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    /// Open an in-memory database — useful for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                // Recommended SQLite settings.
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                Ok(())
            })
            .await?;

        // Run schema migrations.
        self.conn
            .call(|conn| Ok(migrations::run_migrations(conn)))
            .await??;

        Ok(())
    }

    /// Close the worker thread.  Any later call on any clone of the handle
    /// fails with a connection-closed error.
    pub async fn close(&self) -> Result<()> {
        self.conn.clone().close().await?;
        Ok(())
    }

    /// Run a closure against the underlying connection.
    ///
    /// Callers should prefer the typed CRUD helpers; direct access is
    /// occasionally needed for ad-hoc queries.
    pub(crate) async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        Ok(self
            .conn
            .call(move |conn| f(conn).map_err(tokio_rusqlite::Error::from))
            .await?)
    }

}
