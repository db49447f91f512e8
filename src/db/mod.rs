//! Database connection and repositories

pub mod episodes;
pub mod scan_state;
pub mod shows;
pub mod sqlite_helpers;

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub use episodes::{EpisodeRecord, EpisodeUpdate};
pub use scan_state::{MemoryScanStateBackend, ScanState, ScanStateBackend, ScanStateRepository};
pub use shows::{CreateShow, ShowRecord, ShowRepository, SqliteShowRepository, UpdateShow};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5)
    }

    /// Open (creating if needed) the SQLite database at `path`
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", path))?;

        Ok(Self { pool })
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn shows(&self) -> SqliteShowRepository {
        SqliteShowRepository::new(self.pool.clone())
    }

    pub fn scan_state(&self) -> ScanStateRepository {
        ScanStateRepository::new(self.pool.clone())
    }

    /// Cheap liveness probe used by the readiness endpoint
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
