//! Persistence for the scan state singleton
//!
//! There is exactly one scan state row (`id = 1`). The store layer above this
//! decides what gets written; backends only load and save whole snapshots.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::{
    bool_to_int, datetime_opt_to_str, datetime_to_str, decode_err, int_to_bool, str_to_datetime,
    str_to_datetime_opt,
};

pub const STATUS_IDLE: &str = "idle";

/// Snapshot of the scan singleton
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanState {
    pub is_scanning: bool,
    /// Generation of the most recent scan; bumped on every start
    pub run_id: i64,
    pub current_show_id: Option<i64>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ScanState {
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            is_scanning: false,
            run_id: 0,
            current_show_id: None,
            status: STATUS_IDLE.to_string(),
            started_at: None,
            updated_at: now,
        }
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ScanState {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let is_scanning: i32 = row.try_get("is_scanning")?;
        let started_at: Option<String> = row.try_get("started_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self {
            is_scanning: int_to_bool(is_scanning),
            run_id: row.try_get("run_id")?,
            current_show_id: row.try_get("current_show_id")?,
            status: row.try_get("status")?,
            started_at: str_to_datetime_opt(started_at.as_deref()).map_err(decode_err)?,
            updated_at: str_to_datetime(&updated_at).map_err(decode_err)?,
        })
    }
}

/// Where the scan singleton lives
#[async_trait]
pub trait ScanStateBackend: Send + Sync {
    /// Current snapshot, `None` if it was never written
    async fn load(&self) -> Result<Option<ScanState>>;

    async fn save(&self, state: &ScanState) -> Result<()>;
}

pub struct ScanStateRepository {
    pool: SqlitePool,
}

impl ScanStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanStateBackend for ScanStateRepository {
    async fn load(&self) -> Result<Option<ScanState>> {
        let record = sqlx::query_as::<_, ScanState>(
            r#"
            SELECT is_scanning, run_id, current_show_id, status, started_at, updated_at
            FROM scan_state
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save(&self, state: &ScanState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_state (id, is_scanning, run_id, current_show_id, status, started_at, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                is_scanning = excluded.is_scanning,
                run_id = excluded.run_id,
                current_show_id = excluded.current_show_id,
                status = excluded.status,
                started_at = excluded.started_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(bool_to_int(state.is_scanning))
        .bind(state.run_id)
        .bind(state.current_show_id)
        .bind(&state.status)
        .bind(datetime_opt_to_str(state.started_at))
        .bind(datetime_to_str(state.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Process-local backend for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryScanStateBackend {
    state: Mutex<Option<ScanState>>,
}

impl MemoryScanStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with a snapshot, e.g. to simulate a crash mid-scan
    pub fn with_state(state: ScanState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    pub fn snapshot(&self) -> Option<ScanState> {
        self.state.lock().clone()
    }
}

#[async_trait]
impl ScanStateBackend for MemoryScanStateBackend {
    async fn load(&self) -> Result<Option<ScanState>> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, state: &ScanState) -> Result<()> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}
