//! Episode database repository
//!
//! Episodes are keyed by `(show_id, episode_number)` where the number is the
//! absolute episode number within the show.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use super::sqlite_helpers::{
    bool_to_int, decode_err, int_to_bool, int_to_u32, now_iso8601, str_to_datetime,
};

/// Episode record from database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeRecord {
    pub id: i64,
    pub show_id: i64,
    pub episode_number: u32,
    pub is_downloaded: bool,
    pub magnet_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for EpisodeRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let episode_number: i64 = row.try_get("episode_number")?;
        let is_downloaded: i32 = row.try_get("is_downloaded")?;
        let created_str: String = row.try_get("created_at")?;
        let updated_str: String = row.try_get("updated_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            show_id: row.try_get("show_id")?,
            episode_number: int_to_u32(episode_number, "episode_number").map_err(decode_err)?,
            is_downloaded: int_to_bool(is_downloaded),
            magnet_link: row.try_get("magnet_link")?,
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
            updated_at: str_to_datetime(&updated_str).map_err(decode_err)?,
        })
    }
}

/// Download state written by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeUpdate {
    pub is_downloaded: bool,
    pub magnet_link: Option<String>,
}

impl EpisodeUpdate {
    pub fn downloaded(magnet_link: impl Into<String>) -> Self {
        Self {
            is_downloaded: true,
            magnet_link: Some(magnet_link.into()),
        }
    }
}

const EPISODE_COLUMNS: &str =
    "id, show_id, episode_number, is_downloaded, magnet_link, created_at, updated_at";

pub struct EpisodeRepository {
    pool: SqlitePool,
}

impl EpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All episodes of a show ordered by absolute number
    pub async fn list_by_show(&self, show_id: i64) -> Result<Vec<EpisodeRecord>> {
        let records = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "SELECT {} FROM episodes WHERE show_id = ? ORDER BY episode_number",
            EPISODE_COLUMNS
        ))
        .bind(show_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Create or update the row for `(show_id, episode_number)`
    pub async fn upsert(
        &self,
        show_id: i64,
        episode_number: u32,
        update: &EpisodeUpdate,
    ) -> Result<EpisodeRecord> {
        let now = now_iso8601();

        let record = sqlx::query_as::<_, EpisodeRecord>(&format!(
            r#"
            INSERT INTO episodes (show_id, episode_number, is_downloaded, magnet_link, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (show_id, episode_number) DO UPDATE SET
                is_downloaded = excluded.is_downloaded,
                magnet_link = excluded.magnet_link,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            EPISODE_COLUMNS
        ))
        .bind(show_id)
        .bind(i64::from(episode_number))
        .bind(bool_to_int(update.is_downloaded))
        .bind(&update.magnet_link)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }
}

/// Rebuild a show's episode rows to cover exactly `min..=max`.
///
/// Download state of numbers that remain in range is carried over; rows
/// outside the new range are dropped.
pub(crate) async fn regenerate(
    conn: &mut SqliteConnection,
    show_id: i64,
    min_absolute: u32,
    max_absolute: u32,
) -> Result<()> {
    let now = now_iso8601();

    sqlx::query("DELETE FROM episodes WHERE show_id = ? AND (episode_number < ? OR episode_number > ?)")
        .bind(show_id)
        .bind(i64::from(min_absolute))
        .bind(i64::from(max_absolute))
        .execute(&mut *conn)
        .await?;

    for episode_number in min_absolute..=max_absolute {
        sqlx::query(
            r#"
            INSERT INTO episodes (show_id, episode_number, is_downloaded, magnet_link, created_at, updated_at)
            VALUES (?, ?, 0, NULL, ?, ?)
            ON CONFLICT (show_id, episode_number) DO NOTHING
            "#,
        )
        .bind(show_id)
        .bind(i64::from(episode_number))
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
