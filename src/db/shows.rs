//! Show database repository
//!
//! Besides plain CRUD this keeps the episode table in step with each show's
//! tracked range: creating a show generates one row per absolute episode, and
//! changing the range or season layout regenerates them.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use super::episodes::{self, EpisodeRecord, EpisodeRepository, EpisodeUpdate};
use super::sqlite_helpers::{
    datetime_to_str, decode_err, int_to_u32, json_to_vec, now_iso8601, str_to_datetime,
    str_to_datetime_opt, to_json, vec_to_json,
};
use crate::error::ScanError;
use crate::services::numbering::{
    DEFAULT_EPISODES_PER_SEASON, EpisodeRange, EpisodesPerSeason, validate_layout,
};

/// Show record from database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowRecord {
    pub id: i64,
    pub title: String,
    pub alternate_names: Vec<String>,
    #[serde(flatten)]
    pub range: EpisodeRange,
    pub episodes_per_season: EpisodesPerSeason,
    pub quality: Option<String>,
    pub status: String,
    pub last_scanned: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShowRecord {
    /// `(min_absolute, max_absolute)` of the tracked range
    pub fn absolute_bounds(&self) -> (u32, u32) {
        self.range.absolute_bounds(&self.episodes_per_season)
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ShowRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let alternate_names: String = row.try_get("alternate_names")?;
        let layout: String = row.try_get("episodes_per_season")?;
        let last_scanned: Option<String> = row.try_get("last_scanned")?;
        let created_str: String = row.try_get("created_at")?;
        let updated_str: String = row.try_get("updated_at")?;

        let int = |column: &str| -> sqlx::Result<u32> {
            let value: i64 = row.try_get(column)?;
            int_to_u32(value, column).map_err(decode_err)
        };

        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            alternate_names: json_to_vec(&alternate_names),
            range: EpisodeRange {
                start_season: int("start_season")?,
                start_episode: int("start_episode")?,
                end_season: int("end_season")?,
                end_episode: int("end_episode")?,
            },
            episodes_per_season: EpisodesPerSeason::parse_or_default(
                &layout,
                DEFAULT_EPISODES_PER_SEASON,
            ),
            quality: row.try_get("quality")?,
            status: row.try_get("status")?,
            last_scanned: str_to_datetime_opt(last_scanned.as_deref()).map_err(decode_err)?,
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
            updated_at: str_to_datetime(&updated_str).map_err(decode_err)?,
        })
    }
}

fn default_status() -> String {
    "watching".to_string()
}

/// Input for creating a show
#[derive(Debug, Clone, Deserialize)]
pub struct CreateShow {
    pub title: String,
    #[serde(default)]
    pub alternate_names: Vec<String>,
    #[serde(flatten)]
    pub range: EpisodeRange,
    #[serde(default)]
    pub episodes_per_season: Option<EpisodesPerSeason>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

/// Partial update of a show; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateShow {
    pub title: Option<String>,
    pub alternate_names: Option<Vec<String>>,
    pub start_season: Option<u32>,
    pub start_episode: Option<u32>,
    pub end_season: Option<u32>,
    pub end_episode: Option<u32>,
    pub episodes_per_season: Option<EpisodesPerSeason>,
    pub quality: Option<String>,
    pub status: Option<String>,
}

/// Storage the scan engine works against
#[async_trait]
pub trait ShowRepository: Send + Sync {
    async fn get_show(&self, id: i64) -> Result<Option<ShowRecord>>;

    /// All shows in ascending id order
    async fn list_shows(&self) -> Result<Vec<ShowRecord>>;

    async fn list_episodes(&self, show_id: i64) -> Result<Vec<EpisodeRecord>>;

    async fn upsert_episode(
        &self,
        show_id: i64,
        episode_number: u32,
        update: EpisodeUpdate,
    ) -> Result<EpisodeRecord>;

    async fn set_last_scanned(&self, show_id: i64, at: DateTime<Utc>) -> Result<()>;
}

const SHOW_COLUMNS: &str = r#"id, title, alternate_names, start_season, start_episode,
    end_season, end_episode, episodes_per_season, quality, status, last_scanned,
    created_at, updated_at"#;

pub struct SqliteShowRepository {
    pool: SqlitePool,
    episodes: EpisodeRepository,
}

impl SqliteShowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        let episodes = EpisodeRepository::new(pool.clone());
        Self { pool, episodes }
    }

    /// Insert a show and generate its episode rows.
    ///
    /// `default_layout` applies when the input carries no season layout.
    pub async fn create(
        &self,
        input: CreateShow,
        default_layout: &EpisodesPerSeason,
    ) -> Result<ShowRecord> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(ScanError::InvalidEpisodeConfig("title must not be empty".to_string()).into());
        }
        let layout = input.episodes_per_season.unwrap_or_else(|| default_layout.clone());
        validate_layout(&input.range, &layout)?;

        let (min, max) = input.range.absolute_bounds(&layout);
        let now = now_iso8601();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO shows (title, alternate_names, start_season, start_episode, end_season,
                end_episode, episodes_per_season, quality, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&title)
        .bind(vec_to_json(&input.alternate_names))
        .bind(i64::from(input.range.start_season))
        .bind(i64::from(input.range.start_episode))
        .bind(i64::from(input.range.end_season))
        .bind(i64::from(input.range.end_episode))
        .bind(to_json(&layout))
        .bind(&input.quality)
        .bind(&input.status)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        episodes::regenerate(&mut tx, id, min, max).await?;
        tx.commit().await?;

        info!(show_id = id, title = %title, min, max, "Created show");

        self.get_show(id)
            .await?
            .ok_or_else(|| ScanError::ShowNotFound(id).into())
    }

    /// Apply a partial update, regenerating episodes if the numbering changed
    pub async fn update(&self, id: i64, input: UpdateShow) -> Result<ShowRecord> {
        let existing = self.get_show(id).await?.ok_or(ScanError::ShowNotFound(id))?;

        let range = EpisodeRange {
            start_season: input.start_season.unwrap_or(existing.range.start_season),
            start_episode: input.start_episode.unwrap_or(existing.range.start_episode),
            end_season: input.end_season.unwrap_or(existing.range.end_season),
            end_episode: input.end_episode.unwrap_or(existing.range.end_episode),
        };
        let layout = input
            .episodes_per_season
            .unwrap_or_else(|| existing.episodes_per_season.clone());
        validate_layout(&range, &layout)?;

        let title = match input.title {
            Some(title) if title.trim().is_empty() => {
                return Err(ScanError::InvalidEpisodeConfig("title must not be empty".to_string()).into());
            }
            Some(title) => title.trim().to_string(),
            None => existing.title.clone(),
        };
        let alternate_names = input.alternate_names.unwrap_or(existing.alternate_names.clone());
        let quality = input.quality.or(existing.quality.clone());
        let status = input.status.unwrap_or(existing.status.clone());

        let renumbered = range != existing.range || layout != existing.episodes_per_season;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE shows SET title = ?, alternate_names = ?, start_season = ?, start_episode = ?,
                end_season = ?, end_episode = ?, episodes_per_season = ?, quality = ?, status = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&title)
        .bind(vec_to_json(&alternate_names))
        .bind(i64::from(range.start_season))
        .bind(i64::from(range.start_episode))
        .bind(i64::from(range.end_season))
        .bind(i64::from(range.end_episode))
        .bind(to_json(&layout))
        .bind(&quality)
        .bind(&status)
        .bind(now_iso8601())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if renumbered {
            let (min, max) = range.absolute_bounds(&layout);
            episodes::regenerate(&mut tx, id, min, max).await?;
            info!(show_id = id, min, max, "Regenerated episodes after range change");
        }
        tx.commit().await?;

        self.get_show(id)
            .await?
            .ok_or_else(|| ScanError::ShowNotFound(id).into())
    }

    /// Delete a show and its episodes. Returns false if it didn't exist.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ShowRepository for SqliteShowRepository {
    async fn get_show(&self, id: i64) -> Result<Option<ShowRecord>> {
        let record = sqlx::query_as::<_, ShowRecord>(&format!(
            "SELECT {} FROM shows WHERE id = ?",
            SHOW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_shows(&self) -> Result<Vec<ShowRecord>> {
        let records = sqlx::query_as::<_, ShowRecord>(&format!(
            "SELECT {} FROM shows ORDER BY id",
            SHOW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_episodes(&self, show_id: i64) -> Result<Vec<EpisodeRecord>> {
        self.episodes.list_by_show(show_id).await
    }

    async fn upsert_episode(
        &self,
        show_id: i64,
        episode_number: u32,
        update: EpisodeUpdate,
    ) -> Result<EpisodeRecord> {
        self.episodes.upsert(show_id, episode_number, &update).await
    }

    async fn set_last_scanned(&self, show_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE shows SET last_scanned = ?, updated_at = ? WHERE id = ?")
            .bind(datetime_to_str(at))
            .bind(now_iso8601())
            .bind(show_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
