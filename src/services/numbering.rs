//! Absolute episode numbering
//!
//! Shows are tracked on a single 1-based absolute episode axis. A show's
//! season layout is either a fixed number of episodes per season or an
//! explicit count for each season. Seasons past the end of an explicit list
//! reuse the last listed count, so long-running shows can extend beyond
//! their configured seasons without a config change.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ScanError, ScanResult};

/// Fallback episode count used when a stored layout can't be decoded
pub const DEFAULT_EPISODES_PER_SEASON: u32 = 12;

/// Upper bound on the number of episodes one show may track
pub const MAX_EPISODES_PER_SHOW: u32 = 10_000;

/// Season layout of a show.
///
/// Stored as JSON text: `12` for a fixed count or `[12, 13]` for per-season
/// counts. Use [`EpisodesPerSeason::parse`] at the boundary so the rest of
/// the code only sees the decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpisodesPerSeason {
    FixedCount(u32),
    PerSeasonCounts(Vec<u32>),
}

impl Default for EpisodesPerSeason {
    fn default() -> Self {
        Self::FixedCount(DEFAULT_EPISODES_PER_SEASON)
    }
}

impl EpisodesPerSeason {
    /// Reject layouts with zero-episode seasons or no seasons at all.
    pub fn validate(&self) -> ScanResult<()> {
        match self {
            Self::FixedCount(0) => Err(ScanError::InvalidEpisodeConfig(
                "episodes per season must be at least 1".to_string(),
            )),
            Self::FixedCount(_) => Ok(()),
            Self::PerSeasonCounts(counts) if counts.is_empty() => Err(
                ScanError::InvalidEpisodeConfig("per-season counts must not be empty".to_string()),
            ),
            Self::PerSeasonCounts(counts) => match counts.iter().position(|&n| n == 0) {
                Some(idx) => Err(ScanError::InvalidEpisodeConfig(format!(
                    "season {} has zero episodes",
                    idx + 1
                ))),
                None => Ok(()),
            },
        }
    }

    /// Decode and validate the stored JSON form.
    pub fn parse(raw: &str) -> ScanResult<Self> {
        let layout: Self = serde_json::from_str(raw.trim()).map_err(|e| {
            ScanError::InvalidEpisodeConfig(format!("cannot decode {:?}: {}", raw, e))
        })?;
        layout.validate()?;
        Ok(layout)
    }

    /// Decode the stored form, falling back to a fixed count when the value
    /// is malformed. Used when loading rows written by older versions.
    pub fn parse_or_default(raw: &str, fallback: u32) -> Self {
        Self::parse(raw).unwrap_or_else(|err| {
            warn!(raw = %raw, error = %err, fallback, "Unreadable season layout, using fixed count");
            Self::FixedCount(fallback.max(1))
        })
    }

    /// Number of episodes in a 1-based season
    pub fn episodes_in_season(&self, season: u32) -> u32 {
        match self {
            Self::FixedCount(n) => (*n).max(1),
            Self::PerSeasonCounts(counts) => {
                let idx = season.max(1) as usize - 1;
                counts
                    .get(idx)
                    .or(counts.last())
                    .copied()
                    .unwrap_or(1)
                    .max(1)
            }
        }
    }

    fn last_count(counts: &[u32]) -> u32 {
        counts.last().copied().unwrap_or(1).max(1)
    }

    /// Map `(season, episode)` to the absolute episode number.
    ///
    /// Season and episode are clamped to at least 1. Saturates at
    /// `u32::MAX`; ranges that would reach it are rejected by
    /// [`validate_layout`].
    pub fn to_absolute(&self, season: u32, episode: u32) -> u32 {
        self.checked_absolute(season, episode).unwrap_or(u32::MAX)
    }

    /// [`to_absolute`](Self::to_absolute), or `None` when the number
    /// doesn't fit in a `u32`.
    pub fn checked_absolute(&self, season: u32, episode: u32) -> Option<u32> {
        let season = season.max(1);
        let episode = episode.max(1);

        let preceding = match self {
            Self::FixedCount(n) => (season - 1).checked_mul((*n).max(1))?,
            Self::PerSeasonCounts(counts) => {
                let seasons_before = (season - 1) as usize;
                let listed = counts
                    .iter()
                    .take(seasons_before)
                    .try_fold(0u32, |acc, &n| acc.checked_add(n.max(1)))?;
                let extrapolated = u32::try_from(seasons_before.saturating_sub(counts.len())).ok()?;
                listed.checked_add(extrapolated.checked_mul(Self::last_count(counts))?)?
            }
        };

        preceding.checked_add(episode)
    }

    /// Map an absolute episode number back to `(season, episode)`.
    ///
    /// Inverse of [`to_absolute`](Self::to_absolute) for every episode that
    /// exists in the layout. Values below 1 are clamped to 1.
    pub fn to_season_episode(&self, absolute: u32) -> (u32, u32) {
        let absolute = absolute.max(1);

        match self {
            Self::FixedCount(n) => {
                let n = (*n).max(1);
                ((absolute - 1) / n + 1, (absolute - 1) % n + 1)
            }
            Self::PerSeasonCounts(counts) => {
                let mut remaining = absolute;
                for (idx, &count) in counts.iter().enumerate() {
                    let count = count.max(1);
                    if remaining <= count {
                        return (idx as u32 + 1, remaining);
                    }
                    remaining -= count;
                }

                // Past the listed seasons: every further season has the last count
                let last = Self::last_count(counts);
                let full_seasons = (remaining - 1) / last;
                let episode = (remaining - 1) % last + 1;
                (counts.len() as u32 + full_seasons + 1, episode)
            }
        }
    }
}

/// Tracked portion of a show, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRange {
    pub start_season: u32,
    pub start_episode: u32,
    pub end_season: u32,
    pub end_episode: u32,
}

impl EpisodeRange {
    pub fn new(start_season: u32, start_episode: u32, end_season: u32, end_episode: u32) -> Self {
        Self {
            start_season,
            start_episode,
            end_season,
            end_episode,
        }
    }

    /// `(min_absolute, max_absolute)` of the range under a layout
    pub fn absolute_bounds(&self, layout: &EpisodesPerSeason) -> (u32, u32) {
        (
            layout.to_absolute(self.start_season, self.start_episode),
            layout.to_absolute(self.end_season, self.end_episode),
        )
    }
}

/// Validate a range together with the layout it will be numbered under.
pub fn validate_layout(range: &EpisodeRange, layout: &EpisodesPerSeason) -> ScanResult<()> {
    layout.validate()?;

    let fields = [
        ("start_season", range.start_season),
        ("start_episode", range.start_episode),
        ("end_season", range.end_season),
        ("end_episode", range.end_episode),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, value)| *value == 0) {
        return Err(ScanError::InvalidEpisodeConfig(format!("{} must be at least 1", name)));
    }

    let bound = |season: u32, episode: u32| {
        layout.checked_absolute(season, episode).ok_or_else(|| {
            ScanError::InvalidEpisodeConfig(format!(
                "S{:02}E{:02} is past the last representable episode number",
                season, episode
            ))
        })
    };
    let min = bound(range.start_season, range.start_episode)?;
    let max = bound(range.end_season, range.end_episode)?;
    if min > max {
        return Err(ScanError::InvalidEpisodeConfig(format!(
            "range S{:02}E{:02}..S{:02}E{:02} ends before it starts",
            range.start_season, range.start_episode, range.end_season, range.end_episode
        )));
    }
    if max - min >= MAX_EPISODES_PER_SHOW {
        return Err(ScanError::InvalidEpisodeConfig(format!(
            "range covers {} episodes, the limit is {}",
            u64::from(max - min) + 1,
            MAX_EPISODES_PER_SHOW
        )));
    }

    Ok(())
}
