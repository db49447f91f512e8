//! Release title matching
//!
//! Indexer search is fuzzy, so results are checked against the episode we
//! asked for. Anime releases number episodes either as `SxxEyy` or as a bare
//! number after the title (`Show - 21`), which may be absolute or
//! season-relative.

use once_cell::sync::Lazy;
use regex::Regex;

static SEASON_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})\s?E(\d{1,4})(?:v\d)?\b").expect("valid regex"));

static DASH_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s-\s(\d{1,4})(?:v\d)?(?:\s|\[|\(|\.|$)").expect("valid regex"));

static EPISODE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:ep|episode|e)\.?\s?(\d{1,4})(?:v\d)?\b").expect("valid regex"));

/// Whether `title` looks like a release of the given episode.
///
/// An explicit `SxxEyy` marker is authoritative. Otherwise a bare episode
/// number must equal either the absolute or the season-relative number.
pub fn title_matches_episode(title: &str, season: u32, episode: u32, absolute: u32) -> bool {
    let markers: Vec<(u32, u32)> = SEASON_EPISODE
        .captures_iter(title)
        .filter_map(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .collect();
    if !markers.is_empty() {
        return markers.contains(&(season, episode));
    }

    DASH_NUMBER
        .captures_iter(title)
        .chain(EPISODE_WORD.captures_iter(title))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .any(|n| n == absolute || n == episode)
}
