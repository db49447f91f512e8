//! Resolution parsing and candidate ranking
//!
//! Releases are ranked by seeders first and resolution second. Ties keep the
//! order the indexer returned them in.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::indexer::SearchCandidate;

/// Video resolution, ordered from worst to best
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Resolution {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2160p")]
    P2160,
}

static RESOLUTION_PATTERNS: Lazy<Vec<(Regex, Resolution)>> = Lazy::new(|| {
    [
        (r"(?i)\b(2160p|4k|uhd|3840x2160)\b", Resolution::P2160),
        (r"(?i)\b(1080p|1080i|fhd|fullhd|1920x1080)\b", Resolution::P1080),
        (r"(?i)\b(720p|1280x720)\b", Resolution::P720),
        (r"(?i)\b(480p|576p|sd|dvdrip|848x480|640x480)\b", Resolution::P480),
    ]
    .into_iter()
    .map(|(pattern, resolution)| (Regex::new(pattern).expect("valid resolution regex"), resolution))
    .collect()
});

impl Resolution {
    /// Best-effort resolution from a release title
    pub fn parse(title: &str) -> Self {
        RESOLUTION_PATTERNS
            .iter()
            .find(|(re, _)| re.is_match(title))
            .map(|(_, resolution)| *resolution)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P2160 => "2160p",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the candidate with the most seeders, breaking ties on resolution.
///
/// On a full tie the earliest candidate wins.
pub fn select_best(candidates: &[SearchCandidate]) -> Option<&SearchCandidate> {
    candidates.iter().reduce(|best, candidate| {
        let key = (candidate.seeders, candidate.quality);
        if key > (best.seeders, best.quality) {
            candidate
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(title: &str, seeders: u32) -> SearchCandidate {
        SearchCandidate {
            title: title.to_string(),
            magnet_link: format!("magnet:?xt=urn:btih:{}", title.len()),
            quality: Resolution::parse(title),
            seeders,
        }
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(Resolution::parse("[SubsPlease] Frieren - 05 (1080p) [ABCD1234].mkv"), Resolution::P1080);
        assert_eq!(Resolution::parse("Show.S01E01.720p.WEB.x264"), Resolution::P720);
        assert_eq!(Resolution::parse("Show.S01E01.2160p.UHD.mkv"), Resolution::P2160);
        assert_eq!(Resolution::parse("Show - 01 [1920x1080 HEVC]"), Resolution::P1080);
        assert_eq!(Resolution::parse("Show - 01 [480p]"), Resolution::P480);
        assert_eq!(Resolution::parse("Show - 01 [x264]"), Resolution::Unknown);
    }

    #[test]
    fn test_resolution_ordering() {
        assert!(Resolution::P2160 > Resolution::P1080);
        assert!(Resolution::P1080 > Resolution::P720);
        assert!(Resolution::P480 > Resolution::Unknown);
    }

    #[test]
    fn test_seeders_beat_resolution() {
        let candidates = vec![candidate("Show - 01 (1080p)", 10), candidate("Show - 01 (720p)", 50)];
        assert_eq!(select_best(&candidates).unwrap().title, "Show - 01 (720p)");
    }

    #[test]
    fn test_resolution_breaks_seeder_tie() {
        let candidates = vec![candidate("Show - 01 (720p)", 100), candidate("Show - 01 (1080p)", 100)];
        assert_eq!(select_best(&candidates).unwrap().quality, Resolution::P1080);
    }

    #[test]
    fn test_full_tie_keeps_first() {
        let candidates = vec![candidate("First (1080p)", 5), candidate("Second (1080p)", 5)];
        assert_eq!(select_best(&candidates).unwrap().title, "First (1080p)");
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn test_resolution_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Resolution::P1080).unwrap(), "\"1080p\"");
        assert_eq!(Resolution::P720.to_string(), "720p");
    }
}
