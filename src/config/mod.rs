//! Application configuration management

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::services::numbering::{DEFAULT_EPISODES_PER_SEASON, EpisodesPerSeason};
use crate::services::{ScanSettings, ScanStateOptions};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    pub port: u16,

    /// SQLite database file
    pub database_path: String,

    /// Emit logs as JSON instead of human-readable text
    pub log_json: bool,

    /// Base URL of the search feed (nyaa-style RSS or a Torznab endpoint)
    pub search_feed_url: String,

    /// Torznab API key; when absent the feed is queried as plain RSS
    pub search_api_key: Option<String>,

    pub scan: ScanConfig,
}

/// Scanner tuning
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub max_consecutive_failures: u32,
    pub episode_delay: Duration,
    pub search_timeout: Duration,
    pub state_cache_ttl: Duration,
    pub status_max_len: usize,
    pub max_scan_duration: Duration,
    pub default_episodes_per_season: u32,
    /// Cron expression for the automatic scan; empty disables it
    pub schedule: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 1,
            episode_delay: Duration::from_millis(2000),
            search_timeout: Duration::from_secs(30),
            state_cache_ttl: Duration::from_millis(2000),
            status_max_len: 50,
            max_scan_duration: Duration::from_secs(360 * 60),
            default_episodes_per_season: DEFAULT_EPISODES_PER_SEASON,
            schedule: "0 0 */6 * * *".to_string(),
        }
    }
}

impl ScanConfig {
    pub fn engine_settings(&self) -> ScanSettings {
        ScanSettings {
            max_consecutive_failures: self.max_consecutive_failures,
            episode_delay: self.episode_delay,
            search_timeout: self.search_timeout,
        }
    }

    pub fn state_options(&self) -> ScanStateOptions {
        ScanStateOptions {
            cache_ttl: self.state_cache_ttl,
            status_max_len: self.status_max_len,
            max_scan_duration: self.max_scan_duration,
        }
    }

    /// Layout given to shows created without one
    pub fn default_layout(&self) -> EpisodesPerSeason {
        EpisodesPerSeason::FixedCount(self.default_episodes_per_season)
    }
}

/// Parse `key` if set, otherwise use `default`
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        _ => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ScanConfig::default();

        let database_path = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .map(|url| url.trim_start_matches("sqlite://").to_string())
            .unwrap_or_else(|| "./data/kiroku.db".to_string());

        let max_consecutive_failures: u32 = parse_or(
            &lookup,
            "SCAN_MAX_CONSECUTIVE_FAILURES",
            defaults.max_consecutive_failures,
        )?;
        if max_consecutive_failures == 0 {
            anyhow::bail!("Invalid SCAN_MAX_CONSECUTIVE_FAILURES: must be at least 1");
        }

        let default_episodes_per_season: u32 = parse_or(
            &lookup,
            "SCAN_DEFAULT_EPISODES_PER_SEASON",
            defaults.default_episodes_per_season,
        )?;
        EpisodesPerSeason::FixedCount(default_episodes_per_season)
            .validate()
            .context("Invalid SCAN_DEFAULT_EPISODES_PER_SEASON")?;

        let max_scan_secs = parse_or(&lookup, "SCAN_MAX_DURATION_MINS", 360u64)?
            .checked_mul(60)
            .context("Invalid SCAN_MAX_DURATION_MINS: too large")?;

        let scan = ScanConfig {
            max_consecutive_failures,
            episode_delay: Duration::from_millis(parse_or(&lookup, "SCAN_EPISODE_DELAY_MS", 2000u64)?),
            search_timeout: Duration::from_secs(parse_or(&lookup, "SCAN_SEARCH_TIMEOUT_SECS", 30u64)?),
            state_cache_ttl: Duration::from_millis(parse_or(&lookup, "SCAN_STATE_CACHE_TTL_MS", 2000u64)?),
            status_max_len: parse_or(&lookup, "SCAN_STATUS_MAX_LEN", defaults.status_max_len)?.max(10),
            max_scan_duration: Duration::from_secs(max_scan_secs),
            default_episodes_per_season,
            schedule: lookup("SCAN_SCHEDULE")
                .map(|s| s.trim().to_string())
                .unwrap_or(defaults.schedule),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            port: parse_or(&lookup, "PORT", 3001u16)?,

            database_path,

            log_json: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            search_feed_url: lookup("SEARCH_FEED_URL").unwrap_or_else(|| "https://nyaa.si/".to_string()),

            search_api_key: lookup("SEARCH_API_KEY").filter(|k| !k.is_empty()),

            scan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.database_path, "./data/kiroku.db");
        assert_eq!(config.search_feed_url, "https://nyaa.si/");
        assert!(config.search_api_key.is_none());
        assert_eq!(config.scan.max_consecutive_failures, 1);
        assert_eq!(config.scan.episode_delay, Duration::from_secs(2));
        assert_eq!(config.scan.status_max_len, 50);
        assert_eq!(config.scan.max_scan_duration, Duration::from_secs(6 * 3600));
        assert_eq!(config.scan.schedule, "0 0 */6 * * *");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "sqlite://./tmp/test.db"),
            ("SCAN_MAX_CONSECUTIVE_FAILURES", "3"),
            ("SCAN_EPISODE_DELAY_MS", "0"),
            ("SCAN_SCHEDULE", ""),
            ("LOG_FORMAT", "JSON"),
            ("SEARCH_API_KEY", "abc"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, "./tmp/test.db");
        assert_eq!(config.scan.max_consecutive_failures, 3);
        assert_eq!(config.scan.episode_delay, Duration::ZERO);
        assert!(config.scan.schedule.is_empty());
        assert!(config.log_json);
        assert_eq!(config.search_api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_invalid_values() {
        let err = config_from(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));

        assert!(config_from(&[("SCAN_MAX_CONSECUTIVE_FAILURES", "0")]).is_err());
        assert!(config_from(&[("SCAN_DEFAULT_EPISODES_PER_SEASON", "0")]).is_err());
    }

    #[test]
    fn test_scan_duration_overflow_is_rejected() {
        let minutes = u64::MAX.to_string();
        let err = config_from(&[("SCAN_MAX_DURATION_MINS", minutes.as_str())]).unwrap_err();
        assert!(err.to_string().contains("SCAN_MAX_DURATION_MINS"));

        let config = config_from(&[("SCAN_MAX_DURATION_MINS", "90")]).unwrap();
        assert_eq!(config.scan.max_scan_duration, Duration::from_secs(90 * 60));
    }
}
