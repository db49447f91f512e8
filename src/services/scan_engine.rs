//! Episode scan engine
//!
//! Scans a show by walking its absolute episode range from just past the
//! highest downloaded episode, searching for each missing episode in turn.
//! A show's scan ends when the range is exhausted, the consecutive failure
//! limit is hit, or the scan is cancelled.
//!
//! The engine never leaves the scan singleton claimed: [`ScanEngine::run`]
//! writes the final idle state exactly once, whatever happened to the
//! individual shows. Per-show scans only ever write progress, and only
//! while their run still owns the singleton.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::scan_state::{STATUS_COMPLETED, STATUS_STOPPED, ScanStatePatch, ScanStateStore};
use crate::db::{EpisodeRecord, EpisodeUpdate, ShowRecord, ShowRepository};
use crate::error::{ScanError, ScanResult};
use crate::indexer::{EpisodeQuery, SearchCandidate, SearchProvider};
use crate::torrent::select_best;

#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Stop scanning a show after this many misses or failures in a row
    pub max_consecutive_failures: u32,
    /// Pause between consecutive searches
    pub episode_delay: Duration,
    /// Upper bound on a single search; exceeding it counts as a failure
    pub search_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 1,
            episode_delay: Duration::from_secs(2),
            search_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "show_id", rename_all = "snake_case")]
pub enum ScanTarget {
    Show(i64),
    All,
}

/// Consulted before each show and each episode; returning false cancels
#[async_trait]
pub trait ScanGuard: Send + Sync {
    async fn should_continue(&self) -> bool;
}

/// Continues while the given run still owns the scan singleton
pub struct StoreGuard {
    state: Arc<ScanStateStore>,
    run_id: i64,
}

impl StoreGuard {
    pub fn new(state: Arc<ScanStateStore>, run_id: i64) -> Self {
        Self { state, run_id }
    }
}

#[async_trait]
impl ScanGuard for StoreGuard {
    async fn should_continue(&self) -> bool {
        match self.state.is_active(self.run_id).await {
            Ok(active) => active,
            Err(e) => {
                error!(error = %e, "Failed to read scan state, cancelling scan");
                false
            }
        }
    }
}

/// A claimed scan, returned by [`ScanEngine::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanTicket {
    pub run_id: i64,
    pub target: ScanTarget,
}

/// Why a show's scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every episode in range was already downloaded
    UpToDate,
    /// Walked to the end of the range
    RangeExhausted,
    FailureLimit,
    Cancelled,
}

/// Result of searching one episode
#[derive(Debug)]
pub enum SearchOutcome {
    Found(SearchCandidate),
    NotFound,
    Failed(ScanError),
}

/// Where a show's scan starts and ends, derived from its stored episodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    pub min_absolute: u32,
    pub max_absolute: u32,
    /// Highest downloaded episode in range, or `min_absolute - 1`
    pub highest_downloaded: u32,
    pub next_candidate: u32,
    downloaded: BTreeSet<u32>,
}

impl ScanPlan {
    pub fn new(show: &ShowRecord, episodes: &[EpisodeRecord]) -> Self {
        let (min_absolute, max_absolute) = show.absolute_bounds();
        let downloaded: BTreeSet<u32> = episodes
            .iter()
            .filter(|e| e.is_downloaded)
            .map(|e| e.episode_number)
            .filter(|n| (min_absolute..=max_absolute).contains(n))
            .collect();

        let highest_downloaded = downloaded
            .last()
            .copied()
            .unwrap_or(min_absolute.saturating_sub(1));

        Self {
            min_absolute,
            max_absolute,
            highest_downloaded,
            next_candidate: highest_downloaded.saturating_add(1),
            downloaded,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.highest_downloaded >= self.max_absolute
    }

    pub fn is_downloaded(&self, absolute: u32) -> bool {
        self.downloaded.contains(&absolute)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowScanReport {
    pub show_id: i64,
    pub title: String,
    pub searched: u32,
    /// Absolute numbers of episodes found during this scan
    pub found: Vec<u32>,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowScanFailure {
    pub show_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub target: ScanTarget,
    pub reports: Vec<ShowScanReport>,
    pub failures: Vec<ShowScanFailure>,
    pub cancelled: bool,
    pub final_status: String,
}

impl ScanSummary {
    fn new(target: ScanTarget) -> Self {
        Self {
            target,
            reports: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
            final_status: STATUS_COMPLETED.to_string(),
        }
    }

    pub fn episodes_found(&self) -> usize {
        self.reports.iter().map(|r| r.found.len()).sum()
    }
}

pub struct ScanEngine {
    shows: Arc<dyn ShowRepository>,
    search: Arc<dyn SearchProvider>,
    state: Arc<ScanStateStore>,
    settings: ScanSettings,
}

impl ScanEngine {
    pub fn new(
        shows: Arc<dyn ShowRepository>,
        search: Arc<dyn SearchProvider>,
        state: Arc<ScanStateStore>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            shows,
            search,
            state,
            settings,
        }
    }

    pub fn state(&self) -> &Arc<ScanStateStore> {
        &self.state
    }

    /// Validate the target and claim the scan singleton
    pub async fn begin(&self, target: ScanTarget) -> ScanResult<ScanTicket> {
        let (status, current_show_id) = match target {
            ScanTarget::Show(id) => {
                let show = self
                    .shows
                    .get_show(id)
                    .await?
                    .ok_or(ScanError::ShowNotFound(id))?;
                (format!("Scanning {}", show.title), Some(id))
            }
            ScanTarget::All => ("Scanning all shows".to_string(), None),
        };

        match self.state.try_begin(status, current_show_id).await? {
            Some(state) => {
                info!(scan_target = ?target, run_id = state.run_id, "Scan started");
                Ok(ScanTicket {
                    run_id: state.run_id,
                    target,
                })
            }
            None => Err(ScanError::AlreadyScanning),
        }
    }

    /// Claim the singleton and run the scan to completion
    pub async fn scan(&self, target: ScanTarget) -> ScanResult<ScanSummary> {
        let ticket = self.begin(target).await?;
        Ok(self.run(ticket).await)
    }

    /// Run a scan claimed by [`begin`](Self::begin)
    pub async fn run(&self, ticket: ScanTicket) -> ScanSummary {
        let guard = StoreGuard::new(self.state.clone(), ticket.run_id);
        self.run_with_guard(ticket, &guard).await
    }

    pub async fn run_with_guard(&self, ticket: ScanTicket, guard: &dyn ScanGuard) -> ScanSummary {
        let mut summary = match ticket.target {
            ScanTarget::Show(id) => self.run_single(ticket.run_id, id, guard).await,
            ScanTarget::All => self.run_batch(ticket.run_id, guard).await,
        };

        // A stop that landed during the last search still ends as stopped
        if !summary.cancelled && matches!(self.state.is_active(ticket.run_id).await, Ok(false)) {
            summary.cancelled = true;
            summary.final_status = STATUS_STOPPED.to_string();
        }

        match self.state.finish_run(ticket.run_id, summary.final_status.clone()).await {
            Ok(true) => {}
            Ok(false) => warn!(run_id = ticket.run_id, "Scan was superseded, final state not written"),
            Err(e) => {
                error!(error = %e, "Failed to persist final scan state");
                self.state.invalidate_cache();
            }
        }

        info!(
            scan_target = ?ticket.target,
            run_id = ticket.run_id,
            status = %summary.final_status,
            shows = summary.reports.len(),
            failed = summary.failures.len(),
            found = summary.episodes_found(),
            "Scan finished"
        );
        summary
    }

    async fn run_single(&self, run_id: i64, show_id: i64, guard: &dyn ScanGuard) -> ScanSummary {
        let mut summary = ScanSummary::new(ScanTarget::Show(show_id));

        match self.scan_show(run_id, show_id, guard).await {
            Ok(report) => {
                if report.stop_reason == StopReason::Cancelled {
                    summary.cancelled = true;
                    summary.final_status = STATUS_STOPPED.to_string();
                }
                summary.reports.push(report);
            }
            Err(e) => {
                error!(show_id, error = %e, "Show scan failed");
                summary.final_status = format!("Error: {}", e);
                summary.failures.push(ShowScanFailure {
                    show_id,
                    error: e.to_string(),
                });
            }
        }

        summary
    }

    async fn run_batch(&self, run_id: i64, guard: &dyn ScanGuard) -> ScanSummary {
        let mut summary = ScanSummary::new(ScanTarget::All);

        let shows = match self.shows.list_shows().await {
            Ok(shows) => shows,
            Err(e) => {
                error!(error = %e, "Failed to list shows for batch scan");
                summary.final_status = format!("Error: {}", ScanError::from(e));
                return summary;
            }
        };

        let total = shows.len();
        info!(total, "Starting batch scan");

        for (index, show) in shows.iter().enumerate() {
            if !guard.should_continue().await {
                summary.cancelled = true;
                break;
            }

            let status = format!("[{}/{}] {}", index + 1, total, show.title);
            match self
                .state
                .write_if_scanning(run_id, ScanStatePatch::progress(status, Some(show.id)))
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => warn!(show_id = show.id, error = %e, "Failed to record scan progress"),
            }

            match self.scan_show(run_id, show.id, guard).await {
                Ok(report) => {
                    let cancelled = report.stop_reason == StopReason::Cancelled;
                    summary.reports.push(report);
                    if cancelled {
                        summary.cancelled = true;
                        break;
                    }
                }
                Err(e) => {
                    error!(show_id = show.id, title = %show.title, error = %e, "Show scan failed, continuing with next show");
                    summary.failures.push(ShowScanFailure {
                        show_id: show.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.final_status = if summary.cancelled {
            STATUS_STOPPED.to_string()
        } else if !summary.failures.is_empty() {
            format!("Scan completed with errors ({})", summary.failures.len())
        } else {
            STATUS_COMPLETED.to_string()
        };
        summary
    }

    /// Scan one show as part of run `run_id`. Never touches the scanning
    /// flag itself.
    pub async fn scan_show(
        &self,
        run_id: i64,
        show_id: i64,
        guard: &dyn ScanGuard,
    ) -> ScanResult<ShowScanReport> {
        let show = self
            .shows
            .get_show(show_id)
            .await?
            .ok_or(ScanError::ShowNotFound(show_id))?;
        let episodes = self.shows.list_episodes(show_id).await?;
        let plan = ScanPlan::new(&show, &episodes);

        debug!(
            show_id,
            min = plan.min_absolute,
            max = plan.max_absolute,
            highest = plan.highest_downloaded,
            "Planned show scan"
        );

        let mut report = ShowScanReport {
            show_id,
            title: show.title.clone(),
            searched: 0,
            found: Vec::new(),
            stop_reason: StopReason::RangeExhausted,
        };

        if plan.is_complete() {
            info!(show_id, title = %show.title, "All episodes in range downloaded");
            self.shows.set_last_scanned(show_id, Utc::now()).await?;
            report.stop_reason = StopReason::UpToDate;
            return Ok(report);
        }

        let mut consecutive_failures = 0u32;

        for absolute in plan.next_candidate..=plan.max_absolute {
            if !guard.should_continue().await {
                report.stop_reason = StopReason::Cancelled;
                break;
            }
            if plan.is_downloaded(absolute) {
                continue;
            }

            let (season, episode) = show.episodes_per_season.to_season_episode(absolute);
            let status = format!("Searching {} S{:02}E{:02}", show.title, season, episode);
            if self
                .state
                .write_if_scanning(run_id, ScanStatePatch::progress(status, Some(show_id)))
                .await?
                .is_none()
            {
                report.stop_reason = StopReason::Cancelled;
                break;
            }

            report.searched += 1;
            let query = EpisodeQuery::for_show(&show, season, episode, absolute);

            match self.search_episode(&query).await {
                SearchOutcome::Found(best) => {
                    self.shows
                        .upsert_episode(show_id, absolute, EpisodeUpdate::downloaded(best.magnet_link.clone()))
                        .await?;
                    info!(
                        show_id,
                        season,
                        episode,
                        absolute,
                        release = %best.title,
                        seeders = best.seeders,
                        quality = %best.quality,
                        "Episode found"
                    );
                    report.found.push(absolute);
                    consecutive_failures = 0;
                }
                SearchOutcome::NotFound => {
                    info!(show_id, season, episode, absolute, "No release found");
                    consecutive_failures += 1;
                }
                SearchOutcome::Failed(e) => {
                    error!(show_id, season, episode, absolute, error = %e, "Episode search failed");
                    consecutive_failures += 1;
                }
            }

            if consecutive_failures >= self.settings.max_consecutive_failures {
                info!(show_id, consecutive_failures, "Failure limit reached, moving on");
                report.stop_reason = StopReason::FailureLimit;
                break;
            }

            if absolute < plan.max_absolute {
                tokio::time::sleep(self.settings.episode_delay).await;
            }
        }

        if report.stop_reason != StopReason::Cancelled {
            self.shows.set_last_scanned(show_id, Utc::now()).await?;
        }

        Ok(report)
    }

    /// Search one episode with the configured timeout
    pub async fn search_episode(&self, query: &EpisodeQuery) -> SearchOutcome {
        let result = tokio::time::timeout(self.settings.search_timeout, self.search.search(query)).await;

        match result {
            Err(_) => SearchOutcome::Failed(ScanError::SearchTransientFailure(format!(
                "{} timed out after {}s",
                self.search.name(),
                self.settings.search_timeout.as_secs()
            ))),
            Ok(Err(e)) => SearchOutcome::Failed(ScanError::SearchTransientFailure(format!("{:#}", e))),
            Ok(Ok(candidates)) => match select_best(&candidates) {
                Some(best) => SearchOutcome::Found(best.clone()),
                None => SearchOutcome::NotFound,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::numbering::{EpisodeRange, EpisodesPerSeason};
    use pretty_assertions::assert_eq;

    fn show(range: EpisodeRange, layout: EpisodesPerSeason) -> ShowRecord {
        let now = Utc::now();
        ShowRecord {
            id: 1,
            title: "Frieren".to_string(),
            alternate_names: Vec::new(),
            range,
            episodes_per_season: layout,
            quality: None,
            status: "watching".to_string(),
            last_scanned: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn episode(number: u32, downloaded: bool) -> EpisodeRecord {
        let now = Utc::now();
        EpisodeRecord {
            id: i64::from(number),
            show_id: 1,
            episode_number: number,
            is_downloaded: downloaded,
            magnet_link: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_plan_nothing_downloaded_starts_at_range_start() {
        let show = show(EpisodeRange::new(1, 1, 1, 12), EpisodesPerSeason::FixedCount(12));
        let plan = ScanPlan::new(&show, &[]);
        assert_eq!(plan.highest_downloaded, 0);
        assert_eq!(plan.next_candidate, 1);
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_plan_continues_after_highest_download() {
        let show = show(EpisodeRange::new(1, 1, 2, 13), EpisodesPerSeason::PerSeasonCounts(vec![12, 13]));
        let episodes: Vec<_> = (1..=25).map(|n| episode(n, n <= 20)).collect();
        let plan = ScanPlan::new(&show, &episodes);
        assert_eq!((plan.min_absolute, plan.max_absolute), (1, 25));
        assert_eq!(plan.next_candidate, 21);
        assert_eq!(show.episodes_per_season.to_season_episode(plan.next_candidate), (2, 9));
    }

    #[test]
    fn test_plan_ignores_downloads_outside_range() {
        let show = show(EpisodeRange::new(2, 1, 2, 12), EpisodesPerSeason::FixedCount(12));
        let plan = ScanPlan::new(&show, &[episode(5, true), episode(40, true)]);
        assert_eq!(plan.min_absolute, 13);
        assert_eq!(plan.highest_downloaded, 12);
        assert_eq!(plan.next_candidate, 13);
    }

    #[test]
    fn test_plan_fully_downloaded_is_complete() {
        let show = show(EpisodeRange::new(1, 1, 1, 3), EpisodesPerSeason::FixedCount(12));
        let episodes: Vec<_> = (1..=3).map(|n| episode(n, true)).collect();
        assert!(ScanPlan::new(&show, &episodes).is_complete());
    }

    #[test]
    fn test_plan_at_last_representable_episode() {
        let show = show(
            EpisodeRange::new(u32::MAX - 1, 1, u32::MAX, 1),
            EpisodesPerSeason::FixedCount(1),
        );
        let plan = ScanPlan::new(&show, &[episode(u32::MAX, true)]);
        assert_eq!(plan.highest_downloaded, u32::MAX);
        assert_eq!(plan.next_candidate, u32::MAX);
        assert!(plan.is_complete());

        let plan = ScanPlan::new(&show, &[episode(u32::MAX - 1, true)]);
        assert_eq!(plan.next_candidate, u32::MAX);
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_plan_gap_below_highest_is_not_revisited() {
        let show = show(EpisodeRange::new(1, 1, 1, 12), EpisodesPerSeason::FixedCount(12));
        let plan = ScanPlan::new(&show, &[episode(2, true), episode(5, true)]);
        assert_eq!(plan.next_candidate, 6);
        assert!(plan.is_downloaded(5));
        assert!(!plan.is_downloaded(3));
    }

    #[test]
    fn test_scan_target_serialization() {
        assert_eq!(
            serde_json::to_value(ScanTarget::Show(4)).unwrap(),
            serde_json::json!({"kind": "show", "show_id": 4})
        );
        assert_eq!(
            serde_json::to_value(ScanTarget::All).unwrap(),
            serde_json::json!({"kind": "all"})
        );
    }
}
