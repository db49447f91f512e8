//! Scan state store
//!
//! Single source of truth for whether a scan is running. Every write goes
//! through one async mutex so read-modify-write sequences (claiming the
//! singleton, progress updates, stopping) can't interleave. Reads are served
//! from a short-lived cache that each write invalidates before returning.
//!
//! Each start bumps `run_id`. Progress writes and the final write name the
//! run they belong to, so a scan that was stopped and replaced by a new one
//! can't touch the new scan's state.
//!
//! A scan flag left set by a crash or a hung task is cleared in two ways:
//! [`ScanStateStore::recover_interrupted`] at start-up, and a staleness check
//! on every fresh read that force-resets scans running longer than the
//! configured maximum.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::cache::TtlCache;
use crate::db::{ScanState, ScanStateBackend};

pub use crate::db::scan_state::STATUS_IDLE;

pub const STATUS_COMPLETED: &str = "Scan completed";
pub const STATUS_STOPPED: &str = "Scan stopped by user";
pub const STATUS_INTERRUPTED: &str = "Scan interrupted";
pub const STATUS_TIMED_OUT: &str = "Error: scan timed out";

const ELLIPSIS: &str = "...";
const CACHE_KEY: &str = "scan_state";

#[derive(Debug, Clone)]
pub struct ScanStateOptions {
    pub cache_ttl: Duration,
    /// Maximum status length in characters, ellipsis included
    pub status_max_len: usize,
    /// A scan older than this is considered hung
    pub max_scan_duration: Duration,
}

impl Default for ScanStateOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(2),
            status_max_len: 50,
            max_scan_duration: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Fields to change; `None` leaves a field as it is.
///
/// `current_show_id` is doubly optional: `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanStatePatch {
    pub is_scanning: Option<bool>,
    pub current_show_id: Option<Option<i64>>,
    pub status: Option<String>,
}

impl ScanStatePatch {
    /// Progress update while a scan runs
    pub fn progress(status: impl Into<String>, current_show_id: Option<i64>) -> Self {
        Self {
            is_scanning: None,
            current_show_id: Some(current_show_id),
            status: Some(status.into()),
        }
    }

    pub fn start(status: impl Into<String>, current_show_id: Option<i64>) -> Self {
        Self {
            is_scanning: Some(true),
            current_show_id: Some(current_show_id),
            status: Some(status.into()),
        }
    }

    pub fn finish(status: impl Into<String>) -> Self {
        Self {
            is_scanning: Some(false),
            current_show_id: None,
            status: Some(status.into()),
        }
    }
}

/// Cut `status` to at most `max_len` characters, ending in `...` when cut
pub fn truncate_status(status: &str, max_len: usize) -> String {
    if status.chars().count() <= max_len {
        return status.to_string();
    }
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = status.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Merge a patch into the current snapshot.
///
/// Starting a scan stamps `started_at` and bumps `run_id`. Stopping clears
/// `started_at` and, unless the patch sets one, `current_show_id`.
fn merge(current: &ScanState, patch: ScanStatePatch, status_max_len: usize) -> ScanState {
    let now = Utc::now();
    let mut next = current.clone();

    if let Some(status) = patch.status {
        next.status = truncate_status(&status, status_max_len);
    }
    if let Some(show_id) = patch.current_show_id {
        next.current_show_id = show_id;
    }

    match patch.is_scanning {
        Some(true) if !current.is_scanning => {
            next.is_scanning = true;
            next.run_id = current.run_id + 1;
            next.started_at = Some(now);
        }
        Some(false) => {
            next.is_scanning = false;
            next.started_at = None;
            if patch.current_show_id.is_none() {
                next.current_show_id = None;
            }
        }
        _ => {}
    }

    next.updated_at = now;
    next
}

pub struct ScanStateStore {
    backend: Arc<dyn ScanStateBackend>,
    cache: TtlCache<&'static str, ScanState>,
    write_lock: Mutex<()>,
    options: ScanStateOptions,
}

impl ScanStateStore {
    pub fn new(backend: Arc<dyn ScanStateBackend>, options: ScanStateOptions) -> Self {
        Self {
            backend,
            cache: TtlCache::new(options.cache_ttl),
            write_lock: Mutex::new(()),
            options,
        }
    }

    /// Current state, possibly served from cache
    pub async fn read(&self) -> Result<ScanState> {
        if let Some(state) = self.cache.get(&CACHE_KEY) {
            return Ok(state);
        }
        self.read_fresh().await
    }

    /// Current state straight from the backend.
    ///
    /// Loads under the write lock so an older snapshot can never be cached
    /// over a write that finished in the meantime.
    pub async fn read_fresh(&self) -> Result<ScanState> {
        let _guard = self.write_lock.lock().await;
        let state = self.load_checked().await?;
        self.cache.insert(CACHE_KEY, state.clone());
        Ok(state)
    }

    /// Apply a patch unconditionally
    pub async fn write(&self, patch: ScanStatePatch) -> Result<ScanState> {
        let _guard = self.write_lock.lock().await;
        let current = self.load_or_create().await?;
        self.apply(&current, patch).await
    }

    /// Apply a patch only while run `run_id` is still the running scan.
    ///
    /// Returns `None` without writing when that run has been stopped or
    /// replaced, so a late progress update can never resurrect a stopped scan.
    pub async fn write_if_scanning(
        &self,
        run_id: i64,
        patch: ScanStatePatch,
    ) -> Result<Option<ScanState>> {
        let _guard = self.write_lock.lock().await;
        let current = self.load_checked().await?;
        if !current.is_scanning || current.run_id != run_id {
            debug!(run_id, current_run_id = current.run_id, "Dropping scan state update, run no longer active");
            return Ok(None);
        }
        self.apply(&current, patch).await.map(Some)
    }

    /// Whether run `run_id` is still the running scan
    pub async fn is_active(&self, run_id: i64) -> Result<bool> {
        let state = self.read_fresh().await?;
        Ok(state.is_scanning && state.run_id == run_id)
    }

    /// Claim the singleton. Returns `None` if a scan is already running.
    pub async fn try_begin(
        &self,
        status: impl Into<String>,
        current_show_id: Option<i64>,
    ) -> Result<Option<ScanState>> {
        let _guard = self.write_lock.lock().await;
        let current = self.load_checked().await?;
        if current.is_scanning {
            return Ok(None);
        }
        self.apply(&current, ScanStatePatch::start(status, current_show_id))
            .await
            .map(Some)
    }

    /// Clear the scanning flag if set. Returns whether a scan was running.
    pub async fn stop(&self, status: impl Into<String>) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current = self.load_or_create().await?;
        if !current.is_scanning {
            return Ok(false);
        }
        self.apply(&current, ScanStatePatch::finish(status)).await?;
        Ok(true)
    }

    /// Write the final state of run `run_id`.
    ///
    /// Applies whether or not the run was stopped in the meantime, but is
    /// skipped if a newer run has started since. Returns whether it wrote.
    pub async fn finish_run(&self, run_id: i64, status: impl Into<String>) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current = self.load_or_create().await?;
        if current.run_id != run_id {
            debug!(run_id, current_run_id = current.run_id, "Newer scan running, not finishing");
            return Ok(false);
        }
        self.apply(&current, ScanStatePatch::finish(status)).await?;
        Ok(true)
    }

    /// Reset a scan flag left behind by a previous process.
    ///
    /// Called once at start-up before anything can begin a scan.
    pub async fn recover_interrupted(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current = self.load_or_create().await?;
        if !current.is_scanning {
            return Ok(false);
        }
        warn!(
            current_show_id = ?current.current_show_id,
            started_at = ?current.started_at,
            "Found scan flag from a previous run, resetting"
        );
        self.apply(&current, ScanStatePatch::finish(STATUS_INTERRUPTED)).await?;
        Ok(true)
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate(&CACHE_KEY);
    }

    async fn load_or_create(&self) -> Result<ScanState> {
        match self.backend.load().await? {
            Some(state) => Ok(state),
            None => {
                let state = ScanState::idle(Utc::now());
                self.backend.save(&state).await?;
                Ok(state)
            }
        }
    }

    /// Load and force-reset a scan that has run past the maximum duration.
    /// Caller holds the write lock.
    async fn load_checked(&self) -> Result<ScanState> {
        let state = self.load_or_create().await?;
        let Some(started_at) = state.started_at.filter(|_| state.is_scanning) else {
            return Ok(state);
        };

        let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();
        if elapsed <= self.options.max_scan_duration {
            return Ok(state);
        }

        warn!(
            elapsed_secs = elapsed.as_secs(),
            max_secs = self.options.max_scan_duration.as_secs(),
            current_show_id = ?state.current_show_id,
            "Scan exceeded maximum duration, forcing reset"
        );
        self.apply(&state, ScanStatePatch::finish(STATUS_TIMED_OUT)).await
    }

    async fn apply(&self, current: &ScanState, patch: ScanStatePatch) -> Result<ScanState> {
        let next = merge(current, patch, self.options.status_max_len);
        let saved = self.backend.save(&next).await;
        self.invalidate_cache();
        saved?;
        Ok(next)
    }
}
