//! Outward-facing scan control
//!
//! Starts scans in the background, stops them, and reports status. Starting
//! claims the scan singleton before returning, so callers learn about
//! `AlreadyScanning` or `ShowNotFound` synchronously while the scan itself
//! runs on its own task.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::scan_engine::{ScanEngine, ScanSummary, ScanTarget, ScanTicket};
use super::scan_state::STATUS_STOPPED;
use crate::db::ScanState;
use crate::error::ScanResult;

/// Status projection exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub status: String,
    pub current_show_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
}

impl From<ScanState> for ScanStatus {
    fn from(state: ScanState) -> Self {
        Self {
            is_scanning: state.is_scanning,
            status: state.status,
            current_show_id: state.current_show_id,
            started_at: state.started_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

pub struct ScanController {
    engine: Arc<ScanEngine>,
}

impl ScanController {
    pub fn new(engine: Arc<ScanEngine>) -> Self {
        Self { engine }
    }

    pub async fn get_status(&self) -> Result<ScanStatus> {
        Ok(self.engine.state().read().await?.into())
    }

    /// Claim the singleton and run the scan in the background.
    ///
    /// The returned handle resolves once the scan has finished and its final
    /// state has been written. It yields `None` if the scan task panicked, in
    /// which case the state is reset here instead.
    pub async fn request_start(
        &self,
        target: ScanTarget,
    ) -> ScanResult<JoinHandle<Option<ScanSummary>>> {
        let ticket = self.engine.begin(target).await?;
        Ok(self.spawn_run(ticket))
    }

    fn spawn_run(&self, ticket: ScanTicket) -> JoinHandle<Option<ScanSummary>> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let runner = engine.clone();
            match tokio::spawn(async move { runner.run(ticket).await }).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    error!(scan_target = ?ticket.target, run_id = ticket.run_id, error = %e, "Scan task aborted");
                    let status = format!("Error: scan task aborted ({})", e);
                    if let Err(e) = engine.state().finish_run(ticket.run_id, status).await {
                        error!(error = %e, "Failed to reset scan state after aborted scan");
                        engine.state().invalidate_cache();
                    }
                    None
                }
            }
        })
    }

    /// Ask a running scan to stop.
    ///
    /// The scan notices at its next show or episode boundary; any search
    /// already in flight finishes first.
    pub async fn request_stop(&self) -> Result<StopOutcome> {
        if self.engine.state().stop(STATUS_STOPPED).await? {
            info!("Scan stop requested");
            Ok(StopOutcome::Stopped)
        } else {
            Ok(StopOutcome::NotRunning)
        }
    }
}
