//! Periodic scan of every show

use tracing::{debug, error, info};

use crate::error::ScanError;
use crate::services::{ScanController, ScanTarget};

/// Kick off a batch scan unless one is already running
pub async fn run_auto_scan(controller: &ScanController) {
    match controller.request_start(ScanTarget::All).await {
        Ok(_) => info!("Automatic scan started"),
        Err(ScanError::AlreadyScanning) => debug!("Scan already running, skipping automatic scan"),
        Err(e) => error!(error = %e, "Failed to start automatic scan"),
    }
}
