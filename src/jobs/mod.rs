//! Background job scheduling

pub mod auto_scan;

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::services::ScanController;

/// Start the scheduler with the automatic scan job.
///
/// Returns `None` when `schedule` is empty, i.e. automatic scans are disabled.
pub async fn start_scheduler(
    controller: Arc<ScanController>,
    schedule: &str,
) -> anyhow::Result<Option<JobScheduler>> {
    if schedule.trim().is_empty() {
        info!("Automatic scans disabled");
        return Ok(None);
    }

    let scheduler = JobScheduler::new().await?;

    let scan_controller = controller.clone();
    let scan_job = Job::new_async(schedule, move |_uuid, _l| {
        let controller = scan_controller.clone();
        Box::pin(async move {
            auto_scan::run_auto_scan(&controller).await;
        })
    })?;
    scheduler.add(scan_job).await?;

    scheduler.start().await?;
    info!(schedule, "Job scheduler started");

    Ok(Some(scheduler))
}
