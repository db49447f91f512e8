//! Kiroku server
//!
//! Serves the REST API and runs scheduled episode scans.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiroku::AppState;
use kiroku::app::build_app;
use kiroku::config::Config;
use kiroku::db::Database;
use kiroku::indexer::TorznabSearchProvider;
use kiroku::jobs;
use kiroku::services::{ScanController, ScanEngine, ScanStateStore, StopOutcome};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kiroku=debug,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(controller: Arc<ScanController>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received");
    match controller.request_stop().await {
        Ok(StopOutcome::Stopped) => info!("Stopped running scan"),
        Ok(StopOutcome::NotRunning) => {}
        Err(e) => warn!(error = %e, "Failed to stop running scan"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::from_env()?);
    init_tracing(config.log_json);

    info!("Starting Kiroku");

    let db = Database::connect(&config.database_path).await?;
    db.migrate().await?;
    info!(path = %config.database_path, "Database ready");

    let scan_state = Arc::new(ScanStateStore::new(
        Arc::new(db.scan_state()),
        config.scan.state_options(),
    ));
    if scan_state.recover_interrupted().await? {
        warn!("Previous scan did not finish cleanly and was reset");
    }

    let search = Arc::new(TorznabSearchProvider::new(
        &config.search_feed_url,
        config.search_api_key.clone(),
        config.scan.search_timeout,
    )?);

    let engine = Arc::new(ScanEngine::new(
        Arc::new(db.shows()),
        search,
        scan_state,
        config.scan.engine_settings(),
    ));
    let controller = Arc::new(ScanController::new(engine));

    let _scheduler = jobs::start_scheduler(controller.clone(), &config.scan.schedule).await?;

    let state = AppState {
        config: config.clone(),
        db,
        scans: controller.clone(),
    };
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller))
        .await?;

    Ok(())
}
