//! Application state and HTTP router construction

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::Config;
use crate::db::Database;
use crate::services::ScanController;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub scans: Arc<ScanController>,
}

/// Build the full router: health probes at the root, everything else under /api
pub fn build_app(state: AppState) -> Router<()> {
    let api = Router::new()
        .merge(api::scan::router())
        .merge(api::shows::router());

    Router::new()
        .merge(api::health::router())
        .nest("/api", api)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
