//! Liveness and readiness probes

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness of the pieces a scan depends on
#[derive(Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub database: bool,
    /// `None` when the scan state row could not be read
    pub scanning: Option<bool>,
}

async fn healthz() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 503 until both the pool and the scan state row answer
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let database = state.db.ping().await.is_ok();
    let scanning = match state.scans.get_status().await {
        Ok(status) => Some(status.is_scanning),
        Err(_) => None,
    };

    let ready = database && scanning.is_some();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(Readiness {
            ready,
            database,
            scanning,
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
