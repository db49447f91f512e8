//! Scan control endpoints

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::AppState;
use crate::services::{ScanStatus, ScanTarget, StopOutcome};

#[derive(Debug, Default, Deserialize)]
pub struct StartScanRequest {
    /// Scan a single show; omit to scan every show
    pub show_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub started: bool,
    pub target: ScanTarget,
}

#[derive(Debug, Serialize)]
pub struct StopScanResponse {
    pub outcome: StopOutcome,
}

async fn status(State(state): State<AppState>) -> ApiResult<ScanStatus> {
    Ok(Json(state.scans.get_status().await?))
}

async fn start(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartScanResponse>), ApiError> {
    // An empty body means "scan everything"
    let request: StartScanRequest = if body.is_empty() {
        StartScanRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?
    };
    let target = match request.show_id {
        Some(id) => ScanTarget::Show(id),
        None => ScanTarget::All,
    };

    state.scans.request_start(target).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            started: true,
            target,
        }),
    ))
}

async fn stop(State(state): State<AppState>) -> ApiResult<StopScanResponse> {
    let outcome = state.scans.request_stop().await?;
    Ok(Json(StopScanResponse { outcome }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scan/status", get(status))
        .route("/scan/start", post(start))
        .route("/scan/stop", post(stop))
}
