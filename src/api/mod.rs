//! REST API route definitions

pub mod health;
pub mod scan;
pub mod shows;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::error::ScanError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned from handlers, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Scan(ScanError),
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Scan(ScanError::AlreadyScanning) => StatusCode::CONFLICT,
            Self::Scan(ScanError::ShowNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Scan(ScanError::InvalidEpisodeConfig(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Scan(ScanError::SearchTransientFailure(_)) => StatusCode::BAD_GATEWAY,
            Self::Scan(ScanError::PersistenceFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Scan(err) => err.to_string(),
            Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        Self::Scan(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Scan(ScanError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();
        if status.is_server_error() {
            error!(error = %message, "Request failed");
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
