//! Show management endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use super::{ApiError, ApiResult};
use crate::AppState;
use crate::db::{CreateShow, EpisodeRecord, ShowRecord, ShowRepository, UpdateShow};
use crate::error::ScanError;

async fn list_shows(State(state): State<AppState>) -> ApiResult<Vec<ShowRecord>> {
    Ok(Json(state.db.shows().list_shows().await?))
}

async fn create_show(
    State(state): State<AppState>,
    Json(input): Json<CreateShow>,
) -> Result<(StatusCode, Json<ShowRecord>), ApiError> {
    let layout = state.config.scan.default_layout();
    let show = state.db.shows().create(input, &layout).await?;
    Ok((StatusCode::CREATED, Json(show)))
}

async fn get_show(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<ShowRecord> {
    let show = state
        .db
        .shows()
        .get_show(id)
        .await?
        .ok_or(ScanError::ShowNotFound(id))?;
    Ok(Json(show))
}

async fn update_show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateShow>,
) -> ApiResult<ShowRecord> {
    Ok(Json(state.db.shows().update(id, input).await?))
}

async fn delete_show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.db.shows().delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ScanError::ShowNotFound(id).into())
    }
}

async fn list_episodes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<EpisodeRecord>> {
    let shows = state.db.shows();
    if shows.get_show(id).await?.is_none() {
        return Err(ScanError::ShowNotFound(id).into());
    }
    Ok(Json(shows.list_episodes(id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shows", get(list_shows).post(create_show))
        .route(
            "/shows/{id}",
            get(get_show).put(update_show).delete(delete_show),
        )
        .route("/shows/{id}/episodes", get(list_episodes))
}
