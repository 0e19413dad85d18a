use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::{Camera, NewCamera};
use crate::error::Error;
use crate::ingest::snapshot::encode_jpeg;
use crate::ingest::WorkerStatus;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use log::{info, warn};

/// Camera routes, including live preview and worker status
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/cameras", get(get_cameras).post(create_camera))
        .route("/cameras/:id", get(get_camera_by_id).delete(delete_camera))
        .route("/cameras/:id/frame", get(get_latest_frame))
        .route("/workers", get(get_workers))
}

/// Register a camera and start ingesting it.
/// Returns as soon as the worker is spawned.
pub async fn create_camera(
    State(state): State<AppState>,
    Json(request): Json<NewCamera>,
) -> ApiResult<Json<Camera>> {
    request.validate()?;

    let camera = state.cameras_repo.create(&request).await?;
    info!("Registered camera {} ({})", camera.id, camera.name);

    if !state.supervisor.spawn(camera.id).await {
        warn!("Worker for camera {} was already running", camera.id);
    }

    Ok(Json(camera))
}

pub async fn get_cameras(State(state): State<AppState>) -> ApiResult<Json<Vec<Camera>>> {
    let cameras = state.cameras_repo.get_all().await?;
    Ok(Json(cameras))
}

pub async fn get_camera_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Camera>> {
    let camera = state
        .cameras_repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Camera not found: {}", id)))?;

    Ok(Json(camera))
}

/// Stop the camera's worker, then remove the record. Events are kept.
pub async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let stopped = state.supervisor.stop(id).await;

    if !state.cameras_repo.delete(id).await? {
        return Err(ApiError::not_found(format!("Camera not found: {}", id)));
    }

    info!("Deleted camera {} (worker stopped: {})", id, stopped);
    Ok(StatusCode::NO_CONTENT)
}

/// Most recent frame captured for the camera, as JPEG
pub async fn get_latest_frame(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let frame = state
        .frames
        .latest(id)
        .ok_or_else(|| ApiError::not_found(format!("No frame available for camera {}", id)))?;

    let quality = state.jpeg_quality;
    let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
        .await
        .map_err(|e| Error::Internal(format!("Frame encoding task failed: {}", e)))??;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

pub async fn get_workers(State(state): State<AppState>) -> Json<Vec<WorkerStatus>> {
    Json(state.supervisor.running().await)
}
