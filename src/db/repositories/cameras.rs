use crate::{
    db::models::{Camera, CameraDb, CameraStatus, NewCamera},
    error::Error,
    ingest::registry::CameraRegistry,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

const CAMERA_COLUMNS: &str =
    "id, name, location, source_url, status, fps, last_frame_time, zones, created_at";

/// Cameras repository for handling camera operations
#[derive(Clone)]
pub struct CamerasRepository {
    pool: Arc<PgPool>,
}

impl CamerasRepository {
    /// Create a new cameras repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create a new camera, initially offline
    pub async fn create(&self, camera: &NewCamera) -> Result<Camera> {
        info!("Creating new camera: {}", camera.name);

        let result = sqlx::query_as::<_, CameraDb>(&format!(
            r#"
            INSERT INTO cameras (name, location, source_url, status, fps, last_frame_time, zones, created_at)
            VALUES ($1, $2, $3, $4, 0, NULL, $5, $6)
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        ))
        .bind(&camera.name)
        .bind(&camera.location)
        .bind(&camera.source_url)
        .bind(CameraStatus::Offline.as_str())
        .bind(camera.zones.as_ref().map(Json))
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create camera: {}", e)))?;

        Ok(Camera::from(result))
    }

    /// Get camera by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Camera>> {
        let result = sqlx::query_as::<_, CameraDb>(&format!(
            "SELECT {} FROM cameras WHERE id = $1",
            CAMERA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get camera by ID: {}", e)))?;

        Ok(result.map(Camera::from))
    }

    /// Get all cameras
    pub async fn get_all(&self) -> Result<Vec<Camera>> {
        let result = sqlx::query_as::<_, CameraDb>(&format!(
            "SELECT {} FROM cameras ORDER BY id",
            CAMERA_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get all cameras: {}", e)))?;

        Ok(result.into_iter().map(Camera::from).collect())
    }

    /// Delete camera
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cameras WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete camera: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Update camera status
    pub async fn update_status(&self, id: i64, status: CameraStatus) -> Result<()> {
        sqlx::query("UPDATE cameras SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update camera status: {}", e)))?;

        Ok(())
    }

    /// Update last frame time and measured frame rate
    pub async fn record_heartbeat(&self, id: i64, at: DateTime<Utc>, fps: f64) -> Result<()> {
        sqlx::query("UPDATE cameras SET last_frame_time = $1, fps = $2 WHERE id = $3")
            .bind(at)
            .bind(fps)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to record camera heartbeat: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl CameraRegistry for CamerasRepository {
    async fn camera(&self, camera_id: i64) -> Result<Option<Camera>> {
        self.get_by_id(camera_id).await
    }

    async fn set_status(&self, camera_id: i64, status: CameraStatus) -> Result<()> {
        self.update_status(camera_id, status).await
    }

    async fn heartbeat(&self, camera_id: i64, at: DateTime<Utc>, fps: f64) -> Result<()> {
        self.record_heartbeat(camera_id, at, fps).await
    }
}
