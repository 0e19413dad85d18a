use crate::db::models::{Event, EventFilter, NewEvent};
use crate::error::Error;
use crate::ingest::registry::EventRecorder;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

const EVENT_COLUMNS: &str =
    "id, camera_id, timestamp, rule, object_type, confidence, bbox, snapshot_path";

/// Events repository for handling event operations
#[derive(Clone)]
pub struct EventsRepository {
    pool: Arc<PgPool>,
}

impl EventsRepository {
    /// Create a new events repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Append a new event
    pub async fn create(&self, event: &NewEvent) -> Result<Event> {
        let result = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (camera_id, timestamp, rule, object_type, confidence, bbox, snapshot_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(event.camera_id)
        .bind(event.timestamp)
        .bind(&event.rule)
        .bind(&event.object_type)
        .bind(event.confidence)
        .bind(Json(event.bbox))
        .bind(&event.snapshot_path)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create event: {}", e)))?;

        Ok(result)
    }

    /// Get event by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Event>> {
        let result = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = $1",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get event by ID: {}", e)))?;

        Ok(result)
    }

    /// Search events with combined filters, newest first
    pub async fn search(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM events WHERE 1=1", EVENT_COLUMNS));

        if let Some(camera_id) = filter.camera_id {
            query.push(" AND camera_id = ").push_bind(camera_id);
        }

        if let Some(rule) = &filter.rule {
            query.push(" AND rule = ").push_bind(rule.clone());
        }

        if let Some(from_time) = filter.from_time {
            query.push(" AND timestamp >= ").push_bind(from_time);
        }

        if let Some(to_time) = filter.to_time {
            query.push(" AND timestamp <= ").push_bind(to_time);
        }

        query.push(" ORDER BY timestamp DESC, id DESC");

        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit.max(0));
        }

        let result = query
            .build_query_as::<Event>()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search events: {}", e)))?;

        Ok(result)
    }
}

#[async_trait]
impl EventRecorder for EventsRepository {
    async fn record(&self, event: &NewEvent) -> Result<Event> {
        self.create(event).await
    }
}
