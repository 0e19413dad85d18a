use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::{Event, EventFilter};
use crate::error::Error;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Query parameters for event search
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub camera_id: Option<i64>,
    pub rule: Option<String>,
    /// RFC 3339, inclusive
    pub from_time: Option<String>,
    /// RFC 3339, inclusive
    pub to_time: Option<String>,
    pub limit: Option<i64>,
}

impl SearchParams {
    pub fn to_filter(&self) -> Result<EventFilter, Error> {
        if matches!(self.limit, Some(limit) if limit < 0) {
            return Err(Error::Validation("limit must not be negative".to_string()));
        }

        Ok(EventFilter {
            camera_id: self.camera_id,
            rule: self.rule.clone(),
            from_time: parse_time("from_time", self.from_time.as_deref())?,
            to_time: parse_time("to_time", self.to_time.as_deref())?,
            limit: self.limit,
        })
    }
}

fn parse_time(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, Error> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|e| Error::Validation(format!("Invalid {} '{}': {}", name, raw, e)))
        })
        .transpose()
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/events", get(search_events))
        .route("/events/:id", get(get_event_by_id))
}

/// Events matching the filters, newest first
pub async fn search_events(
    Query(params): Query<SearchParams>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Event>>> {
    let filter = params.to_filter()?;
    let events = state.events_repo.search(&filter).await?;
    Ok(Json(events))
}

pub async fn get_event_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Event>> {
    let event = state
        .events_repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Event not found: {}", id)))?;

    Ok(Json(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_bounds() {
        let params = SearchParams {
            camera_id: Some(3),
            from_time: Some("2024-05-01T10:00:00+02:00".to_string()),
            to_time: Some("2024-05-01T09:00:00Z".to_string()),
            ..SearchParams::default()
        };

        let filter = params.to_filter().unwrap();
        assert_eq!(filter.camera_id, Some(3));
        assert_eq!(
            filter.from_time.unwrap().to_rfc3339(),
            "2024-05-01T08:00:00+00:00"
        );
        assert!(filter.to_time.is_some());
        assert!(filter.rule.is_none());
    }

    #[test]
    fn rejects_malformed_times_and_negative_limits() {
        let params = SearchParams {
            from_time: Some("yesterday".to_string()),
            ..SearchParams::default()
        };
        assert!(matches!(params.to_filter(), Err(Error::Validation(_))));

        let params = SearchParams {
            limit: Some(-1),
            ..SearchParams::default()
        };
        assert!(matches!(params.to_filter(), Err(Error::Validation(_))));
    }
}
