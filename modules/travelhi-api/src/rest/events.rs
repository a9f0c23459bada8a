use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use travelhi_common::{EventFilter, EventType, Severity};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::events::{AroundQuery, CreateEvent, DEFAULT_AROUND_LIMIT, DEFAULT_THRESHOLD_HOURS};
use crate::AppState;

#[derive(Deserialize)]
pub struct DayParams {
    day: NaiveDate,
}

#[derive(Deserialize)]
pub struct AroundParams {
    at: DateTime<Utc>,
    #[serde(default = "default_threshold")]
    threshold_hours: i64,
    event_type: Option<EventType>,
    severity: Option<Severity>,
    is_verified: Option<bool>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_threshold() -> i64 {
    DEFAULT_THRESHOLD_HOURS
}

fn default_limit() -> i64 {
    DEFAULT_AROUND_LIMIT
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Json(body): Json<CreateEvent>,
) -> ApiResult<impl IntoResponse> {
    let event = state.events.create(&caller, body).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn list_events(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.events.list().await?))
}

pub async fn events_by_day(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DayParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.events.by_day(params.day).await?))
}

pub async fn events_around(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AroundParams>,
) -> ApiResult<impl IntoResponse> {
    let query = AroundQuery {
        at: params.at,
        threshold_hours: params.threshold_hours,
        filter: EventFilter {
            event_type: params.event_type,
            severity: params.severity,
            is_verified: params.is_verified,
        },
        limit: params.limit,
        offset: params.offset,
    };
    Ok(Json(state.events.around(query).await?))
}
