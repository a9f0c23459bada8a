use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use travelhi_common::geo::DEFAULT_RADIUS_METERS;
use travelhi_common::{ReportCounter, ReportType, TravelError};

use super::{base_url, present_page, present_report};
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::{ApiError, ApiResult};
use crate::images::ImageUpload;
use crate::incidents::{CreateIncident, DEFAULT_PAGE_SIZE};
use crate::AppState;

#[derive(Deserialize)]
pub struct RadiusParams {
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lng: f64,
    #[serde(default = "default_radius")]
    radius: f64,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_METERS
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Deserialize)]
pub struct RecentParams {
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn bad_multipart(err: MultipartError) -> ApiError {
    TravelError::validation(format!("Invalid multipart body: {}", err.body_text())).into()
}

fn parse_coordinate(field: &str, raw: &str) -> Result<f64, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| TravelError::validation(format!("'{field}' must be a number")).into())
}

/// Multipart form: `type`, `lat`, `lng`, optional `name`, `description`
/// and `photo`. A bearer token is optional; an unusable one is ignored.
pub async fn create_incident(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut report_type = None;
    let mut lat = None;
    let mut lng = None;
    let mut name = None;
    let mut description = None;
    let mut photo = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "type" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                report_type = Some(raw.parse::<ReportType>()?);
            }
            "lat" => lat = Some(parse_coordinate("lat", &field.text().await.map_err(bad_multipart)?)?),
            "lng" => lng = Some(parse_coordinate("lng", &field.text().await.map_err(bad_multipart)?)?),
            "name" => name = Some(field.text().await.map_err(bad_multipart)?),
            "description" => description = Some(field.text().await.map_err(bad_multipart)?),
            "photo" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                // Browsers send an empty, nameless part when no file is picked.
                if !bytes.is_empty() || file_name.as_deref().is_some_and(|n| !n.is_empty()) {
                    photo = Some(ImageUpload {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            }
            _ => {}
        }
    }

    let missing = |f: &str| TravelError::validation(format!("Missing form field '{f}'"));
    let input = CreateIncident {
        report_type: report_type.ok_or_else(|| missing("type"))?,
        lat: lat.ok_or_else(|| missing("lat"))?,
        lng: lng.ok_or_else(|| missing("lng"))?,
        name,
        description,
        photo,
    };

    let report = state.incidents.create(input, caller.as_ref()).await?;
    let base = base_url(&state, &headers);
    Ok((StatusCode::CREATED, Json(present_report(report, &base))))
}

pub async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let report = state.incidents.get(id).await?;
    Ok(Json(present_report(report, &base_url(&state, &headers))))
}

pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RadiusParams>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .incidents
        .list_in_radius(params.lat, params.lng, params.radius, params.skip, params.limit)
        .await?;
    Ok(Json(present_page(page, &base_url(&state, &headers))))
}

/// Defaults to the last 24 hours.
pub async fn recent_incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let until = params.until.unwrap_or_else(Utc::now);
    let since = params.since.unwrap_or(until - Duration::hours(24));
    let page = state
        .incidents
        .list_recent(since, until, params.skip, params.limit)
        .await?;
    Ok(Json(present_page(page, &base_url(&state, &headers))))
}

async fn bump(
    state: &AppState,
    id: i64,
    counter: ReportCounter,
    caller: Option<&travelhi_common::User>,
    headers: &HeaderMap,
) -> ApiResult<Json<travelhi_common::Report>> {
    let report = state.incidents.increment(id, counter, caller).await?;
    Ok(Json(present_report(report, &base_url(state, headers))))
}

pub async fn like_incident(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    bump(&state, id, ReportCounter::Likes, caller.as_ref(), &headers).await
}

pub async fn confirm_incident(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    bump(&state, id, ReportCounter::Confirmations, caller.as_ref(), &headers).await
}

pub async fn deny_incident(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    bump(&state, id, ReportCounter::Denials, caller.as_ref(), &headers).await
}

pub async fn verify_incident(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let report = state.incidents.verify(id, &caller).await?;
    Ok(Json(present_report(report, &base_url(&state, &headers))))
}
