pub mod auth;
pub mod disruptions;
pub mod events;
pub mod incidents;
pub mod users;

use axum::{
    http::{header::HOST, HeaderMap},
    response::{IntoResponse, Json},
};
use serde_json::json;

use travelhi_common::{Page, Report};

use crate::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Absolute URL prefix for links in responses: the configured public base
/// URL, else the request's Host header.
pub(crate) fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.public_base_url {
        return base.clone();
    }
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

pub(crate) fn present_report(report: Report, base: &str) -> Report {
    report.with_photo_url(base)
}

pub(crate) fn present_page(page: Page<Report>, base: &str) -> Page<Report> {
    page.map(|r| r.with_photo_url(base))
}
