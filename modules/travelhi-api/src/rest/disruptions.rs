use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use tracing::warn;

use travelhi_common::TravelError;

use crate::disruptions::TrafficReport;
use crate::error::ApiResult;
use crate::AppState;

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(report): Json<TrafficReport>,
) -> ApiResult<impl IntoResponse> {
    let classifier = state
        .disruptions
        .as_ref()
        .ok_or_else(|| TravelError::UpstreamUnavailable("disruption classifier not configured".into()))?;

    let prediction = classifier.predict(&report).await.map_err(|e| {
        warn!(error = %e, "Disruption prediction failed");
        TravelError::UpstreamUnavailable(format!("LLM error: {e}"))
    })?;
    Ok(Json(prediction))
}
