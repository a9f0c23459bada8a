use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use travelhi_common::TravelError;

/// HTTP face of [`TravelError`]. Every handler returns `Result<_, ApiError>`.
#[derive(Debug)]
pub struct ApiError(pub TravelError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<TravelError> for ApiError {
    fn from(err: TravelError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(TravelError::Internal(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TravelError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TravelError::Conflict(_) | TravelError::ContentRejected(_) => StatusCode::BAD_REQUEST,
            TravelError::NotFound(_) => StatusCode::NOT_FOUND,
            TravelError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            TravelError::Forbidden(_) => StatusCode::FORBIDDEN,
            TravelError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TravelError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self.0 {
            TravelError::Internal(e) => {
                error!(error = %e, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        let cases = [
            (TravelError::validation("bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (TravelError::Conflict("dup".into()), StatusCode::BAD_REQUEST),
            (TravelError::ContentRejected("no".into()), StatusCode::BAD_REQUEST),
            (TravelError::not_found("gone"), StatusCode::NOT_FOUND),
            (TravelError::unauthorized("who"), StatusCode::UNAUTHORIZED),
            (TravelError::forbidden("nope"), StatusCode::FORBIDDEN),
            (
                TravelError::UpstreamUnavailable("llm".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn internal_detail_is_hidden() {
        let response = ApiError::from(anyhow::anyhow!("db password leaked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
