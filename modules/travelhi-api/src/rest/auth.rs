use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Form,
};
use serde::Deserialize;

use crate::auth::Registration;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

/// OAuth2 password flow: form-encoded username and password.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> ApiResult<impl IntoResponse> {
    let token = state.auth.login(&form.username, &form.password).await?;
    Ok(Json(token))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Registration>,
) -> ApiResult<impl IntoResponse> {
    let user = state.auth.register(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
