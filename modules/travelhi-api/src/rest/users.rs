use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use travelhi_common::{Permission, Role, User};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::users::ProfileUpdate;
use crate::AppState;

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    10
}

#[derive(Deserialize)]
pub struct RoleBody {
    role: Role,
}

#[derive(Deserialize)]
pub struct StatusParams {
    disabled: bool,
}

#[derive(Deserialize)]
pub struct PermissionBody {
    permission: Permission,
}

/// The caller's own account plus the permissions they effectively hold.
#[derive(Serialize)]
pub struct Profile {
    #[serde(flatten)]
    user: User,
    effective_permissions: BTreeSet<Permission>,
}

pub async fn me(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(Profile {
        effective_permissions: user.effective_permissions(),
        user,
    })
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let users = state.users.list(&caller, params.skip, params.limit).await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.get(&caller, id).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<ProfileUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.update(&caller, id, body).await?))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<RoleBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.set_role(&caller, id, body.role).await?))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
    Query(params): Query<StatusParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.set_disabled(&caller, id, params.disabled).await?))
}

pub async fn add_permission(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<PermissionBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.grant(&caller, id, body.permission).await?))
}

pub async fn remove_permission(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<PermissionBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.revoke(&caller, id, body.permission).await?))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.users.delete(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
