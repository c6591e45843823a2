use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::api::auth::CurrentUser;
use crate::error::AppError;
use crate::models::{AdminStats, SetAdminRequest, User};
use crate::state::AppState;

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.admin.list_users(&actor)?))
}

pub async fn stats(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<AdminStats>, AppError> {
    Ok(Json(state.admin.stats(&actor)?))
}

pub async fn set_admin(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<SetAdminRequest>,
) -> Result<Json<User>, AppError> {
    let user = state.admin.set_admin(&actor, &id, req.is_admin).await?;
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.admin.delete_user(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh_schema(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<StatusCode, AppError> {
    state.admin.refresh_schema(&actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
