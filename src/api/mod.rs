pub mod admin;
pub mod auth;
pub mod notifications;
pub mod todos;

use axum::Json;
use axum::routing::{get, patch, post};
use axum::{Router, extract::State, http::StatusCode};

use crate::api::auth::CurrentUser;
use crate::error::AppError;
use crate::models::{NotificationSettingsRequest, User};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/me", get(me))
        .route("/api/me/notifications", patch(set_notifications))
        .route("/api/todos", get(todos::list_todos).post(todos::create_todo))
        .route("/api/todos/stats", get(todos::todo_stats))
        .route("/api/todos/clear-completed", post(todos::clear_completed))
        .route("/api/todos/{id}", patch(todos::update_todo).delete(todos::delete_todo))
        .route("/api/todos/{id}/toggle", post(todos::toggle_todo))
        .route("/api/notifications", get(notifications::stream))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}", patch(admin::set_admin).delete(admin::delete_user))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/schema/refresh", post(admin::refresh_schema))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.ping().await?;
    Ok(StatusCode::OK)
}

async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn set_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NotificationSettingsRequest>,
) -> Result<Json<User>, AppError> {
    let user = state.users.set_notifications(&user, req.enabled).await?;
    Ok(Json(user))
}
