use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Serialize;

use crate::api::auth::CurrentUser;
use crate::error::AppError;
use crate::models::{NewTodoRequest, Todo, TodoQueryParams, TodoStats, UpdateTodoRequest};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ClearCompletedResponse {
    pub deleted: usize,
}

pub async fn list_todos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<TodoQueryParams>,
) -> Json<Vec<Todo>> {
    Json(state.todos.list(&user, &params))
}

pub async fn todo_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<TodoStats> {
    Json(state.todos.stats(&user))
}

pub async fn create_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewTodoRequest>,
) -> Result<(StatusCode, Json<Todo>), AppError> {
    let todo = state.todos.create(&user, req).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn update_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTodoRequest>,
) -> Result<Json<Todo>, AppError> {
    let todo = state.todos.edit(&user, &id, &req.content).await?;
    Ok(Json(todo))
}

pub async fn toggle_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Todo>, AppError> {
    let todo = state.todos.toggle(&user, &id).await?;
    Ok(Json(todo))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.todos.delete(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_completed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ClearCompletedResponse>, AppError> {
    let deleted = state.todos.clear_completed(&user).await?;
    Ok(Json(ClearCompletedResponse { deleted }))
}
