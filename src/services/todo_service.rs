use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::db::{DataStore, StoreError};
use crate::error::AppError;
use crate::models::{
    NewTodo, NewTodoRequest, Priority, Todo, TodoField, TodoPatch, TodoQueryParams, TodoStats,
    User, visible_todos,
};
use crate::sync::TodoSnapshots;

/// A write input that can be retried with one field left out.
pub trait FieldFallback: Clone {
    fn without(&self, field: TodoField) -> Option<Self>;
}

impl FieldFallback for NewTodo {
    fn without(&self, field: TodoField) -> Option<Self> {
        NewTodo::without(self, field)
    }
}

impl FieldFallback for TodoPatch {
    fn without(&self, field: TodoField) -> Option<Self> {
        TodoPatch::without(self, field)
    }
}

/// Runs `write`; if the store rejects an optional field, retries exactly once
/// without it. A second rejection means the store schema needs a refresh.
pub async fn write_with_fallback<I, O, F, Fut>(input: I, write: F) -> Result<O, AppError>
where
    I: FieldFallback,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<O, StoreError>>,
{
    match write(input.clone()).await {
        Ok(out) => Ok(out),
        Err(StoreError::FieldUnsupported(field)) => {
            let Some(reduced) = input.without(field) else {
                return Err(AppError::SchemaOutdated(field));
            };
            warn!("store does not support `{}`, retrying without it", field);
            match write(reduced).await {
                Ok(out) => Ok(out),
                Err(StoreError::FieldUnsupported(field)) => Err(AppError::SchemaOutdated(field)),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Accepts RFC 3339, or the `datetime-local` form browsers submit, which is
/// read in the server's local time zone.
pub fn parse_client_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| {
                    AppError::BadRequest(format!("{} is not a valid local time: {}", field, value))
                });
        }
    }

    Err(AppError::BadRequest(format!("{} is not a valid timestamp: {}", field, value)))
}

fn optional_timestamp(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_client_timestamp(field, v).map(Some),
        None => Ok(None),
    }
}

#[derive(Clone)]
pub struct TodoService {
    store: Arc<dyn DataStore>,
    todos: TodoSnapshots,
}

impl TodoService {
    pub fn new(store: Arc<dyn DataStore>, todos: TodoSnapshots) -> Self {
        Self { store, todos }
    }

    pub fn list(&self, owner: &User, params: &TodoQueryParams) -> Vec<Todo> {
        let snapshot = self.todos.current();
        visible_todos(snapshot.data.owned_by(&owner.email), params.filter, &params.search)
    }

    pub fn stats(&self, owner: &User) -> TodoStats {
        let snapshot = self.todos.current();
        TodoStats::from_todos(snapshot.data.owned_by(&owner.email))
    }

    pub async fn create(&self, owner: &User, req: NewTodoRequest) -> Result<Todo, AppError> {
        let content = req.content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("content must not be empty".to_string()));
        }

        let new = NewTodo {
            priority: Some(req.priority.unwrap_or(Priority::Medium)),
            due_date: optional_timestamp("due_date", req.due_date.as_deref())?,
            reminder_date: optional_timestamp("reminder_date", req.reminder_date.as_deref())?,
            ..NewTodo::new(content, owner.email.clone())
        };

        let store = self.store.clone();
        let record = write_with_fallback(new, |new| {
            let store = store.clone();
            async move { store.create_todo(&new).await }
        })
        .await?;

        info!("todo {} created by {}", record.id, owner.email);
        Ok(Todo::from(record))
    }

    pub async fn toggle(&self, owner: &User, id: &str) -> Result<Todo, AppError> {
        let current = self.owned_todo(owner, id).await?;
        if !self.todos.current().data.completion_available {
            return Err(AppError::CapabilityUnavailable(
                "completion tracking is not available yet".to_string(),
            ));
        }

        let patch = TodoPatch {
            is_done: Some(!current.is_done),
            ..TodoPatch::default()
        };
        self.apply(id, patch).await
    }

    /// Blank content leaves the todo untouched.
    pub async fn edit(&self, owner: &User, id: &str, content: &str) -> Result<Todo, AppError> {
        let current = self.owned_todo(owner, id).await?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(current);
        }

        let patch = TodoPatch {
            content: Some(content.to_string()),
            ..TodoPatch::default()
        };
        self.apply(id, patch).await
    }

    pub async fn delete(&self, owner: &User, id: &str) -> Result<(), AppError> {
        self.owned_todo(owner, id).await?;
        if self.store.delete_todo(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    /// Deletes every completed todo of `owner`. All deletions are attempted; the
    /// first failure is reported afterwards.
    pub async fn clear_completed(&self, owner: &User) -> Result<usize, AppError> {
        let snapshot = self.todos.current();
        let completed: Vec<String> = snapshot
            .data
            .owned_by(&owner.email)
            .filter(|t| t.is_done)
            .map(|t| t.id.clone())
            .collect();

        let mut deleted = 0;
        let mut first_error = None;
        for id in completed {
            match self.store.delete_todo(&id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("failed to delete completed todo {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(deleted),
        }
    }

    async fn owned_todo(&self, owner: &User, id: &str) -> Result<Todo, AppError> {
        let todo = self
            .store
            .find_todo(id)
            .await?
            .map(Todo::from)
            .ok_or(AppError::NotFound)?;

        if todo.created_by != owner.email {
            return Err(AppError::Forbidden("todo belongs to another user".to_string()));
        }
        Ok(todo)
    }

    async fn apply(&self, id: &str, patch: TodoPatch) -> Result<Todo, AppError> {
        let store = self.store.clone();
        let id_owned = id.to_string();
        let record = write_with_fallback(patch, |patch| {
            let store = store.clone();
            let id = id_owned.clone();
            async move { store.update_todo(&id, &patch).await }
        })
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(Todo::from(record))
    }
}
