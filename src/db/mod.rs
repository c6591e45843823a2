pub mod repository;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{NewTodo, NewUser, TodoField, TodoPatch, TodoRecord, User, UserPatch};

pub use repository::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("field `{0}` is not supported by the data store")]
    FieldUnsupported(TodoField),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// The remote data store. Every mutation re-publishes the full affected
/// collection on the matching change feed.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn list_todos(&self) -> Result<Vec<TodoRecord>, StoreError>;
    async fn find_todo(&self, id: &str) -> Result<Option<TodoRecord>, StoreError>;
    async fn create_todo(&self, todo: &NewTodo) -> Result<TodoRecord, StoreError>;
    /// `Ok(None)` when no todo has this id.
    async fn update_todo(&self, id: &str, patch: &TodoPatch) -> Result<Option<TodoRecord>, StoreError>;
    /// Conditional `reminder_sent: false -> true`. `Ok(true)` only for the caller that flipped it.
    async fn claim_reminder(&self, id: &str) -> Result<bool, StoreError>;
    async fn delete_todo(&self, id: &str) -> Result<bool, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Inserts the user unless one with the same email already exists; returns the stored row.
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError>;
    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<User>, StoreError>;
    async fn delete_user(&self, id: &str) -> Result<bool, StoreError>;

    /// Re-reads the table layout so newly added columns become writable.
    async fn refresh_schema(&self) -> Result<(), StoreError>;

    fn subscribe_todos(&self) -> broadcast::Receiver<Vec<TodoRecord>>;
    fn subscribe_users(&self) -> broadcast::Receiver<Vec<User>>;
}
