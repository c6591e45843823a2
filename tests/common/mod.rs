#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;

use todo_reminders::db::{DataStore, SqliteStore, StoreError, repository};
use todo_reminders::mailer::{DispatchError, DispatchReceipt, ReminderDispatcher, ReminderRequest};
use todo_reminders::models::{NewTodo, NewUser, TodoPatch, TodoRecord, User, UserPatch};
use todo_reminders::sync::{
    TodoCollection, TodoSnapshots, UserSnapshots, follow_todos, follow_users, snapshot_channel,
};

pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database")
}

const USERS_TABLE: &str = r#"
    CREATE TABLE users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        is_admin INTEGER NOT NULL DEFAULT 0,
        notifications_enabled INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
"#;

async fn pool_with(todos_table: &str) -> SqlitePool {
    let pool = memory_pool().await;
    for ddl in [USERS_TABLE, todos_table] {
        sqlx::query(ddl)
            .execute(&pool)
            .await
            .expect("Failed to create table");
    }
    pool
}

/// A todos table from before completion tracking, reminders and priority existed.
pub async fn legacy_pool() -> SqlitePool {
    pool_with(
        r#"
        CREATE TABLE todos (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await
}

/// Everything except the priority column.
pub async fn pool_without_priority() -> SqlitePool {
    pool_with(
        r#"
        CREATE TABLE todos (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            is_done INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            due_date TEXT,
            reminder_date TEXT,
            reminder_sent INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await
}

/// Wraps the real store, counting writes and optionally failing todo updates.
pub struct RecordingStore {
    inner: SqliteStore,
    pub writes: AtomicUsize,
    pub fail_updates: AtomicBool,
}

impl RecordingStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataStore for RecordingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn list_todos(&self) -> Result<Vec<TodoRecord>, StoreError> {
        self.inner.list_todos().await
    }

    async fn find_todo(&self, id: &str) -> Result<Option<TodoRecord>, StoreError> {
        self.inner.find_todo(id).await
    }

    async fn create_todo(&self, todo: &NewTodo) -> Result<TodoRecord, StoreError> {
        self.record();
        self.inner.create_todo(todo).await
    }

    async fn update_todo(&self, id: &str, patch: &TodoPatch) -> Result<Option<TodoRecord>, StoreError> {
        self.record();
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.update_todo(id, patch).await
    }

    async fn claim_reminder(&self, id: &str) -> Result<bool, StoreError> {
        self.record();
        self.inner.claim_reminder(id).await
    }

    async fn delete_todo(&self, id: &str) -> Result<bool, StoreError> {
        self.record();
        self.inner.delete_todo(id).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.list_users().await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_email(email).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        self.record();
        self.inner.create_user(user).await
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        self.record();
        self.inner.update_user(id, patch).await
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        self.record();
        self.inner.delete_user(id).await
    }

    async fn refresh_schema(&self) -> Result<(), StoreError> {
        self.inner.refresh_schema().await
    }

    fn subscribe_todos(&self) -> broadcast::Receiver<Vec<TodoRecord>> {
        self.inner.subscribe_todos()
    }

    fn subscribe_users(&self) -> broadcast::Receiver<Vec<User>> {
        self.inner.subscribe_users()
    }
}

/// Store plus running snapshot followers.
pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub todos: TodoSnapshots,
    pub users: UserSnapshots,
}

impl Harness {
    pub async fn migrated() -> Self {
        let pool = memory_pool().await;
        repository::migrate(&pool).await.expect("Failed to run migrations");
        Self::on(pool).await
    }

    pub async fn legacy() -> Self {
        Self::on(legacy_pool().await).await
    }

    pub async fn on(pool: SqlitePool) -> Self {
        let inner = SqliteStore::new(pool).await.expect("Failed to open store");
        let store = Arc::new(RecordingStore {
            inner,
            writes: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
        });

        let (todo_writer, mut todos) = snapshot_channel(TodoCollection::default());
        let (user_writer, mut users) = snapshot_channel(Vec::new());
        tokio::spawn(follow_todos(store.clone(), todo_writer));
        tokio::spawn(follow_users(store.clone(), user_writer));

        // The followers subscribe before their first load, so once both have
        // loaded no change can be missed.
        todos.wait_for(|s| s.generation > 0).await.expect("todo follower");
        users.wait_for(|s| s.generation > 0).await.expect("user follower");

        Self { store, todos, users }
    }

    pub fn dyn_store(&self) -> Arc<dyn DataStore> {
        self.store.clone()
    }

    pub async fn add_user(&self, email: &str, is_admin: bool, notifications_enabled: bool) -> User {
        let user = self
            .store
            .create_user(&NewUser {
                email: email.to_string(),
                is_admin,
                notifications_enabled,
            })
            .await
            .expect("Failed to create user");
        let id = user.id.clone();
        self.users
            .clone()
            .wait_for(|s| s.data.iter().any(|u| u.id == id))
            .await
            .expect("user snapshot");
        user
    }

    pub async fn add_todo(&self, new: NewTodo) -> TodoRecord {
        let record = self.store.create_todo(&new).await.expect("Failed to create todo");
        let id = record.id.clone();
        self.todos
            .clone()
            .wait_for(|s| s.data.find(&id).is_some())
            .await
            .expect("todo snapshot");
        record
    }

    pub async fn todo_generation_after(&self, generation: u64) -> u64 {
        self.todos
            .clone()
            .wait_for(|s| s.generation > generation)
            .await
            .expect("todo snapshot")
            .generation
    }
}

/// Records every reminder request and answers with a fixed outcome.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub requests: Mutex<Vec<ReminderRequest>>,
    pub fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ReminderDispatcher for RecordingDispatcher {
    async fn send_reminder(&self, request: &ReminderRequest) -> Result<DispatchReceipt, DispatchError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected {
                status: 500,
                error: "Failed to send reminder email".to_string(),
                message: "Email address is not verified".to_string(),
            });
        }
        Ok(DispatchReceipt {
            message: "Reminder email sent successfully".to_string(),
            message_id: Some(format!("msg-{}", self.calls())),
        })
    }
}
