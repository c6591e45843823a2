use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{DataStore, StoreError};
use crate::models::{NewTodo, NewUser, TodoField, TodoPatch, TodoRecord, User, UserPatch};

const FEED_CAPACITY: usize = 16;

/// Columns read for every todo, in `TodoRecord` order. Evolvable ones that the
/// table lacks are selected as NULL.
const TODO_COLUMNS: [&str; 10] = [
    "id",
    "content",
    "is_done",
    "created_by",
    "due_date",
    "reminder_date",
    "reminder_sent",
    "priority",
    "created_at",
    "updated_at",
];

const USER_SELECT: &str =
    "SELECT id, email, is_admin, notifications_enabled, created_at FROM users";

pub async fn migrate(db: &SqlitePool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(db).await?;
    Ok(())
}

enum Value {
    Text(String),
    Flag(bool),
}

pub struct SqliteStore {
    db: SqlitePool,
    todo_columns: RwLock<HashSet<String>>,
    /// Held across write, re-list and publish so feed emissions leave in commit order.
    write_lock: Mutex<()>,
    todo_feed: broadcast::Sender<Vec<TodoRecord>>,
    user_feed: broadcast::Sender<Vec<User>>,
}

impl SqliteStore {
    pub async fn new(db: SqlitePool) -> Result<Self, StoreError> {
        let columns = load_todo_columns(&db).await?;
        debug!("todos table columns: {:?}", columns);
        let (todo_feed, _) = broadcast::channel(FEED_CAPACITY);
        let (user_feed, _) = broadcast::channel(FEED_CAPACITY);

        Ok(Self {
            db,
            todo_columns: RwLock::new(columns),
            write_lock: Mutex::new(()),
            todo_feed,
            user_feed,
        })
    }

    pub fn supports(&self, field: TodoField) -> bool {
        self.todo_columns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(field.column())
    }

    fn todo_select(&self) -> String {
        let columns = self.todo_columns.read().unwrap_or_else(|e| e.into_inner());
        let list = TODO_COLUMNS
            .iter()
            .map(|c| {
                if columns.contains(*c) {
                    c.to_string()
                } else {
                    format!("NULL AS {}", c)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {} FROM todos", list)
    }

    fn checked(&self, field: TodoField, value: Value) -> Result<(&'static str, Value), StoreError> {
        if self.supports(field) {
            Ok((field.column(), value))
        } else {
            Err(StoreError::FieldUnsupported(field))
        }
    }

    async fn publish_todos(&self) {
        if self.todo_feed.receiver_count() == 0 {
            return;
        }
        match self.list_todos().await {
            Ok(todos) => {
                let _ = self.todo_feed.send(todos);
            }
            Err(e) => warn!("failed to publish todo collection: {}", e),
        }
    }

    async fn publish_users(&self) {
        if self.user_feed.receiver_count() == 0 {
            return;
        }
        match self.list_users().await {
            Ok(users) => {
                let _ = self.user_feed.send(users);
            }
            Err(e) => warn!("failed to publish user collection: {}", e),
        }
    }
}

async fn load_todo_columns(db: &SqlitePool) -> Result<HashSet<String>, StoreError> {
    let rows = sqlx::query("SELECT name FROM pragma_table_info('todos')")
        .fetch_all(db)
        .await?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(StoreError::from))
        .collect()
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    values: Vec<Value>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Text(s) => query.bind(s),
            Value::Flag(b) => query.bind(b),
        };
    }
    query
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }

    async fn list_todos(&self) -> Result<Vec<TodoRecord>, StoreError> {
        let sql = format!("{} ORDER BY created_at ASC", self.todo_select());
        let todos = sqlx::query_as::<_, TodoRecord>(&sql)
            .fetch_all(&self.db)
            .await?;
        Ok(todos)
    }

    async fn find_todo(&self, id: &str) -> Result<Option<TodoRecord>, StoreError> {
        let sql = format!("{} WHERE id = ?", self.todo_select());
        let todo = sqlx::query_as::<_, TodoRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(todo)
    }

    async fn create_todo(&self, todo: &NewTodo) -> Result<TodoRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut fields = vec![
            ("id", Value::Text(id.clone())),
            self.checked(TodoField::Content, Value::Text(todo.content.clone()))?,
            self.checked(TodoField::CreatedBy, Value::Text(todo.created_by.clone()))?,
            ("created_at", Value::Text(now.clone())),
            ("updated_at", Value::Text(now)),
        ];
        if let Some(is_done) = todo.is_done {
            fields.push(self.checked(TodoField::IsDone, Value::Flag(is_done))?);
        }
        if let Some(priority) = todo.priority {
            fields.push(self.checked(TodoField::Priority, Value::Text(priority.as_str().to_string()))?);
        }
        if let Some(due_date) = todo.due_date {
            fields.push(self.checked(TodoField::DueDate, Value::Text(due_date.to_rfc3339()))?);
        }
        if let Some(reminder_date) = todo.reminder_date {
            fields.push(self.checked(TodoField::ReminderDate, Value::Text(reminder_date.to_rfc3339()))?);
        }
        if let Some(reminder_sent) = todo.reminder_sent {
            fields.push(self.checked(TodoField::ReminderSent, Value::Flag(reminder_sent))?);
        }

        let (columns, values): (Vec<&str>, Vec<Value>) = fields.into_iter().unzip();
        let sql = format!(
            "INSERT INTO todos ({}) VALUES ({})",
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        bind_all(sqlx::query(&sql), values).execute(&self.db).await?;

        let created = self
            .find_todo(&id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        self.publish_todos().await;
        Ok(created)
    }

    async fn update_todo(&self, id: &str, patch: &TodoPatch) -> Result<Option<TodoRecord>, StoreError> {
        if patch.is_empty() {
            return self.find_todo(id).await;
        }
        let _guard = self.write_lock.lock().await;

        let mut fields = Vec::new();
        if let Some(content) = &patch.content {
            fields.push(self.checked(TodoField::Content, Value::Text(content.clone()))?);
        }
        if let Some(is_done) = patch.is_done {
            fields.push(self.checked(TodoField::IsDone, Value::Flag(is_done))?);
        }
        if let Some(reminder_sent) = patch.reminder_sent {
            fields.push(self.checked(TodoField::ReminderSent, Value::Flag(reminder_sent))?);
        }
        if let Some(priority) = patch.priority {
            fields.push(self.checked(TodoField::Priority, Value::Text(priority.as_str().to_string()))?);
        }
        fields.push(("updated_at", Value::Text(Utc::now().to_rfc3339())));

        let (columns, mut values): (Vec<&str>, Vec<Value>) = fields.into_iter().unzip();
        let assignments = columns
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE todos SET {} WHERE id = ?", assignments);
        values.push(Value::Text(id.to_string()));

        let affected = bind_all(sqlx::query(&sql), values)
            .execute(&self.db)
            .await?
            .rows_affected();
        if affected == 0 {
            return Ok(None);
        }

        let updated = self.find_todo(id).await?;
        self.publish_todos().await;
        Ok(updated)
    }

    async fn claim_reminder(&self, id: &str) -> Result<bool, StoreError> {
        if !self.supports(TodoField::ReminderSent) {
            return Err(StoreError::FieldUnsupported(TodoField::ReminderSent));
        }
        let _guard = self.write_lock.lock().await;

        let affected = sqlx::query(
            "UPDATE todos SET reminder_sent = 1, updated_at = ? WHERE id = ? AND reminder_sent = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.db)
        .await?
        .rows_affected();

        if affected > 0 {
            self.publish_todos().await;
        }
        Ok(affected > 0)
    }

    async fn delete_todo(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let affected = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();

        if affected > 0 {
            self.publish_todos().await;
        }
        Ok(affected > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("{} ORDER BY created_at ASC", USER_SELECT);
        let users = sqlx::query_as::<_, User>(&sql).fetch_all(&self.db).await?;
        Ok(users)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("{} WHERE email = ?", USER_SELECT);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let _guard = self.write_lock.lock().await;
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, email, is_admin, notifications_enabled, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.email)
        .bind(user.is_admin)
        .bind(user.notifications_enabled)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?
        .rows_affected();

        let stored = self
            .find_user_by_email(&user.email)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        if inserted > 0 {
            self.publish_users().await;
        }
        Ok(stored)
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let affected = sqlx::query(
            r#"
            UPDATE users
            SET is_admin = COALESCE(?1, is_admin),
                notifications_enabled = COALESCE(?2, notifications_enabled)
            WHERE id = ?3
            "#,
        )
        .bind(patch.is_admin)
        .bind(patch.notifications_enabled)
        .bind(id)
        .execute(&self.db)
        .await?
        .rows_affected();

        if affected == 0 {
            return Ok(None);
        }

        let sql = format!("{} WHERE id = ?", USER_SELECT);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        self.publish_users().await;
        Ok(user)
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let affected = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();

        if affected > 0 {
            self.publish_users().await;
        }
        Ok(affected > 0)
    }

    async fn refresh_schema(&self) -> Result<(), StoreError> {
        let columns = load_todo_columns(&self.db).await?;
        debug!("reloaded todos table columns: {:?}", columns);
        *self.todo_columns.write().unwrap_or_else(|e| e.into_inner()) = columns;
        Ok(())
    }

    fn subscribe_todos(&self) -> broadcast::Receiver<Vec<TodoRecord>> {
        self.todo_feed.subscribe()
    }

    fn subscribe_users(&self) -> broadcast::Receiver<Vec<User>> {
        self.user_feed.subscribe()
    }
}
