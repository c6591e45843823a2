use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Sort key: lower ranks are listed first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Anything the store hands back that we don't recognise counts as medium.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("high") => Priority::High,
            Some("low") => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Columns of the `todos` table that a write may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TodoField {
    Content,
    IsDone,
    CreatedBy,
    DueDate,
    ReminderDate,
    ReminderSent,
    Priority,
}

impl TodoField {
    pub fn column(self) -> &'static str {
        match self {
            TodoField::Content => "content",
            TodoField::IsDone => "is_done",
            TodoField::CreatedBy => "created_by",
            TodoField::DueDate => "due_date",
            TodoField::ReminderDate => "reminder_date",
            TodoField::ReminderSent => "reminder_sent",
            TodoField::Priority => "priority",
        }
    }

    /// Whether a write can still succeed with this field left out.
    pub fn is_optional(self) -> bool {
        !matches!(self, TodoField::Content | TodoField::CreatedBy)
    }
}

impl std::fmt::Display for TodoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// A todo row exactly as the store returns it. `None` means the store did not
/// provide the field at all (older schema) or stored NULL.
#[derive(Debug, Clone, FromRow)]
pub struct TodoRecord {
    pub id: String,
    pub content: String,
    pub is_done: Option<bool>,
    pub created_by: String,
    pub due_date: Option<String>,
    pub reminder_date: Option<String>,
    pub reminder_sent: Option<bool>,
    pub priority: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub content: String,
    pub is_done: bool,
    pub created_by: String,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_date: Option<DateTime<Utc>>,
    pub reminder_sent: bool,
    pub priority: Priority,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TodoRecord> for Todo {
    fn from(record: TodoRecord) -> Self {
        Self {
            id: record.id,
            content: record.content,
            is_done: record.is_done.unwrap_or(false),
            created_by: record.created_by,
            due_date: record.due_date.as_deref().and_then(parse_timestamp),
            reminder_date: record.reminder_date.as_deref().and_then(parse_timestamp),
            reminder_sent: record.reminder_sent.unwrap_or(false),
            priority: Priority::from_stored(record.priority.as_deref()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Pending,
    Notified,
}

impl Todo {
    /// `None` for todos without a reminder date.
    pub fn reminder_state(&self) -> Option<ReminderState> {
        self.reminder_date.map(|_| {
            if self.reminder_sent {
                ReminderState::Notified
            } else {
                ReminderState::Pending
            }
        })
    }

    pub fn reminder_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_done
            && self.reminder_state() == Some(ReminderState::Pending)
            && self.reminder_date.is_some_and(|at| at <= now)
    }

    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim();
        query.is_empty() || self.content.to_lowercase().contains(&query.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TodoFilter {
    pub fn matches(self, todo: &Todo) -> bool {
        match self {
            TodoFilter::All => true,
            TodoFilter::Active => !todo.is_done,
            TodoFilter::Completed => todo.is_done,
        }
    }
}

/// Applies the filter and search, then orders by priority. The sort is stable,
/// so todos of equal priority keep their snapshot order.
pub fn visible_todos<'a, I>(todos: I, filter: TodoFilter, search: &str) -> Vec<Todo>
where
    I: IntoIterator<Item = &'a Todo>,
{
    let mut visible: Vec<Todo> = todos
        .into_iter()
        .filter(|todo| filter.matches(todo) && todo.matches_search(search))
        .cloned()
        .collect();
    visible.sort_by_key(|todo| todo.priority.rank());
    visible
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TodoStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

impl TodoStats {
    pub fn from_todos<'a, I>(todos: I) -> Self
    where
        I: IntoIterator<Item = &'a Todo>,
    {
        todos.into_iter().fold(Self::default(), |mut stats, todo| {
            stats.total += 1;
            if todo.is_done {
                stats.completed += 1;
            } else {
                stats.active += 1;
            }
            stats
        })
    }
}

/// Input for a store insert. Optional fields left as `None` are not written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTodo {
    pub content: String,
    pub created_by: String,
    pub is_done: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_date: Option<DateTime<Utc>>,
    pub reminder_sent: Option<bool>,
}

impl NewTodo {
    pub fn new(content: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            created_by: created_by.into(),
            is_done: Some(false),
            priority: Some(Priority::Medium),
            due_date: None,
            reminder_date: None,
            reminder_sent: Some(false),
        }
    }

    /// Same insert with `field` dropped. Returns `None` if the field is required.
    pub fn without(&self, field: TodoField) -> Option<Self> {
        let mut next = self.clone();
        match field {
            TodoField::Content | TodoField::CreatedBy => return None,
            TodoField::IsDone => next.is_done = None,
            TodoField::Priority => next.priority = None,
            TodoField::DueDate => next.due_date = None,
            TodoField::ReminderDate => next.reminder_date = None,
            TodoField::ReminderSent => next.reminder_sent = None,
        }
        Some(next)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoPatch {
    pub content: Option<String>,
    pub is_done: Option<bool>,
    pub reminder_sent: Option<bool>,
    pub priority: Option<Priority>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.is_done.is_none()
            && self.reminder_sent.is_none()
            && self.priority.is_none()
    }

    pub fn without(&self, field: TodoField) -> Option<Self> {
        let mut next = self.clone();
        match field {
            TodoField::Content | TodoField::CreatedBy => return None,
            TodoField::IsDone => next.is_done = None,
            TodoField::ReminderSent => next.reminder_sent = None,
            TodoField::Priority => next.priority = None,
            TodoField::DueDate | TodoField::ReminderDate => {}
        }
        Some(next)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTodoRequest {
    pub content: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub reminder_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTodoRequest {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoQueryParams {
    #[serde(default)]
    pub filter: TodoFilter,
    #[serde(default)]
    pub search: String,
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
