//! In-memory snapshots of the store's collections.
//!
//! Each snapshot has exactly one writer: the follower task that listens to the
//! store's change feed and replaces the whole collection on every emission.
//! Everything else holds a [`SnapshotReader`].

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::db::{DataStore, StoreError};
use crate::models::{Todo, TodoRecord, User};

#[derive(Debug)]
pub struct Snapshot<T> {
    /// Bumped on every replace. Generation 0 is the empty value before the first load.
    pub generation: u64,
    pub data: T,
}

pub struct SnapshotWriter<T> {
    tx: watch::Sender<Arc<Snapshot<T>>>,
}

impl<T> SnapshotWriter<T> {
    pub fn replace(&self, data: T) -> u64 {
        let generation = self.tx.borrow().generation + 1;
        self.tx.send_replace(Arc::new(Snapshot { generation, data }));
        generation
    }
}

pub struct SnapshotReader<T> {
    rx: watch::Receiver<Arc<Snapshot<T>>>,
}

impl<T> Clone for SnapshotReader<T> {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone() }
    }
}

impl<T> SnapshotReader<T> {
    pub fn current(&self) -> Arc<Snapshot<T>> {
        self.rx.borrow().clone()
    }

    /// Resolves once a snapshot satisfying `predicate` is published. `None` if
    /// the writer went away first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<Arc<Snapshot<T>>>
    where
        F: FnMut(&Snapshot<T>) -> bool,
    {
        self.rx
            .wait_for(|snapshot| predicate(&**snapshot))
            .await
            .ok()
            .map(|snapshot| Arc::clone(&snapshot))
    }
}

pub fn snapshot_channel<T>(initial: T) -> (SnapshotWriter<T>, SnapshotReader<T>) {
    let (tx, rx) = watch::channel(Arc::new(Snapshot {
        generation: 0,
        data: initial,
    }));
    (SnapshotWriter { tx }, SnapshotReader { rx })
}

#[derive(Debug, Clone)]
pub struct TodoCollection {
    pub todos: Vec<Todo>,
    /// False only when the store returned todos and none of them carried the
    /// completion field.
    pub completion_available: bool,
}

impl Default for TodoCollection {
    fn default() -> Self {
        Self {
            todos: Vec::new(),
            completion_available: true,
        }
    }
}

impl TodoCollection {
    pub fn from_records(records: Vec<TodoRecord>) -> Self {
        let completion_available =
            records.is_empty() || records.iter().any(|r| r.is_done.is_some());
        Self {
            todos: records.into_iter().map(Todo::from).collect(),
            completion_available,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn owned_by<'a>(&'a self, email: &'a str) -> impl Iterator<Item = &'a Todo> + 'a {
        self.todos.iter().filter(move |t| t.created_by == email)
    }
}

pub type TodoSnapshots = SnapshotReader<TodoCollection>;
pub type UserSnapshots = SnapshotReader<Vec<User>>;

pub async fn follow_todos(store: Arc<dyn DataStore>, writer: SnapshotWriter<TodoCollection>) {
    let feed = store.subscribe_todos();
    let initial = store.list_todos().await;
    follow("todos", feed, initial, writer, TodoCollection::from_records).await;
}

pub async fn follow_users(store: Arc<dyn DataStore>, writer: SnapshotWriter<Vec<User>>) {
    let feed = store.subscribe_users();
    let initial = store.list_users().await;
    follow("users", feed, initial, writer, |users| users).await;
}

async fn follow<R, T, F>(
    label: &str,
    mut feed: broadcast::Receiver<R>,
    initial: Result<R, StoreError>,
    writer: SnapshotWriter<T>,
    build: F,
) where
    R: Clone,
    F: Fn(R) -> T,
{
    match initial {
        Ok(items) => {
            let generation = writer.replace(build(items));
            info!("{} snapshot loaded (generation {})", label, generation);
        }
        Err(e) => warn!("initial {} load failed, waiting for change feed: {}", label, e),
    }

    loop {
        match feed.recv().await {
            Ok(items) => {
                let generation = writer.replace(build(items));
                debug!("{} snapshot replaced (generation {})", label, generation);
            }
            // Every emission is a full collection, so skipping ahead loses nothing.
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("{} follower lagged, skipped {} emissions", label, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("{} change feed closed", label);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, is_done: Option<bool>) -> TodoRecord {
        TodoRecord {
            id: id.to_string(),
            content: id.to_string(),
            is_done,
            created_by: "a@example.com".to_string(),
            due_date: None,
            reminder_date: None,
            reminder_sent: None,
            priority: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn completion_is_available_for_empty_collections() {
        assert!(TodoCollection::from_records(Vec::new()).completion_available);
    }

    #[test]
    fn completion_is_unavailable_when_no_record_has_the_field() {
        let collection = TodoCollection::from_records(vec![record("a", None), record("b", None)]);
        assert!(!collection.completion_available);

        let collection =
            TodoCollection::from_records(vec![record("a", None), record("b", Some(true))]);
        assert!(collection.completion_available);
    }

    #[tokio::test]
    async fn replace_bumps_generation_and_overwrites() {
        let (writer, mut reader) = snapshot_channel(vec![1, 2, 3]);
        assert_eq!(reader.current().generation, 0);

        writer.replace(vec![4]);
        let snapshot = reader.wait_for(|s| s.generation == 1).await.unwrap();
        assert_eq!(snapshot.data, vec![4]);
    }
}
