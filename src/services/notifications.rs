use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::models::Todo;

pub const REMINDER_TITLE: &str = "Todo Reminder";
pub const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderNotification {
    pub todo_id: String,
    pub recipient: String,
    pub title: String,
    pub body: String,
}

impl ReminderNotification {
    pub fn for_todo(todo: &Todo) -> Self {
        let body = match todo.due_date {
            Some(due) => format!(
                "{}\nDue: {}",
                todo.content,
                due.with_timezone(&Local).format("%b %-d, %Y %H:%M")
            ),
            None => todo.content.clone(),
        };

        Self {
            todo_id: todo.id.clone(),
            recipient: todo.created_by.clone(),
            title: REMINDER_TITLE.to_string(),
            body,
        }
    }
}

type ListenerCounts = Arc<Mutex<HashMap<String, usize>>>;

fn counts(listeners: &ListenerCounts) -> MutexGuard<'_, HashMap<String, usize>> {
    listeners.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fan-out of reminder notifications to connected clients.
#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<ReminderNotification>,
    listeners: ListenerCounts,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a client of `recipient` until the returned inbox is dropped.
    pub fn subscribe(&self, recipient: &str) -> Inbox {
        *counts(&self.listeners)
            .entry(recipient.to_string())
            .or_default() += 1;

        Inbox {
            rx: self.tx.subscribe(),
            registration: Registration {
                recipient: recipient.to_string(),
                listeners: self.listeners.clone(),
            },
        }
    }

    pub fn has_listener(&self, recipient: &str) -> bool {
        counts(&self.listeners).get(recipient).is_some_and(|n| *n > 0)
    }

    /// Returns false when the recipient has no connected client; the
    /// notification is dropped.
    pub fn notify(&self, notification: ReminderNotification) -> bool {
        if !self.has_listener(&notification.recipient) {
            return false;
        }
        self.tx.send(notification).is_ok()
    }
}

struct Registration {
    recipient: String,
    listeners: ListenerCounts,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut counts = counts(&self.listeners);
        if let Some(n) = counts.get_mut(&self.recipient) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                counts.remove(&self.recipient);
            }
        }
    }
}

/// Notifications addressed to one recipient.
pub struct Inbox {
    rx: broadcast::Receiver<ReminderNotification>,
    registration: Registration,
}

impl Inbox {
    /// `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<ReminderNotification> {
        loop {
            match self.rx.recv().await {
                Ok(n) if n.recipient == self.registration.recipient => return Some(n),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("inbox of {} lagged, skipped {} notifications", self.registration.recipient, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<ReminderNotification> {
        loop {
            match self.rx.try_recv() {
                Ok(n) if n.recipient == self.registration.recipient => return Some(n),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// The listener stays registered for as long as the stream is alive.
    pub fn into_stream(self) -> impl Stream<Item = ReminderNotification> + Send + 'static {
        let Inbox { rx, registration } = self;
        BroadcastStream::new(rx).filter_map(move |msg| match msg {
            Ok(n) if n.recipient == registration.recipient => Some(n),
            _ => None,
        })
    }
}
