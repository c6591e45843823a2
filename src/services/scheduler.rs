use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DeliveryMode;
use crate::db::DataStore;
use crate::mailer::{ReminderDispatcher, ReminderRequest};
use crate::models::{Todo, TodoPatch, User};
use crate::services::notifications::{NotificationHub, ReminderNotification};
use crate::sync::{TodoSnapshots, UserSnapshots};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub due: usize,
    /// Due but already persisted in this snapshot generation, or claimed elsewhere.
    pub skipped: usize,
    pub local_delivered: usize,
    pub emails_sent: usize,
    pub email_failures: usize,
    pub marked: usize,
    pub mark_failures: usize,
}

/// Reminder scanner.
/// Periodically notifies owners of todos whose reminder time has passed.
pub struct ReminderScheduler {
    store: Arc<dyn DataStore>,
    todos: TodoSnapshots,
    users: UserSnapshots,
    hub: NotificationHub,
    dispatcher: Arc<dyn ReminderDispatcher>,
    interval: Duration,
    mode: DeliveryMode,
    /// todo id -> snapshot generation in which `reminder_sent` was persisted.
    /// Covers the gap until the follower publishes the write.
    attempted: HashMap<String, u64>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn DataStore>,
        todos: TodoSnapshots,
        users: UserSnapshots,
        hub: NotificationHub,
        dispatcher: Arc<dyn ReminderDispatcher>,
        interval: Duration,
        mode: DeliveryMode,
    ) -> Self {
        Self {
            store,
            todos,
            users,
            hub,
            dispatcher,
            interval,
            mode,
            attempted: HashMap::new(),
        }
    }

    /// Scans forever. Failures are logged and the loop keeps going.
    pub async fn start(mut self) {
        info!(
            "Starting reminder scheduler (interval: {:?}, mode: {:?})",
            self.interval, self.mode
        );

        loop {
            tokio::time::sleep(self.interval).await;

            let stats = self.scan_once(Utc::now()).await;
            if stats.due > 0 {
                info!("Reminder scan finished: {:?}", stats);
            }
        }
    }

    pub async fn scan_once(&mut self, now: DateTime<Utc>) -> ScanStats {
        let snapshot = self.todos.current();
        let users = self.users.current();
        let mut stats = ScanStats::default();

        self.attempted
            .retain(|id, _| snapshot.data.find(id).is_some_and(|t| t.reminder_due(now)));

        for todo in snapshot.data.todos.iter().filter(|t| t.reminder_due(now)) {
            stats.due += 1;

            if self.attempted.get(&todo.id) == Some(&snapshot.generation) {
                stats.skipped += 1;
                continue;
            }
            self.attempted.insert(todo.id.clone(), snapshot.generation);

            match self.mode {
                DeliveryMode::NotifyThenMark => {
                    self.dispatch(todo, &users.data, &mut stats).await;
                    if !self.mark_sent(todo, &mut stats).await {
                        // Nothing was published, so refire on the next tick.
                        self.attempted.remove(&todo.id);
                    }
                }
                DeliveryMode::ClaimThenNotify => match self.store.claim_reminder(&todo.id).await {
                    Ok(true) => {
                        stats.marked += 1;
                        self.dispatch(todo, &users.data, &mut stats).await;
                    }
                    Ok(false) => {
                        debug!("reminder for {} already claimed", todo.id);
                        stats.skipped += 1;
                    }
                    Err(e) => {
                        warn!("failed to claim reminder for {}: {}", todo.id, e);
                        stats.mark_failures += 1;
                        self.attempted.remove(&todo.id);
                    }
                },
            }
        }

        stats
    }

    async fn dispatch(&self, todo: &Todo, users: &[User], stats: &mut ScanStats) {
        let notifications_enabled = users
            .iter()
            .find(|u| u.email == todo.created_by)
            .is_some_and(|u| u.notifications_enabled);

        if notifications_enabled && self.hub.notify(ReminderNotification::for_todo(todo)) {
            stats.local_delivered += 1;
        }

        let request = ReminderRequest::for_todo(todo.created_by.clone(), todo);
        match self.dispatcher.send_reminder(&request).await {
            Ok(receipt) => {
                stats.emails_sent += 1;
                debug!(
                    "reminder email for {} accepted: {} ({:?})",
                    todo.id, receipt.message, receipt.message_id
                );
            }
            Err(e) => {
                stats.email_failures += 1;
                warn!("failed to send reminder email for {}: {}", todo.id, e);
            }
        }
    }

    async fn mark_sent(&self, todo: &Todo, stats: &mut ScanStats) -> bool {
        let patch = TodoPatch {
            reminder_sent: Some(true),
            ..TodoPatch::default()
        };

        match self.store.update_todo(&todo.id, &patch).await {
            Ok(Some(_)) => {
                stats.marked += 1;
                true
            }
            Ok(None) => {
                debug!("todo {} disappeared before its reminder was marked", todo.id);
                stats.mark_failures += 1;
                false
            }
            Err(e) => {
                warn!("failed to mark reminder sent for {}: {}", todo.id, e);
                stats.mark_failures += 1;
                false
            }
        }
    }
}
