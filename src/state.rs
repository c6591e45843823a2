use std::sync::Arc;

use crate::db::DataStore;
use crate::services::{AdminService, NotificationHub, TodoService, UserService};
use crate::sync::{TodoSnapshots, UserSnapshots};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub todos: TodoService,
    pub users: UserService,
    pub admin: AdminService,
    pub notifications: NotificationHub,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DataStore>,
        todos: TodoSnapshots,
        users: UserSnapshots,
        notifications: NotificationHub,
        admin_emails: Vec<String>,
    ) -> Self {
        Self {
            todos: TodoService::new(store.clone(), todos.clone()),
            users: UserService::new(store.clone(), admin_emails),
            admin: AdminService::new(store.clone(), users, todos),
            notifications,
            store,
        }
    }
}
