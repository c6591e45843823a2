use std::sync::Arc;

use tracing::info;

use crate::db::DataStore;
use crate::error::AppError;
use crate::models::{AdminStats, User, UserPatch};
use crate::sync::{TodoSnapshots, UserSnapshots};

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn DataStore>,
    users: UserSnapshots,
    todos: TodoSnapshots,
}

impl AdminService {
    pub fn new(store: Arc<dyn DataStore>, users: UserSnapshots, todos: TodoSnapshots) -> Self {
        Self { store, users, todos }
    }

    pub fn list_users(&self, actor: &User) -> Result<Vec<User>, AppError> {
        require_admin(actor)?;
        Ok(self.users.current().data.clone())
    }

    pub fn stats(&self, actor: &User) -> Result<AdminStats, AppError> {
        require_admin(actor)?;
        let users = self.users.current();
        Ok(AdminStats {
            total_users: users.data.len(),
            admins: users.data.iter().filter(|u| u.is_admin).count(),
            total_todos: self.todos.current().data.todos.len(),
        })
    }

    pub async fn set_admin(&self, actor: &User, target_id: &str, is_admin: bool) -> Result<User, AppError> {
        require_admin(actor)?;
        if actor.id == target_id {
            return Err(AppError::Forbidden("you cannot change your own admin status".to_string()));
        }

        let patch = UserPatch {
            is_admin: Some(is_admin),
            ..UserPatch::default()
        };
        let user = self
            .store
            .update_user(target_id, &patch)
            .await?
            .ok_or(AppError::NotFound)?;
        info!("{} set admin={} for {}", actor.email, is_admin, user.email);
        Ok(user)
    }

    /// Todos created by the deleted user are left in place.
    pub async fn delete_user(&self, actor: &User, target_id: &str) -> Result<(), AppError> {
        require_admin(actor)?;
        if actor.id == target_id {
            return Err(AppError::Forbidden("you cannot delete yourself".to_string()));
        }

        if self.store.delete_user(target_id).await? {
            info!("{} deleted user {}", actor.email, target_id);
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    pub async fn refresh_schema(&self, actor: &User) -> Result<(), AppError> {
        require_admin(actor)?;
        self.store.refresh_schema().await?;
        info!("{} refreshed the store schema", actor.email);
        Ok(())
    }
}

fn require_admin(actor: &User) -> Result<(), AppError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden("admin access required".to_string()))
    }
}
