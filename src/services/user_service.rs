use std::sync::Arc;

use tracing::info;

use crate::db::DataStore;
use crate::error::AppError;
use crate::models::{NewUser, User, UserPatch};

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DataStore>,
    admin_emails: Arc<Vec<String>>,
}

impl UserService {
    pub fn new(store: Arc<dyn DataStore>, admin_emails: Vec<String>) -> Self {
        Self {
            store,
            admin_emails: Arc::new(admin_emails),
        }
    }

    /// Looks up the signed-in user, creating the record on first sight.
    pub async fn ensure_user(&self, email: &str) -> Result<User, AppError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AppError::Unauthorized("missing user identity".to_string()));
        }

        if let Some(user) = self.store.find_user_by_email(&email).await? {
            return Ok(user);
        }

        let is_admin = self.admin_emails.iter().any(|a| *a == email);
        let user = self
            .store
            .create_user(&NewUser {
                email,
                is_admin,
                notifications_enabled: true,
            })
            .await?;
        info!("created user {} (admin: {})", user.email, user.is_admin);
        Ok(user)
    }

    pub async fn set_notifications(&self, user: &User, enabled: bool) -> Result<User, AppError> {
        let patch = UserPatch {
            notifications_enabled: Some(enabled),
            ..UserPatch::default()
        };
        self.store
            .update_user(&user.id, &patch)
            .await?
            .ok_or(AppError::NotFound)
    }
}
