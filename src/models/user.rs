use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
    pub notifications_enabled: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub is_admin: bool,
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub is_admin: Option<bool>,
    pub notifications_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettingsRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: usize,
    pub admins: usize,
    pub total_todos: usize,
}
