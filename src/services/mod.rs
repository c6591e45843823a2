pub mod admin_service;
pub mod notifications;
pub mod scheduler;
pub mod todo_service;
pub mod user_service;

pub use admin_service::AdminService;
pub use notifications::{Inbox, NOTIFICATION_CAPACITY, NotificationHub, ReminderNotification};
pub use scheduler::{ReminderScheduler, ScanStats};
pub use todo_service::TodoService;
pub use user_service::UserService;
