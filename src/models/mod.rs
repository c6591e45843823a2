pub mod todo;
pub mod user;

pub use todo::{
    NewTodo, NewTodoRequest, Priority, ReminderState, Todo, TodoField, TodoFilter, TodoPatch,
    TodoQueryParams, TodoRecord, TodoStats, UpdateTodoRequest, visible_todos,
};
pub use user::{AdminStats, NewUser, NotificationSettingsRequest, SetAdminRequest, User, UserPatch};
