use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todo_reminders::api::router;
use todo_reminders::config::AppConfig;
use todo_reminders::db::{DataStore, SqliteStore, repository};
use todo_reminders::mailer::{HttpReminderDispatcher, NoopReminderDispatcher, ReminderDispatcher};
use todo_reminders::services::{NOTIFICATION_CAPACITY, NotificationHub, ReminderScheduler};
use todo_reminders::state::AppState;
use todo_reminders::sync::{TodoCollection, follow_todos, follow_users, snapshot_channel};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "todo_reminders=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    repository::migrate(&pool).await?;

    let store: Arc<dyn DataStore> = Arc::new(SqliteStore::new(pool).await?);

    let (todo_writer, todo_reader) = snapshot_channel(TodoCollection::default());
    let (user_writer, user_reader) = snapshot_channel(Vec::new());
    tokio::spawn(follow_todos(store.clone(), todo_writer));
    tokio::spawn(follow_users(store.clone(), user_writer));

    let dispatcher: Arc<dyn ReminderDispatcher> = match &config.reminder_endpoint {
        Some(endpoint) => {
            info!("reminder emails go to {}", endpoint);
            Arc::new(HttpReminderDispatcher::new(endpoint.clone(), config.dispatch_timeout)?)
        }
        None => {
            warn!("REMINDER_ENDPOINT is not set, reminder emails are disabled");
            Arc::new(NoopReminderDispatcher)
        }
    };

    let notifications = NotificationHub::new(NOTIFICATION_CAPACITY);
    let scheduler = ReminderScheduler::new(
        store.clone(),
        todo_reader.clone(),
        user_reader.clone(),
        notifications.clone(),
        dispatcher,
        config.scan_interval,
        config.delivery_mode,
    );
    tokio::spawn(scheduler.start());

    let state = AppState::new(
        store,
        todo_reader,
        user_reader,
        notifications,
        config.admin_emails.clone(),
    );
    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
