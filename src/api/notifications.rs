use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::{Stream, StreamExt};

use crate::api::auth::CurrentUser;
use crate::state::AppState;

/// Server-sent stream of the caller's reminder notifications.
pub async fn stream(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state
        .notifications
        .subscribe(&user.email)
        .into_stream()
        .filter_map(|notification| {
            Event::default()
                .event("reminder")
                .json_data(&notification)
                .ok()
                .map(Ok)
        });

    Sse::new(events).keep_alive(KeepAlive::default())
}
