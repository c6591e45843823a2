mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use todo_reminders::api::router;
use todo_reminders::db::DataStore;
use todo_reminders::models::NewTodo;
use todo_reminders::services::NotificationHub;
use todo_reminders::state::AppState;

use common::{Harness, pool_without_priority};

const ADMIN: &str = "root@example.com";
const MEMBER: &str = "a@example.com";

fn app(harness: &Harness) -> Router {
    router(AppState::new(
        harness.dyn_store(),
        harness.todos.clone(),
        harness.users.clone(),
        NotificationHub::new(8),
        vec![ADMIN.to_string()],
    ))
}

async fn send(app: &Router, method: &str, uri: &str, user: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-email", user);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn sign_in(harness: &Harness, app: &Router, email: &str) -> Value {
    let (status, me) = send(app, "GET", "/api/me", email, None).await;
    assert_eq!(status, StatusCode::OK);
    let id = me["id"].as_str().unwrap().to_string();
    harness
        .users
        .clone()
        .wait_for(|s| s.data.iter().any(|u| u.id == id))
        .await
        .unwrap();
    me
}

#[tokio::test]
async fn configured_emails_become_admins_on_first_sign_in() {
    let harness = Harness::migrated().await;
    let app = app(&harness);

    let admin = sign_in(&harness, &app, "Root@Example.com").await;
    let member = sign_in(&harness, &app, MEMBER).await;

    assert_eq!(admin["is_admin"], true);
    assert_eq!(member["is_admin"], false);
}

#[tokio::test]
async fn admin_routes_are_forbidden_to_members() {
    let harness = Harness::migrated().await;
    let app = app(&harness);
    let admin = sign_in(&harness, &app, ADMIN).await;
    sign_in(&harness, &app, MEMBER).await;

    let (status, _) = send(&app, "GET", "/api/admin/users", MEMBER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/admin/users/{}", admin["id"].as_str().unwrap());
    let (status, _) = send(&app, "DELETE", &uri, MEMBER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "POST", "/api/admin/schema/refresh", MEMBER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_cannot_delete_or_demote_themselves() {
    let harness = Harness::migrated().await;
    let app = app(&harness);
    let admin = sign_in(&harness, &app, ADMIN).await;
    let writes = harness.store.writes();

    let uri = format!("/api/admin/users/{}", admin["id"].as_str().unwrap());
    let (status, body) = send(&app, "DELETE", &uri, ADMIN, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "you cannot delete yourself");

    let (status, _) = send(&app, "PATCH", &uri, ADMIN, Some(json!({ "is_admin": false }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(harness.store.writes(), writes);
}

#[tokio::test]
async fn admin_manages_other_users() {
    let harness = Harness::migrated().await;
    let app = app(&harness);
    sign_in(&harness, &app, ADMIN).await;
    let member = sign_in(&harness, &app, MEMBER).await;
    harness.add_todo(NewTodo::new("Buy milk", MEMBER)).await;

    let (status, users) = send(&app, "GET", "/api/admin/users", ADMIN, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let uri = format!("/api/admin/users/{}", member["id"].as_str().unwrap());
    let (status, promoted) = send(&app, "PATCH", &uri, ADMIN, Some(json!({ "is_admin": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["is_admin"], true);

    harness
        .users
        .clone()
        .wait_for(|s| s.data.iter().filter(|u| u.is_admin).count() == 2)
        .await
        .unwrap();
    let (_, stats) = send(&app, "GET", "/api/admin/stats", ADMIN, None).await;
    assert_eq!(stats, json!({ "total_users": 2, "admins": 2, "total_todos": 1 }));

    let (status, _) = send(&app, "DELETE", &uri, ADMIN, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &uri, ADMIN, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleting a user leaves their todos behind.
    assert_eq!(harness.store.list_todos().await.unwrap().len(), 1);
}

#[tokio::test]
async fn users_control_their_own_notification_flag() {
    let harness = Harness::migrated().await;
    let app = app(&harness);
    sign_in(&harness, &app, MEMBER).await;

    let (status, me) = send(
        &app,
        "PATCH",
        "/api/me/notifications",
        MEMBER,
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["notifications_enabled"], false);
}

#[tokio::test]
async fn schema_refresh_makes_new_columns_writable() {
    let pool = pool_without_priority().await;
    let harness = Harness::on(pool.clone()).await;
    let app = app(&harness);
    let high = json!({ "content": "Ship release", "priority": "high" });

    let (status, before) = send(&app, "POST", "/api/todos", ADMIN, Some(high.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(before["priority"], "medium");

    sqlx::query("ALTER TABLE todos ADD COLUMN priority TEXT NOT NULL DEFAULT 'medium'")
        .execute(&pool)
        .await
        .expect("Failed to add priority column");

    let (status, _) = send(&app, "POST", "/api/admin/schema/refresh", ADMIN, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, after) = send(&app, "POST", "/api/todos", ADMIN, Some(high)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(after["priority"], "high");
}
