mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use common::{assert_error, TestApp, BROKEN_TOKEN, EXPIRED_TOKEN};

#[tokio::test]
async fn test_auth_creates_user_once() {
    let app = TestApp::new();

    let first = app.sign_in("alice", "Alice").await;
    let second = app.sign_in("alice", "Someone Else").await;
    assert_eq!(first, second, "Signing in twice should not create a second user");

    let user = app.user(first);
    assert_eq!(user.third_party_id, "fb-alice");
    assert_eq!(user.login_type, "facebook");
    assert_eq!(user.name, "Alice");
    assert_eq!(user.distance_radius_km, 10);
    assert!(user.seen_item_ids.is_empty());
    assert_eq!(user.last_active.timestamp(), 0);
}

#[tokio::test]
async fn test_auth_requires_name() {
    let app = TestApp::new();
    let (status, body) = app.post("/user/auth", Some("alice"), json!({})).await;
    assert_error(status, &body, 100);

    let (status, body) = app.post("/user/auth", Some("alice"), json!({ "name": "" })).await;
    assert_error(status, &body, 100);
}

#[tokio::test]
async fn test_register_rejects_existing_account() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/user/register", Some("bob"), json!({ "name": "Bob" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["user_id"].is_i64());

    let (status, body) = app
        .post("/user/register", Some("bob"), json!({ "name": "Bob" }))
        .await;
    assert_error(status, &body, 300);

    let conn = app.db().get().unwrap();
    let accounts: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM users WHERE third_party_id = ?1",
            ["fb-bob"],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(accounts, 1);
}

#[tokio::test]
async fn test_token_errors() {
    let app = TestApp::new();

    let (status, body) = app.post("/user/auth", None, json!({ "name": "A" })).await;
    assert_error(status, &body, 200);

    let (status, body) = app
        .post("/user/auth", Some(EXPIRED_TOKEN), json!({ "name": "A" }))
        .await;
    assert_error(status, &body, 201);

    let (status, body) = app
        .post("/user/auth", Some(BROKEN_TOKEN), json!({ "name": "A" }))
        .await;
    assert_error(status, &body, 200);
    assert_eq!(body["error"]["message"], "provider unavailable");
}

#[tokio::test]
async fn test_error_response_shape() {
    let app = TestApp::new();
    let (status, body) = app.post("/user/auth", Some("a"), json!({ "bogus": 1 })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "status": 400,
            "error": { "status": "MalformedRequest", "error_code": 100 }
        })
    );
}

#[tokio::test]
async fn test_post_requires_json_content_type() {
    let app = TestApp::new();
    let request = Request::post("/user/auth")
        .header("content-type", "text/plain")
        .header("x-auth-token", "alice")
        .body(Body::from(r#"{"name":"Alice"}"#))
        .unwrap();

    let (status, _, body) = app.send(request).await;
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_error(status, &body, 100);
}

#[tokio::test]
async fn test_update_profile() {
    let app = TestApp::new();
    let id = app.sign_in("carol", "Carol").await;

    let (status, body) = app
        .post(
            "/user/update",
            Some("carol"),
            json!({ "distance_radius_km": 50 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body, json!({ "status": 200 }));

    let user = app.user(id);
    assert_eq!(user.distance_radius_km, 50);
    assert_eq!(user.name, "Carol");

    let (status, _) = app
        .post("/user/update", Some("carol"), json!({ "name": "Caroline" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.user(id).name, "Caroline");
    assert_eq!(app.user(id).distance_radius_km, 50);
}

#[tokio::test]
async fn test_update_validates_fields() {
    let app = TestApp::new();
    app.sign_in("carol", "Carol").await;

    for body in [
        json!({ "distance_radius_km": 0 }),
        json!({ "distance_radius_km": 20001 }),
        json!({ "name": "" }),
        json!({ "age": 3 }),
    ] {
        let (status, response) = app.post("/user/update", Some("carol"), body).await;
        assert_error(status, &response, 100);
    }
}

#[tokio::test]
async fn test_unknown_user_is_invalid_user() {
    let app = TestApp::new();
    let (status, body) = app
        .post("/user/update", Some("nobody"), json!({ "name": "X" }))
        .await;
    assert_error(status, &body, 302);
}
