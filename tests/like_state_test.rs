mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{assert_error, TestApp};
use instabuy::db::like_states;

#[tokio::test]
async fn test_like_marks_item_seen_once() {
    let app = TestApp::new();
    app.sign_in("seller", "Sam").await;
    let buyer = app.sign_in("buyer", "Bea").await;
    let item_id = app.post_item("seller", "Bike").await;

    let (status, body) = app.like("buyer", item_id, 1).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body, json!({ "status": 200 }));

    // Changing one's mind overwrites the flag without re-marking the item.
    let (status, _) = app.like("buyer", item_id, 0).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.like("buyer", item_id, 1).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.user(buyer).seen_item_ids, vec![item_id]);

    let conn = app.db().get().unwrap();
    let state = like_states::find(&conn, buyer, item_id).unwrap().unwrap();
    assert!(state.like_state);
    assert_eq!(like_states::count_for_item(&conn, item_id).unwrap(), 1);
}

#[tokio::test]
async fn test_dislike_is_recorded() {
    let app = TestApp::new();
    app.sign_in("seller", "Sam").await;
    let buyer = app.sign_in("buyer", "Bea").await;
    let item_id = app.post_item("seller", "Bike").await;

    app.like("buyer", item_id, 0).await;

    let conn = app.db().get().unwrap();
    let state = like_states::find(&conn, buyer, item_id).unwrap().unwrap();
    assert!(!state.like_state);
    assert!(app.user(buyer).has_seen(item_id));
}

#[tokio::test]
async fn test_like_rejects_bad_input() {
    let app = TestApp::new();
    app.sign_in("seller", "Sam").await;
    app.sign_in("buyer", "Bea").await;
    let item_id = app.post_item("seller", "Bike").await;

    let (status, body) = app.like("buyer", item_id, 2).await;
    assert_error(status, &body, 100);

    let (status, body) = app
        .post("/item/like", Some("buyer"), json!({ "item_id": item_id }))
        .await;
    assert_error(status, &body, 100);

    let (status, body) = app.like("buyer", item_id + 1000, 1).await;
    assert_error(status, &body, 301);

    let (status, body) = app.like("stranger", item_id, 1).await;
    assert_error(status, &body, 302);
}
