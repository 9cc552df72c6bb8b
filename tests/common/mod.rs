#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use instabuy::auth::{AuthError, AuthProvider};
use instabuy::blobs::FsBlobStore;
use instabuy::config::Config;
use instabuy::db;
use instabuy::extractors::AUTH_HEADER;
use instabuy::routes;
use instabuy::search::SqliteSearchIndex;
use instabuy::state::{AppState, DbPool};

/// Token that the fake provider reports as expired.
pub const EXPIRED_TOKEN: &str = "expired";
/// Token for which the fake provider fails.
pub const BROKEN_TOKEN: &str = "broken";

/// Accepts any token and maps it to `fb-<token>`.
struct FakeAuth;

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn user_id(&self, access_token: &str) -> Result<String, AuthError> {
        match access_token {
            EXPIRED_TOKEN => Err(AuthError::TokenExpired),
            BROKEN_TOKEN => Err(AuthError::Provider("provider unavailable".into())),
            token => Ok(format!("fb-{}", token)),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub tmp: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.resolve_paths(tmp.path());
        // Let cascades finish before the response so tests can observe them.
        config.tasks.join_detached = true;
        customize(&mut config);

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let state = AppState {
            db: pool.clone(),
            config: config.clone(),
            auth: Arc::new(FakeAuth),
            blobs: Arc::new(FsBlobStore::new(config.blobs_path()).unwrap()),
            search: Arc::new(SqliteSearchIndex::new(pool)),
        };
        let router = routes::build(state.clone());

        Self { router, state, tmp }
    }

    pub fn db(&self) -> &DbPool {
        &self.state.db
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = Request::post(path).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(AUTH_HEADER, token);
        }
        self.send_json(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, path_and_query: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::get(path_and_query);
        if let Some(token) = token {
            request = request.header(AUTH_HEADER, token);
        }
        self.send_json(request.body(Body::empty()).unwrap()).await
    }

    /// Sign in (creating the account) and return the user id.
    pub async fn sign_in(&self, token: &str, name: &str) -> i64 {
        let (status, body) = self
            .post("/user/auth", Some(token), serde_json::json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::OK, "sign in failed: {}", body);
        body["user_id"].as_i64().unwrap()
    }

    pub async fn post_item_at(&self, token: &str, title: &str, lat: f64, lng: f64) -> i64 {
        let (status, body) = self
            .post(
                "/item/post",
                Some(token),
                serde_json::json!({
                    "title": title,
                    "description": format!("A fine {}", title.to_lowercase()),
                    "price": 25.5,
                    "currency": "USD",
                    "category": "misc",
                    "lat": lat,
                    "lng": lng,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "post item failed: {}", body);
        body["item_id"].as_i64().unwrap()
    }

    pub async fn post_item(&self, token: &str, title: &str) -> i64 {
        self.post_item_at(token, title, 0.0, 0.0).await
    }

    pub async fn like(&self, token: &str, item_id: i64, like_state: i64) -> (StatusCode, Value) {
        self.post(
            "/item/like",
            Some(token),
            serde_json::json!({ "item_id": item_id, "like_state": like_state }),
        )
        .await
    }

    pub async fn chat(
        &self,
        token: &str,
        item_id: i64,
        receiver_id: i64,
        message: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/chat/post",
            Some(token),
            serde_json::json!({
                "item_id": item_id,
                "receiver_id": receiver_id,
                "message": message,
            }),
        )
        .await
    }

    pub fn user(&self, id: i64) -> instabuy::db::models::User {
        let conn = self.db().get().unwrap();
        db::users::get(&conn, id).unwrap().unwrap()
    }
}

/// The numeric `error.error_code` of an error response.
pub fn error_code(body: &Value) -> i64 {
    body["error"]["error_code"]
        .as_i64()
        .unwrap_or_else(|| panic!("not an error response: {}", body))
}

/// Assert an error response with the given code.
pub fn assert_error(status: StatusCode, body: &Value, code: i64) {
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected body: {}", body);
    assert_eq!(body["status"], 400);
    assert_eq!(error_code(body), code, "unexpected body: {}", body);
}
