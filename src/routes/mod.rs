pub mod admin;
pub mod conversation;
pub mod image;
pub mod item;
pub mod like_state;
pub mod updates;
pub mod user;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::items;
use crate::db::models::{Item, User};
use crate::error::{AppError, AppResult};
use crate::state::{AppState, DbPool};

/// Assemble every endpoint. `/clear_all` is only mounted when enabled in config.
pub fn build(state: AppState) -> Router {
    let mut app = Router::new()
        .merge(user::router())
        .merge(item::router())
        .merge(image::router())
        .merge(like_state::router())
        .merge(conversation::router())
        .merge(updates::router());

    if state.config.admin.enable_clear_all {
        tracing::warn!("/clear_all is enabled; do not run this configuration in production");
        app = app.merge(admin::router());
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Successful response body: `{"status": 200, ...fields}`.
#[derive(Serialize)]
pub struct Success<T: Serialize> {
    status: u16,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
pub struct Empty {}

pub fn ok<T: Serialize>(body: T) -> Response {
    Json(Success {
        status: StatusCode::OK.as_u16(),
        body,
    })
    .into_response()
}

pub fn ok_empty() -> Response {
    ok(Empty {})
}

/// Run blocking database work on the blocking pool.
pub(crate) async fn with_conn<T, F>(db: &DbPool, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        f(&*conn)
    })
    .await?
}

pub(crate) fn load_item(conn: &Connection, item_id: i64) -> AppResult<Item> {
    items::get(conn, item_id)?.ok_or(AppError::InvalidItem)
}

/// Load an item the user is about to modify; only its owner may.
pub(crate) fn load_item_for_mutation(
    conn: &Connection,
    item_id: i64,
    user: &User,
) -> AppResult<Item> {
    let item = load_item(conn, item_id)?;
    if !item.is_owned_by(user) {
        return Err(AppError::PermissionDenied);
    }
    Ok(item)
}
