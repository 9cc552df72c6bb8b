use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::Router;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::routes::{ok_empty, with_conn};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/clear_all", post(clear_all))
}

/// Wipe every record, search document and blob.
async fn clear_all(State(state): State<AppState>) -> AppResult<Response> {
    with_conn(&state.db, |conn| Ok(db::clear_all(conn)?)).await?;
    state.search.clear().await.map_err(AppError::Search)?;
    state.blobs.clear().await?;

    tracing::warn!("Cleared all data");
    Ok(ok_empty())
}
