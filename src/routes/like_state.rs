use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;
use axum::Router;

use crate::db::{is_constraint_violation, like_states, users};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::request::validators::boolean_flag;
use crate::request::{parse_json, Decoder, Field};
use crate::routes::{load_item, ok_empty, with_conn};
use crate::state::AppState;

const FIELDS: &[Field] = &[
    Field::required("item_id", Decoder::Int),
    Field::required("like_state", Decoder::Int).validate(boolean_flag),
];

pub fn router() -> Router<AppState> {
    Router::new().route("/item/like", post(update_like_state))
}

/// Record that the caller likes (1) or passes on (0) an item.
async fn update_like_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let args = parse_json(FIELDS, &headers, &body)?;
    let item_id = args.i64("item_id")?;
    let liked = args.i64("like_state")? == 1;
    let CurrentUser(user) = CurrentUser::load(&state, &headers).await?;

    with_conn(&state.db, move |conn| {
        let item = load_item(conn, item_id)?;

        if let Some(existing) = like_states::find(conn, user.id, item.id)? {
            like_states::set_state(conn, existing.id, liked)?;
            return Ok(());
        }

        match like_states::insert(conn, user.id, item.id, liked) {
            Ok(_) => {
                if !user.has_seen(item.id) {
                    users::append_seen_item(conn, user.id, item.id)?;
                }
            }
            // A concurrent request recorded the pair first; it also marked the item seen.
            Err(e) if is_constraint_violation(&e) => {
                if let Some(existing) = like_states::find(conn, user.id, item.id)? {
                    like_states::set_state(conn, existing.id, liked)?;
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    })
    .await?;

    Ok(ok_empty())
}
