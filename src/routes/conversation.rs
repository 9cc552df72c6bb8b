use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use chrono::Utc;

use crate::db::models::NewMessage;
use crate::db::{conversations, like_states, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::request::validators::non_empty;
use crate::request::{parse_json, Decoder, Field};
use crate::routes::{load_item, ok_empty, with_conn};
use crate::state::AppState;

const FIELDS: &[Field] = &[
    Field::required("item_id", Decoder::Int),
    Field::required("receiver_id", Decoder::Int),
    Field::required("message", Decoder::Str).validate(non_empty),
];

pub fn router() -> Router<AppState> {
    Router::new().route("/chat/post", post(post_message))
}

/// Send a message about an item between its seller and one buyer.
///
/// Only a buyer can open a conversation, and only about an item they have
/// seen and liked. After that, either side may post.
async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let args = parse_json(FIELDS, &headers, &body)?;
    let item_id = args.i64("item_id")?;
    let receiver_id = args.i64("receiver_id")?;
    let text = args.str("message")?.to_string();
    let CurrentUser(sender) = CurrentUser::load(&state, &headers).await?;

    with_conn(&state.db, move |conn| {
        let item = load_item(conn, item_id)?;
        let seller_id = item.user_id;

        let buyer_id = if sender.id == seller_id {
            receiver_id
        } else {
            if receiver_id != seller_id {
                return Err(AppError::InvalidUser);
            }
            sender.id
        };

        let conversation = match conversations::find(conn, item.id, buyer_id)? {
            Some(conversation) => conversation,
            None => {
                if buyer_id != sender.id {
                    return Err(AppError::MalformedRequest);
                }
                if !sender.has_seen(item.id) {
                    return Err(AppError::InvalidItem);
                }
                let liked = like_states::find(conn, sender.id, item.id)?
                    .map(|s| s.like_state)
                    .unwrap_or(false);
                if !liked {
                    return Err(AppError::InvalidItem);
                }

                let (conversation, created) =
                    conversations::create_or_get(conn, item.id, buyer_id, &Utc::now())?;
                if created {
                    users::append_ongoing_conversation(conn, buyer_id, conversation.id)?;
                    users::append_ongoing_conversation(conn, seller_id, conversation.id)?;
                    tracing::info!(
                        conversation_id = conversation.id,
                        item_id = item.id,
                        buyer_id,
                        "Opened conversation"
                    );
                }
                conversation
            }
        };

        conversations::append_message(
            conn,
            conversation.id,
            &NewMessage {
                user_id: sender.id,
                user_name: sender.name.clone(),
                message: text,
            },
        )?;
        Ok(())
    })
    .await?;

    Ok(ok_empty())
}
