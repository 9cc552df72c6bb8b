use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::Message;
use crate::db::{conversations, items, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::request::validators::all_integers;
use crate::request::{parse_query, Decoder, Field};
use crate::routes::{ok, with_conn};
use crate::state::AppState;

const FIELDS: &[Field] = &[Field::optional("item_ids", Decoder::List).validate(all_integers)];

pub fn router() -> Router<AppState> {
    Router::new().route("/updates", get(list_updates))
}

#[derive(Debug, Serialize)]
struct MessageUpdate {
    user_name: String,
    message: String,
    item_id: i64,
    date_sent: String,
    /// Seconds since the Unix epoch.
    timestamp: f64,
}

impl MessageUpdate {
    fn new(message: Message, item_id: i64) -> Self {
        Self {
            date_sent: format_date_sent(&message.create_date),
            timestamp: message.create_date.timestamp_micros() as f64 / 1_000_000.0,
            user_name: message.user_name,
            message: message.message,
            item_id,
        }
    }
}

fn format_date_sent(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[derive(Serialize)]
struct UpdatesResponse {
    messages: Vec<MessageUpdate>,
    deleted: Vec<i64>,
}

/// New messages since the caller's last poll, plus which of the given items
/// no longer exist.
async fn list_updates(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> AppResult<Response> {
    // Taken before reading anything so no message falls between two polls.
    let now = Utc::now();

    let args = parse_query(FIELDS, uri.query())?;
    let item_ids: Vec<i64> = args
        .opt_list("item_ids")?
        .unwrap_or_default()
        .iter()
        .map(|id| id.trim().parse().map_err(|_| AppError::MalformedRequest))
        .collect::<AppResult<_>>()?;
    if item_ids.len() >= state.config.listing.max_update_item_ids {
        return Err(AppError::MalformedRequest);
    }
    let CurrentUser(user) = CurrentUser::load(&state, &headers).await?;

    if !item_ids.iter().all(|id| user.has_seen(*id)) {
        return Err(AppError::InvalidItem);
    }

    let response = with_conn(&state.db, move |conn| {
        let mut messages = Vec::new();
        for conversation_id in &user.ongoing_conversations {
            let Some(conversation) = conversations::get(conn, *conversation_id)? else {
                continue;
            };
            if conversation.last_activity_date <= user.last_active {
                continue;
            }
            for message in conversations::messages_after(conn, conversation.id, &user.last_active)? {
                messages.push(MessageUpdate::new(message, conversation.item_id));
            }
        }

        let live = items::live_ids(conn, &item_ids)?;
        let deleted = item_ids.into_iter().filter(|id| !live.contains(id)).collect();

        users::set_last_active(conn, user.id, &now)?;
        Ok(UpdatesResponse { messages, deleted })
    })
    .await?;

    Ok(ok(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_sent_has_microseconds() {
        let at = Utc.with_ymd_and_hms(2015, 3, 1, 12, 30, 5).unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(format_date_sent(&at), "2015-03-01 12:30:05.000042");
    }

    #[test]
    fn timestamp_is_fractional_seconds() {
        let message = Message {
            id: 1,
            conversation_id: 1,
            user_id: 1,
            user_name: "a".into(),
            message: "hi".into(),
            create_date: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(1500),
        };
        let update = MessageUpdate::new(message, 9);
        assert_eq!(update.timestamp, 1.5);
        assert_eq!(update.item_id, 9);
    }
}
