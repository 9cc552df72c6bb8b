use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::db::models::{Item, User};
use crate::db::{conversations, items, like_states, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::request::validators::{latitude, longitude, non_negative};
use crate::request::{parse_json, parse_query, Decoder, Field};
use crate::routes::{load_item_for_mutation, ok, ok_empty, with_conn};
use crate::search::{Cursor, GeoPoint, ItemDocument, SearchHit, SearchQuery};
use crate::state::AppState;
use crate::tasks::TaskSet;

const POST_FIELDS: &[Field] = &[
    Field::required("title", Decoder::Str),
    Field::required("description", Decoder::Str),
    Field::required("price", Decoder::Float).validate(non_negative),
    Field::required("currency", Decoder::Str),
    Field::required("category", Decoder::Str),
    Field::required("lat", Decoder::Float).validate(latitude),
    Field::required("lng", Decoder::Float).validate(longitude),
];

const DELETE_FIELDS: &[Field] = &[Field::required("item_id", Decoder::Int)];

const LIST_FIELDS: &[Field] = &[
    Field::required("lat", Decoder::Float).validate(latitude),
    Field::required("lng", Decoder::Float).validate(longitude),
    Field::optional("category", Decoder::Str),
    Field::optional("search_query", Decoder::Str),
    Field::optional("cursor", Decoder::Str),
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/item/post", post(post_item))
        .route("/item/delete", post(delete_item))
        .route("/item/list", get(list_items))
}

async fn post_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let args = parse_json(POST_FIELDS, &headers, &body)?;
    let CurrentUser(user) = CurrentUser::load(&state, &headers).await?;

    let now = Utc::now();
    let user_id = user.id;
    let item = with_conn(&state.db, move |conn| Ok(items::insert(conn, user_id, &now)?)).await?;

    let document = ItemDocument {
        doc_id: item.id,
        user_id: user.id,
        category: args.str("category")?.to_string(),
        title: args.str("title")?.to_string(),
        description: args.str("description")?.to_string(),
        price: args.f64("price")?,
        currency: args.str("currency")?.to_string(),
        location: GeoPoint::new(args.f64("lat")?, args.f64("lng")?),
    };

    if let Err(e) = state.search.put(document).await {
        let item_id = item.id;
        if let Err(cleanup) =
            with_conn(&state.db, move |conn| Ok(items::delete(conn, item_id)?)).await
        {
            tracing::error!(item_id, "Failed to remove unindexed item: {}", cleanup);
        }
        return Err(AppError::Indexing(e));
    }

    tracing::info!(item_id = item.id, user_id = user.id, "Posted item");
    Ok(ok(json!({ "item_id": item.id })))
}

/// Delete an item together with everything that refers to it.
async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let args = parse_json(DELETE_FIELDS, &headers, &body)?;
    let item_id = args.i64("item_id")?;
    let CurrentUser(user) = CurrentUser::load(&state, &headers).await?;

    let owner = user.clone();
    let (item, conversation_ids) = with_conn(&state.db, move |conn| {
        let item = load_item_for_mutation(conn, item_id, &owner)?;
        let conversation_ids = conversations::ids_for_item(conn, item.id)?;
        Ok((item, conversation_ids))
    })
    .await?;

    let mut tasks = state.tasks();

    let db = state.db.clone();
    tasks.detach_blocking("delete_like_states", move || {
        let conn = db.get()?;
        let removed = like_states::delete_for_item(&conn, item_id)?;
        tracing::debug!(item_id, removed, "Deleted like states");
        Ok(())
    });

    let db = state.db.clone();
    let ids = conversation_ids.clone();
    tasks.detach_blocking("delete_conversations", move || {
        let conn = db.get()?;
        conversations::delete_many(&conn, &ids)?;
        Ok(())
    });

    scrub_user_lists(&state, &mut tasks, &user, item_id, conversation_ids).await?;

    let blobs = state.blobs.clone();
    let keys: Vec<String> = item.images.iter().map(|i| i.blob_key.clone()).collect();
    tasks.detach("delete_images", async move {
        for key in &keys {
            blobs.delete_serving_url(key).await?;
        }
        blobs.delete(&keys).await?;
        Ok(())
    });

    let search = state.search.clone();
    tasks.join("delete_search_document", async move {
        search.delete(item_id).await?;
        Ok(())
    });

    let db = state.db.clone();
    tasks.join_blocking("delete_item", move || {
        let conn = db.get()?;
        items::delete(&conn, item_id)?;
        Ok(())
    });

    let report = tasks.finish().await;
    if let Some(e) = report.failure("delete_search_document") {
        tracing::error!(item_id, "Index delete failed: {:#}", e);
    }
    if let Some(e) = report.failure("delete_item") {
        return Err(AppError::Internal(format!("item delete failed: {:#}", e)));
    }

    tracing::info!(item_id, user_id = user.id, "Deleted item");
    Ok(ok_empty())
}

/// Drop a deleted item from every seen list and its conversations from every
/// ongoing list. Pages of user ids are read here; each page is scrubbed in the
/// background with a single statement.
async fn scrub_user_lists(
    state: &AppState,
    tasks: &mut TaskSet,
    owner: &User,
    item_id: i64,
    conversation_ids: Vec<i64>,
) -> AppResult<()> {
    let page_size = state.config.listing.users_per_page;
    let mut after_id = 0;
    let mut owner_scrubbed = false;

    loop {
        let page = with_conn(&state.db, move |conn| {
            Ok(users::page_seeing_item(conn, item_id, after_id, page_size)?)
        })
        .await?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = last.id;
        let full_page = page.len() == page_size;
        let user_ids: Vec<i64> = page.iter().map(|u| u.id).collect();
        owner_scrubbed |= user_ids.contains(&owner.id);

        let db = state.db.clone();
        let conversation_ids = conversation_ids.clone();
        tasks.detach_blocking("scrub_seen_lists", move || {
            let conn = db.get()?;
            users::scrub_lists(&conn, &user_ids, item_id, &conversation_ids)?;
            Ok(())
        });

        if !full_page {
            break;
        }
    }

    // The seller never marks their own item as seen, so their ongoing list
    // is not covered by the scan above.
    if !owner_scrubbed && owner.ongoing_conversations.iter().any(|c| conversation_ids.contains(c)) {
        let db = state.db.clone();
        let owner_id = owner.id;
        tasks.detach_blocking("scrub_owner_conversations", move || {
            let conn = db.get()?;
            users::scrub_lists(&conn, &[owner_id], item_id, &conversation_ids)?;
            Ok(())
        });
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ListedItem {
    item_id: String,
    date_time_added: String,
    date_time_modified: String,
    title: String,
    category: String,
    description: String,
    price: f64,
    currency: String,
    image: Vec<String>,
    lat: f64,
    lng: f64,
}

impl ListedItem {
    fn new(document: ItemDocument, item: &Item) -> Self {
        Self {
            item_id: document.doc_id.to_string(),
            date_time_added: item.create_date.to_rfc3339(),
            date_time_modified: item.modify_date.to_rfc3339(),
            title: document.title,
            category: document.category,
            description: document.description,
            price: document.price,
            currency: document.currency,
            image: item.images.iter().map(|i| i.url.clone()).collect(),
            lat: document.location.lat,
            lng: document.location.lng,
        }
    }
}

#[derive(Serialize)]
struct ListResponse {
    results: Vec<ListedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
}

/// Nearby items the caller has not seen yet, a few at a time.
async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> AppResult<Response> {
    let args = parse_query(LIST_FIELDS, uri.query())?;
    let cursor = args
        .opt_str("cursor")?
        .map(Cursor::parse)
        .transpose()
        .map_err(|_| AppError::MalformedRequest)?;
    let CurrentUser(user) = CurrentUser::load(&state, &headers).await?;

    let query = SearchQuery::new(
        GeoPoint::new(args.f64("lat")?, args.f64("lng")?),
        user.distance_radius_km,
    )
    .excluding_user(user.id)
    .in_category(args.opt_str("category")?.map(str::to_string))
    .with_terms(args.opt_str("search_query")?);

    let wanted = state.config.listing.items_per_request;
    let page_size = state.config.listing.items_per_page;

    let mut results = Vec::new();
    let mut next = cursor;
    let mut first_page = true;

    'pages: while results.len() < wanted && (first_page || next.is_some()) {
        first_page = false;
        let page = state
            .search
            .search(&query, next, page_size)
            .await
            .map_err(AppError::Search)?;
        next = page.cursor;

        let unseen: Vec<SearchHit> = page
            .results
            .into_iter()
            .filter(|hit| !user.has_seen(hit.document.doc_id))
            .collect();
        let mut found = load_items(&state, &unseen).await?;

        let total = unseen.len();
        for (index, hit) in unseen.into_iter().enumerate() {
            // Documents can briefly outlive their item during a delete.
            let Some(item) = found.remove(&hit.document.doc_id) else {
                continue;
            };
            let resume = hit.cursor;
            results.push(ListedItem::new(hit.document, &item));
            if results.len() == wanted {
                next = if index + 1 < total || page.cursor.is_some() {
                    Some(resume)
                } else {
                    None
                };
                break 'pages;
            }
        }
    }

    Ok(ok(ListResponse {
        results,
        cursor: next.map(|c| c.to_string()),
    }))
}

async fn load_items(state: &AppState, hits: &[SearchHit]) -> AppResult<HashMap<i64, Item>> {
    let ids: Vec<i64> = hits.iter().map(|h| h.document.doc_id).collect();
    with_conn(&state.db, move |conn| {
        let mut found = HashMap::new();
        for id in ids {
            if let Some(item) = items::get(conn, id)? {
                found.insert(id, item);
            }
        }
        Ok(found)
    })
    .await
}
