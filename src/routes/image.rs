use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::json;

use crate::blobs::BlobError;
use crate::db::models::{Image, Item};
use crate::db::{items, uploads};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::{load_item_for_mutation, ok, ok_empty, with_conn};
use crate::state::AppState;

/// How long a minted upload URL stays usable.
const UPLOAD_SESSION_TTL_MINUTES: i64 = 60;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/item/image/upload_url", get(upload_url))
        .route(
            "/item/image/upload/{token}",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/images/{blob_key}", get(serve))
}

fn generate_upload_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// Mint a one-time URL the client posts an image to.
async fn upload_url(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let token = generate_upload_token();
    let now = Utc::now();
    let session = token.clone();
    with_conn(&state.db, move |conn| {
        uploads::create_session(conn, &session, &now)?;
        Ok(())
    })
    .await?;

    tracing::debug!(user_id = user.id, "Minted upload session");
    Ok(ok(json!({ "upload_url": format!("/item/image/upload/{}", token) })))
}

struct UploadForm {
    item_id: Option<String>,
    file: Option<(Bytes, Option<String>)>,
}

async fn read_form(mut multipart: Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm {
        item_id: None,
        file: None,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::UploadFailed(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("item_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::UploadFailed(e.to_string()))?;
                form.item_id = Some(text);
            }
            Some("file") => {
                let content_type = field.content_type().map(str::to_string).or_else(|| {
                    field
                        .file_name()
                        .and_then(|name| mime_guess::from_path(name).first_raw())
                        .map(str::to_string)
                });
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::UploadFailed(e.to_string()))?;
                if !data.is_empty() {
                    form.file = Some((data, content_type));
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Receive an image for an item. The blob is stored before any other check;
/// if the upload is then refused, the blob is removed again.
async fn upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let not_before = Utc::now() - Duration::minutes(UPLOAD_SESSION_TTL_MINUTES);
    let valid = with_conn(&state.db, move |conn| {
        Ok(uploads::consume_session(conn, &token, &not_before)?)
    })
    .await?;
    if !valid {
        return Err(AppError::UploadFailed("Unknown or expired upload URL".into()));
    }

    let multipart = multipart.map_err(|e| AppError::UploadFailed(e.body_text()))?;
    let form = read_form(multipart).await?;
    let Some((data, content_type)) = form.file else {
        return Err(AppError::UploadFailed("No file uploaded".into()));
    };

    let blob_key = state
        .blobs
        .put(data, content_type.as_deref())
        .await
        .map_err(|e| AppError::UploadFailed(e.to_string()))?;

    match attach(&state, &headers, form.item_id, &blob_key).await {
        Ok(item) => {
            tracing::info!(item_id = item.id, blob_key = %blob_key, "Stored item image");
            Ok(ok_empty())
        }
        Err(e) => {
            if let Err(cleanup) = state.blobs.delete(&[blob_key]).await {
                tracing::warn!("Failed to remove rejected upload: {}", cleanup);
            }
            Err(e)
        }
    }
}

async fn attach(
    state: &AppState,
    headers: &HeaderMap,
    item_id: Option<String>,
    blob_key: &str,
) -> AppResult<Item> {
    let item_id: i64 = item_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .ok_or(AppError::MalformedRequest)?;
    let CurrentUser(user) = CurrentUser::load(state, headers).await?;

    let image = Image {
        blob_key: blob_key.to_string(),
        url: state.blobs.serving_url(blob_key),
    };
    with_conn(&state.db, move |conn| {
        let mut item = load_item_for_mutation(conn, item_id, &user)?;
        if !items::add_image(conn, item.id, &image, Item::MAX_IMAGES, &Utc::now())? {
            return Err(AppError::UploadFailed(format!(
                "An item can have at most {} images",
                Item::MAX_IMAGES
            )));
        }
        item.images.push(image);
        Ok(item)
    })
    .await
}

/// Serve a stored image.
async fn serve(
    State(state): State<AppState>,
    Path(blob_key): Path<String>,
) -> Result<Response, StatusCode> {
    let data = state.blobs.get(&blob_key).await.map_err(|e| match e {
        BlobError::NotFound | BlobError::InvalidKey(_) => StatusCode::NOT_FOUND,
        BlobError::Io(e) => {
            tracing::error!("Failed to read blob {}: {}", blob_key, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    let mime = mime_guess::from_path(&blob_key).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.as_ref().to_string())], data).into_response())
}
