use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use serde_json::json;

use crate::db::models::LOGIN_TYPE_FACEBOOK;
use crate::db::{is_constraint_violation, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{third_party_id, CurrentUser};
use crate::request::validators::{non_empty, radius_km};
use crate::request::{parse_json, Decoder, Field};
use crate::routes::{ok, ok_empty, with_conn};
use crate::state::AppState;

const REGISTER_FIELDS: &[Field] = &[Field::optional("name", Decoder::Str).validate(non_empty)];

const AUTH_FIELDS: &[Field] = &[Field::required("name", Decoder::Str).validate(non_empty)];

const UPDATE_FIELDS: &[Field] = &[
    Field::optional("name", Decoder::Str).validate(non_empty),
    Field::optional("distance_radius_km", Decoder::Int).validate(radius_km),
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/auth", post(authenticate))
        .route("/user/update", post(update))
}

/// Create an account for a third-party identity that has none yet.
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let args = parse_json(REGISTER_FIELDS, &headers, &body)?;
    let name = args.opt_str("name")?.unwrap_or_default().to_string();
    let third_party_id = third_party_id(&state, &headers).await?;

    let user = with_conn(&state.db, move |conn| {
        if users::find_by_third_party_id(conn, LOGIN_TYPE_FACEBOOK, &third_party_id)?.is_some() {
            return Err(AppError::AccountExists);
        }
        users::insert(conn, LOGIN_TYPE_FACEBOOK, &third_party_id, &name).map_err(|e| {
            if is_constraint_violation(&e) {
                AppError::AccountExists
            } else {
                e.into()
            }
        })
    })
    .await?;

    tracing::info!(user_id = user.id, "Registered user");
    Ok(ok(json!({ "user_id": user.id })))
}

/// Sign in, creating the account on first use.
async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let args = parse_json(AUTH_FIELDS, &headers, &body)?;
    let name = args.str("name")?.to_string();
    let third_party_id = third_party_id(&state, &headers).await?;

    let user = with_conn(&state.db, move |conn| {
        if let Some(user) = users::find_by_third_party_id(conn, LOGIN_TYPE_FACEBOOK, &third_party_id)? {
            return Ok(user);
        }
        match users::insert(conn, LOGIN_TYPE_FACEBOOK, &third_party_id, &name) {
            Ok(user) => {
                tracing::info!(user_id = user.id, "Created user on first sign-in");
                Ok(user)
            }
            // Lost a race with a concurrent sign-in for the same identity.
            Err(e) if is_constraint_violation(&e) => {
                users::find_by_third_party_id(conn, LOGIN_TYPE_FACEBOOK, &third_party_id)?
                    .ok_or(AppError::InvalidUser)
            }
            Err(e) => Err(e.into()),
        }
    })
    .await?;

    Ok(ok(json!({ "user_id": user.id })))
}

async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let args = parse_json(UPDATE_FIELDS, &headers, &body)?;
    let name = args.opt_str("name")?.map(str::to_string);
    let radius = args.opt_i64("distance_radius_km")?;
    let CurrentUser(user) = CurrentUser::load(&state, &headers).await?;

    with_conn(&state.db, move |conn| {
        users::update_profile(
            conn,
            user.id,
            name.as_deref().unwrap_or(&user.name),
            radius.unwrap_or(user.distance_radius_km),
        )?;
        Ok(())
    })
    .await?;

    Ok(ok_empty())
}
