use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::auth::AuthError;
use crate::db::models::{User, LOGIN_TYPE_FACEBOOK};
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Header carrying the third-party access token.
pub const AUTH_HEADER: &str = "x-auth-token";

/// Resolve the request's access token to a third-party user id.
pub async fn third_party_id(state: &AppState, headers: &HeaderMap) -> AppResult<String> {
    let token = headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    Ok(state.auth.user_id(token).await?)
}

/// The authenticated user making the request.
///
/// Handlers that take arguments validate them before loading the user, so
/// they call [`CurrentUser::load`] directly instead of using the extractor.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub async fn load(state: &AppState, headers: &HeaderMap) -> AppResult<Self> {
        let third_party_id = third_party_id(state, headers).await?;

        let db = state.db.clone();
        let user = tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            Ok::<_, AppError>(users::find_by_third_party_id(
                &conn,
                LOGIN_TYPE_FACEBOOK,
                &third_party_id,
            )?)
        })
        .await??;

        user.map(CurrentUser).ok_or(AppError::InvalidUser)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        CurrentUser::load(state, &parts.headers).await
    }
}
