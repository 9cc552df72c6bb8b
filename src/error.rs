use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::blobs::BlobError;
use crate::search::SearchError;

/// The fixed error taxonomy reported to clients as `error.error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedRequest,
    FacebookError,
    FacebookTokenError,
    AccountExists,
    InvalidItem,
    InvalidUser,
    UserPermissionError,
    GenericError,
    UploadFailed,
    IndexingError,
    SearchError,
}

impl ErrorCode {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::MalformedRequest => "MalformedRequest",
            ErrorCode::FacebookError => "FacebookError",
            ErrorCode::FacebookTokenError => "FacebookTokenError",
            ErrorCode::AccountExists => "AccountExists",
            ErrorCode::InvalidItem => "InvalidItem",
            ErrorCode::InvalidUser => "InvalidUser",
            ErrorCode::UserPermissionError => "UserPermissionError",
            ErrorCode::GenericError => "GenericError",
            ErrorCode::UploadFailed => "UploadFailed",
            ErrorCode::IndexingError => "IndexingError",
            ErrorCode::SearchError => "SearchError",
        }
    }

    pub fn code(self) -> u16 {
        match self {
            ErrorCode::MalformedRequest => 100,
            ErrorCode::FacebookError => 200,
            ErrorCode::FacebookTokenError => 201,
            ErrorCode::AccountExists => 300,
            ErrorCode::InvalidItem => 301,
            ErrorCode::InvalidUser => 302,
            ErrorCode::UserPermissionError => 303,
            ErrorCode::GenericError => 900,
            ErrorCode::UploadFailed => 901,
            ErrorCode::IndexingError => 902,
            ErrorCode::SearchError => 903,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Malformed request")]
    MalformedRequest,

    #[error("Facebook token expired")]
    FacebookTokenExpired,

    #[error("Facebook error: {0}")]
    Facebook(String),

    #[error("Account already exists")]
    AccountExists,

    #[error("Invalid item")]
    InvalidItem,

    #[error("Invalid user")]
    InvalidUser,

    #[error("User does not own this item")]
    PermissionDenied,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Indexing error: {0}")]
    Indexing(SearchError),

    #[error("Search error: {0}")]
    Search(SearchError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => AppError::FacebookTokenExpired,
            AuthError::MissingToken => AppError::Facebook("Missing auth token".into()),
            AuthError::Provider(msg) => AppError::Facebook(msg),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("task failed: {}", err))
    }
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::MalformedRequest => ErrorCode::MalformedRequest,
            AppError::FacebookTokenExpired => ErrorCode::FacebookTokenError,
            AppError::Facebook(_) => ErrorCode::FacebookError,
            AppError::AccountExists => ErrorCode::AccountExists,
            AppError::InvalidItem => ErrorCode::InvalidItem,
            AppError::InvalidUser => ErrorCode::InvalidUser,
            AppError::PermissionDenied => ErrorCode::UserPermissionError,
            AppError::UploadFailed(_) => ErrorCode::UploadFailed,
            AppError::Indexing(_) => ErrorCode::IndexingError,
            AppError::Search(_) => ErrorCode::SearchError,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Blob(_)
            | AppError::Json(_)
            | AppError::Internal(_) => ErrorCode::GenericError,
        }
    }

    /// Message surfaced to the client, if any. Infrastructure details stay in the log.
    fn client_message(&self) -> Option<String> {
        match self {
            AppError::Facebook(msg) => Some(msg.clone()),
            AppError::UploadFailed(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {}", e),
            AppError::Pool(e) => tracing::error!("Pool error: {}", e),
            AppError::Blob(e) => tracing::error!("Blob error: {}", e),
            AppError::Json(e) => tracing::error!("JSON error: {}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Indexing(e) => tracing::error!("Indexing error: {}", e),
            AppError::Search(e) => tracing::error!("Search error: {}", e),
            AppError::UploadFailed(msg) => tracing::warn!("Upload failed: {}", msg),
            _ => tracing::debug!("Request rejected: {}", self),
        }

        let code = self.code();
        let mut error = json!({
            "status": code.name(),
            "error_code": code.code(),
        });
        if let Some(message) = self.client_message() {
            error["message"] = json!(message);
        }

        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": StatusCode::BAD_REQUEST.as_u16(),
                "error": error,
            })),
        )
            .into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
