pub mod facebook;

use async_trait::async_trait;
use std::sync::Arc;

pub use facebook::FacebookAuth;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("access token expired")]
    TokenExpired,

    #[error("missing access token")]
    MissingToken,

    #[error("provider error: {0}")]
    Provider(String),
}

/// Resolves a third-party access token to that provider's user id.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn user_id(&self, access_token: &str) -> Result<String, AuthError>;
}

pub type DynAuthProvider = Arc<dyn AuthProvider>;
