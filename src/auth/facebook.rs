use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{AuthError, AuthProvider};

/// Graph API error code for an invalid OAuth access token.
const OAUTH_INVALID_TOKEN: i64 = 190;
/// Subcode Facebook uses when the token is merely expired.
const OAUTH_TOKEN_EXPIRED: i64 = 463;

/// Verifies access tokens against the Facebook Graph `/me` endpoint.
pub struct FacebookAuth {
    client: reqwest::Client,
    graph_url: String,
}

impl FacebookAuth {
    pub fn new(graph_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            graph_url: graph_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct MeResponse {
    id: String,
}

#[derive(Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    error_subcode: i64,
}

#[async_trait]
impl AuthProvider for FacebookAuth {
    async fn user_id(&self, access_token: &str) -> Result<String, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let response = self
            .client
            .get(&self.graph_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        interpret_graph_response(status, &body)
    }
}

/// Map a Graph `/me` response to a user id or an auth error.
fn interpret_graph_response(status: StatusCode, body: &str) -> Result<String, AuthError> {
    if status == StatusCode::OK {
        return serde_json::from_str::<MeResponse>(body)
            .map(|me| me.id)
            .map_err(|_| AuthError::Provider(body.to_string()));
    }

    if status == StatusCode::BAD_REQUEST {
        if let Ok(GraphErrorBody { error }) = serde_json::from_str::<GraphErrorBody>(body) {
            if error.kind == "OAuthException"
                && error.code == OAUTH_INVALID_TOKEN
                && error.error_subcode == OAUTH_TOKEN_EXPIRED
            {
                return Err(AuthError::TokenExpired);
            }
        }
    }

    Err(AuthError::Provider(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_yields_id() {
        let id = interpret_graph_response(StatusCode::OK, r#"{"id":"1234","name":"A"}"#).unwrap();
        assert_eq!(id, "1234");
    }

    #[test]
    fn expired_token_is_distinguished() {
        let body = r#"{"error":{"message":"expired","type":"OAuthException","code":190,"error_subcode":463}}"#;
        assert!(matches!(
            interpret_graph_response(StatusCode::BAD_REQUEST, body),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn other_oauth_errors_are_provider_errors() {
        let body = r#"{"error":{"message":"bad","type":"OAuthException","code":190,"error_subcode":460}}"#;
        assert!(matches!(
            interpret_graph_response(StatusCode::BAD_REQUEST, body),
            Err(AuthError::Provider(_))
        ));
    }

    #[test]
    fn server_errors_carry_the_body() {
        match interpret_graph_response(StatusCode::INTERNAL_SERVER_ERROR, "oops") {
            Err(AuthError::Provider(msg)) => assert_eq!(msg, "oops"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn ok_without_id_is_an_error() {
        assert!(interpret_graph_response(StatusCode::OK, "{}").is_err());
    }

    #[tokio::test]
    async fn empty_token_is_rejected_without_a_request() {
        let auth = FacebookAuth::new("http://127.0.0.1:9/me");
        assert!(matches!(
            auth.user_id("").await,
            Err(AuthError::MissingToken)
        ));
    }
}
