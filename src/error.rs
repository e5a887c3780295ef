//! Error taxonomy for the authentication boundary.
//!
//! Every failure a request can hit maps onto one of these variants, and each
//! variant carries a fixed HTTP status. Cookie decode failures are deliberately
//! not represented here: they degrade to "absent" and surface later as
//! whichever variant the missing data causes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Login/logout-start could not construct an authorization or
    /// end-session request (discovery failure, malformed settings).
    #[error("{0}")]
    Start(String),

    /// The IdP reported an error on a callback, or the flow state for the
    /// returned `state` parameter was missing or already consumed.
    #[error("{0}")]
    Flow(String),

    /// Missing, malformed, or invalid bearer credentials. The detail is
    /// logged server-side; callers only ever see a generic message.
    #[error("{0}")]
    Unauthorized(String),

    /// Valid token, insufficient grants. Enumerates every missing item so
    /// the caller knows the full gap, not just the first one.
    #[error("missing required {kind}: {}", missing.join(", "))]
    Forbidden {
        kind: &'static str,
        missing: Vec<String>,
    },
}

impl AuthError {
    pub fn start(msg: impl Into<String>) -> Self {
        AuthError::Start(msg.into())
    }

    pub fn flow(msg: impl Into<String>) -> Self {
        AuthError::Flow(msg.into())
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        AuthError::Unauthorized(detail.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::Start(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AuthError::Flow(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AuthError::Unauthorized(detail) => {
                tracing::warn!(cause = %detail, "rejected bearer credentials");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AuthError::Forbidden { .. } => (StatusCode::FORBIDDEN, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_message_enumerates_all_missing_items() {
        let err = AuthError::Forbidden {
            kind: "scope",
            missing: vec!["profile.read".to_string(), "email".to_string()],
        };
        assert_eq!(err.to_string(), "missing required scope: profile.read, email");
    }

    #[tokio::test]
    async fn unauthorized_response_hides_the_detail() {
        let response = AuthError::unauthorized("kid not found in JWKS").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn flow_error_is_a_bad_request() {
        let response = AuthError::flow("state mismatch").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
