//! `GET /api/profile` — the protected resource.
//!
//! Authorization runs in a fixed order: bearer extraction, token
//! verification, scope check, realm-role check. The first two fail with 401,
//! the last two with 403 naming everything that is missing.

use std::sync::Arc;

use axum::Json;
use axum::http::{HeaderMap, header};
use axum::response::IntoResponse;
use axum::extract::State;
use serde_json::json;

use crate::error::AuthError;
use crate::{AppState, audit, verifier};

const REQUIRED_SCOPES: &[&str] = &["profile.read"];
const REQUIRED_REALM_ROLES: &[&str] = &["api_user"];

#[tracing::instrument(skip(state, headers))]
pub async fn profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let token = verifier::authenticate_request(&state, &headers).await?;
    verifier::require_scope(&token, REQUIRED_SCOPES)?;
    verifier::require_realm_role(&token, REQUIRED_REALM_ROLES)?;

    audit!("served profile for subject {}", token.sub);

    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({
            "sub": token.sub,
            "email": token.email,
            "preferred_username": token.preferred_username,
            "scope": token.scope,
            "iat": token.iat,
            "exp": token.exp,
        })),
    ))
}
