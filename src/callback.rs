//! `GET /api/oidc/callback` — processing of the IdP's authorization
//! response.
//!
//! Looks up and consumes the flow state for the returned `state` parameter,
//! exchanges the code for tokens, and turns the result into session cookies.
//! An IdP-reported error always wins over any usable payload, and no token
//! exchange is attempted for it.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::{CookieJar, Host};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AuthError;
use crate::session::Session;
use crate::state_store::StateStore;
use crate::{AppState, audit, provider, sanitize, session};

/// Fallback lifetime when the IdP reports neither `expires_at` nor
/// `expires_in`.
const DEFAULT_EXPIRY_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[tracing::instrument(skip(state, jar, params))]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Host(host): Host,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let origin = sanitize::request_origin(&state.settings, &host);
    let mut store = StateStore::from_jar(&jar, state.settings.secure_cookies);

    let state_param = params
        .state
        .as_deref()
        .ok_or_else(|| AuthError::flow("missing state parameter"))?;
    let entry = store
        .remove(state_param)
        .ok_or_else(|| AuthError::flow("unknown or already consumed state"))?;

    if let Some(error) = &params.error {
        let message = params
            .error_description
            .clone()
            .unwrap_or_else(|| error.clone());
        audit!("login callback rejected by the IdP: {}", message);
        return Err(AuthError::flow(message));
    }

    let code = params
        .code
        .as_deref()
        .ok_or_else(|| AuthError::flow("missing code parameter"))?;
    let code_verifier = entry
        .get("code_verifier")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::flow("stored flow state is incomplete"))?;

    let metadata = provider::discover(&state)
        .await
        .map_err(|e| AuthError::flow(e.to_string()))?;
    let tokens = provider::exchange_code(
        &state,
        &metadata,
        &state.settings.redirect_uri(&origin),
        code,
        code_verifier,
    )
    .await
    .map_err(|e| AuthError::flow(e.to_string()))?;

    if let Some(error) = tokens.error {
        let message = tokens.error_description.unwrap_or(error);
        audit!("token exchange rejected by the IdP: {}", message);
        return Err(AuthError::flow(message));
    }

    let now = session::unix_now();
    let expires_at = tokens
        .expires_at
        .or_else(|| tokens.expires_in.map(|secs| now + secs))
        .unwrap_or(now + DEFAULT_EXPIRY_SECS);

    let mut profile = None;
    if let Some(id_token) = tokens.id_token.as_deref() {
        let claims = provider::id_token_claims(id_token)
            .ok_or_else(|| AuthError::flow("unreadable ID token"))?;
        if let Some(expected) = entry.get("nonce").and_then(Value::as_str)
            && claims.get("nonce").and_then(Value::as_str) != Some(expected)
        {
            return Err(AuthError::flow("ID token nonce does not match this flow"));
        }
        profile = Some(claims);
    }

    let return_to = entry
        .get("return_to")
        .and_then(Value::as_str)
        .unwrap_or("/")
        .to_string();

    let new_session = Session {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        id_token: tokens.id_token,
        token_type: tokens.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires_at,
        scope: tokens.scope,
        profile,
    };

    audit!("login completed, session expires at {}", expires_at);

    let jar = store.commit(jar);
    let jar = session::write_session(jar, &new_session, state.settings.secure_cookies);
    Ok((jar, Redirect::to(&return_to)))
}
