//! `GET /api/oidc/logout` and `GET /api/oidc/logout/callback` — RP-initiated
//! logout.
//!
//! Logout is optimistic: the local session cookies are dropped before the
//! IdP confirms anything, because the user's intent is unambiguous and
//! keeping stale credentials alive while waiting buys nothing. If the
//! browser never follows the redirect, the IdP session may outlive ours.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::{CookieJar, Host};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AuthError;
use crate::state_store::StateStore;
use crate::{AppState, audit, provider, sanitize, session};

#[derive(Debug, Deserialize)]
pub struct LogoutParams {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

#[tracing::instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Host(host): Host,
    Query(params): Query<LogoutParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let origin = sanitize::request_origin(&state.settings, &host);
    let return_to = sanitize::sanitize_return_to(&origin, params.return_to.as_deref());
    let current = session::read_session(&jar);

    let metadata = provider::discover(&state)
        .await
        .map_err(|e| AuthError::start(e.to_string()))?;
    let request = provider::build_end_session_request(
        &metadata,
        &state.settings,
        &state.settings.post_logout_redirect_uri(&origin),
        current.as_ref().and_then(|s| s.id_token.as_deref()),
    )
    .map_err(|e| AuthError::start(e.to_string()))?;

    let mut store = StateStore::from_jar(&jar, state.settings.secure_cookies);
    store.set(
        request.state.clone(),
        json!({
            "return_to": return_to,
            "created": session::unix_now(),
        }),
    );

    audit!("logout flow started, returning to {}", return_to);

    let jar = store.commit(jar);
    let jar = session::clear_session(jar);
    Ok((jar, Redirect::to(&request.url)))
}

#[derive(Debug, Deserialize)]
pub struct LogoutCallbackParams {
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[tracing::instrument(skip(state, jar, params))]
pub async fn logout_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogoutCallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let mut store = StateStore::from_jar(&jar, state.settings.secure_cookies);
    let entry = match params.state.as_deref() {
        // A response that names a state must match a pending flow; only a
        // truly absent state falls back to the default return path.
        Some(s) => Some(
            store
                .remove(s)
                .ok_or_else(|| AuthError::flow("unknown or already consumed state"))?,
        ),
        None => None,
    };

    if let Some(error) = &params.error {
        let message = params
            .error_description
            .clone()
            .unwrap_or_else(|| error.clone());
        return Err(AuthError::flow(message));
    }

    let return_to = entry
        .as_ref()
        .and_then(|e| e.get("return_to"))
        .and_then(Value::as_str)
        .unwrap_or("/")
        .to_string();

    audit!("logout completed, returning to {}", return_to);

    Ok((store.commit(jar), Redirect::to(&return_to)))
}
