//! Bearer access-token verification and authorization checks.
//!
//! Independent of the login flow: an API caller presents a token, we verify
//! it against the issuer's cached JWKS (signature, issuer, audience, expiry)
//! and then enforce scopes and roles. Any verification failure collapses to
//! `Unauthorized`; the detailed cause only reaches the logs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::{AppState, jwks};

/// `aud` may be a single value or a list, depending on the IdP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Decoded claims of a successfully verified access token. Lives only for
/// the duration of one request's authorization decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedToken {
    pub sub: String,
    pub iss: String,
    #[serde(default)]
    pub aud: Option<Audience>,
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
    /// Space-delimited granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Realm-wide roles. `None` means the claim was absent, which is
    /// distinct from an empty role list.
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
    /// Per-client roles keyed by resource name.
    #[serde(default)]
    pub resource_access: Option<HashMap<String, ClientAccess>>,
}

/// Pull the bearer token out of the `Authorization` header and verify it.
pub async fn authenticate_request(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> Result<VerifiedToken, AuthError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::unauthorized("missing Authorization header"))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::unauthorized("Authorization header must use the Bearer scheme"))?;

    verify(state, token).await
}

/// Validate signature, issuer, audience membership, and expiry.
pub async fn verify(state: &Arc<AppState>, token: &str) -> Result<VerifiedToken, AuthError> {
    verify_inner(state, token)
        .await
        .map_err(|e| AuthError::unauthorized(e.to_string()))
}

async fn verify_inner(state: &Arc<AppState>, token: &str) -> anyhow::Result<VerifiedToken> {
    let header = decode_header(token)?;
    if !matches!(header.alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
        anyhow::bail!("unsupported token algorithm {:?}", header.alg);
    }
    let kid = header
        .kid
        .ok_or_else(|| anyhow::anyhow!("token header has no kid"))?;

    let jwks_url = format!(
        "{}/protocol/openid-connect/certs",
        state.settings.issuer()
    );
    let jwks = jwks::fetch_cached(&state.jwks_cache, &state.http, &jwks_url).await?;
    let jwk = jwks
        .keys
        .iter()
        .find(|k| k.kid == kid)
        .ok_or_else(|| anyhow::anyhow!("no published key matches kid {kid}"))?;

    let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;
    let mut validation = Validation::new(header.alg);
    validation.set_issuer(&[state.settings.issuer()]);
    validation.set_audience(&state.settings.audience_candidates());

    let decoded = decode::<VerifiedToken>(token, &decoding_key, &validation)?;
    Ok(decoded.claims)
}

/// Require every listed scope; a failure names all missing scopes, not just
/// the first.
pub fn require_scope(token: &VerifiedToken, required: &[&str]) -> Result<(), AuthError> {
    let granted: HashSet<&str> = token
        .scope
        .as_deref()
        .unwrap_or("")
        .split_whitespace()
        .collect();
    demand("scope", required, |item| granted.contains(item))
}

/// Require every listed realm-wide role.
pub fn require_realm_role(token: &VerifiedToken, required: &[&str]) -> Result<(), AuthError> {
    let granted = token
        .realm_access
        .as_ref()
        .map(|access| access.roles.as_slice())
        .unwrap_or_default();
    demand("realm role", required, |item| {
        granted.iter().any(|role| role == item)
    })
}

/// Require every listed role on a specific client's role list.
pub fn require_client_role(
    token: &VerifiedToken,
    client: &str,
    required: &[&str],
) -> Result<(), AuthError> {
    let granted = token
        .resource_access
        .as_ref()
        .and_then(|access| access.get(client))
        .map(|access| access.roles.as_slice())
        .unwrap_or_default();
    demand("client role", required, |item| {
        granted.iter().any(|role| role == item)
    })
}

fn demand(
    kind: &'static str,
    required: &[&str],
    granted: impl Fn(&str) -> bool,
) -> Result<(), AuthError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|item| !granted(item))
        .map(|item| item.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Forbidden { kind, missing })
    }
}
