//! Session codec: serializes the authenticated session into a set of
//! cookies and back, plus the `GET /api/oidc/session` presence probe.
//!
//! The non-sensitive metadata (token type, expiry, scope, profile) lives in
//! its own cookie so a presence check never has to touch token material. The
//! raw tokens each get their own cookie, set only when the token exists and
//! actively deleted otherwise so nothing stale survives a re-login.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const SESSION_COOKIE: &str = "oidc.session";
pub const ACCESS_TOKEN_COOKIE: &str = "oidc.access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "oidc.refresh_token";
pub const ID_TOKEN_COOKIE: &str = "oidc.id_token";

/// Floor for session cookie lifetimes. A token that is already (almost)
/// expired still gets a cookie that survives long enough to be read once.
const MIN_MAX_AGE_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: String,
    pub expires_at: u64,
    pub scope: Option<String>,
    pub profile: Option<Map<String, Value>>,
}

/// The metadata cookie's JSON shape. Field names stay camelCase on the wire.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMetadata {
    token_type: String,
    expires_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<Map<String, Value>>,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Read the session from the request jar. Absence of the metadata cookie, or
/// a metadata payload that fails to decode, means "no session", never an
/// error. Whatever raw-token cookies are present get merged in.
pub fn read_session(jar: &CookieJar) -> Option<Session> {
    let metadata = decode_metadata(jar.get(SESSION_COOKIE)?.value())?;

    Some(Session {
        access_token: jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()),
        refresh_token: jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()),
        id_token: jar.get(ID_TOKEN_COOKIE).map(|c| c.value().to_string()),
        token_type: metadata.token_type,
        expires_at: metadata.expires_at,
        scope: metadata.scope,
        profile: metadata.profile,
    })
}

/// Write the session onto the response jar, overwriting any previous one.
pub fn write_session(jar: CookieJar, session: &Session, secure: bool) -> CookieJar {
    let max_age = (session.expires_at as i64 - unix_now() as i64).max(MIN_MAX_AGE_SECS);

    let metadata = SessionMetadata {
        token_type: session.token_type.clone(),
        expires_at: session.expires_at,
        scope: session.scope.clone(),
        profile: session.profile.clone(),
    };

    let mut jar = jar.add(hardened(SESSION_COOKIE, encode_metadata(&metadata), secure, max_age));

    for (name, token) in [
        (ACCESS_TOKEN_COOKIE, &session.access_token),
        (REFRESH_TOKEN_COOKIE, &session.refresh_token),
        (ID_TOKEN_COOKIE, &session.id_token),
    ] {
        jar = match token {
            Some(value) => jar.add(hardened(name, value.clone(), secure, max_age)),
            None => jar.remove(Cookie::build(name).path("/")),
        };
    }

    jar
}

/// Delete all four session cookies unconditionally.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    [SESSION_COOKIE, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, ID_TOKEN_COOKIE]
        .into_iter()
        .fold(jar, |jar, name| jar.remove(Cookie::build(name).path("/")))
}

fn hardened(name: &'static str, value: String, secure: bool, max_age: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .build()
}

fn encode_metadata(metadata: &SessionMetadata) -> String {
    let json = serde_json::to_vec(metadata).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

fn decode_metadata(raw: &str) -> Option<SessionMetadata> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Handler for `GET /api/oidc/session`: report whether a session exists,
/// exposing only its non-sensitive metadata.
pub async fn session_info(jar: CookieJar) -> Json<Value> {
    match read_session(&jar) {
        None => Json(json!({ "authenticated": false })),
        Some(session) => {
            let mut body = Map::new();
            body.insert("authenticated".to_string(), json!(true));
            body.insert("expiresAt".to_string(), json!(session.expires_at));
            if let Some(scope) = session.scope {
                body.insert("scope".to_string(), json!(scope));
            }
            if let Some(profile) = session.profile {
                body.insert("profile".to_string(), json!(profile));
            }
            Json(Value::Object(body))
        }
    }
}
