//! Transient flow-state store, carried in a single browser cookie.
//!
//! Pending login/logout attempts park their correlation data (state, nonce,
//! PKCE verifier, return path) here, keyed by the OAuth `state` value. The
//! store is seeded from the request cookie at construction, mutated in
//! memory, and written back at most once via [`StateStore::commit`]. A
//! corrupt or tampered cookie decodes to an empty store rather than an error;
//! the flow then fails downstream when the expected key is absent.

use std::collections::BTreeMap;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;

pub const STATE_COOKIE: &str = "oidc.state";

/// How long a login/logout attempt may remain outstanding.
const STATE_MAX_AGE_SECS: i64 = 600;

/// Outcome of decoding the flow-state cookie. Kept explicit so tests can
/// tell a valid-but-empty store from a failed decode.
#[derive(Debug, PartialEq)]
pub enum DecodeOutcome {
    Decoded(BTreeMap<String, Value>),
    Absent,
}

pub struct StateStore {
    data: BTreeMap<String, Value>,
    dirty: bool,
    secure: bool,
}

impl StateStore {
    pub fn from_jar(jar: &CookieJar, secure: bool) -> Self {
        let raw = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
        let data = match decode_payload(raw.as_deref()) {
            DecodeOutcome::Decoded(map) => map,
            DecodeOutcome::Absent => BTreeMap::new(),
        };
        StateStore {
            data,
            dirty: false,
            secure,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
        self.dirty = true;
    }

    /// Remove and return an entry. Used for one-time consumption of flow
    /// state at callback time: a replayed callback finds nothing.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let existing = self.data.remove(key);
        if existing.is_some() {
            self.dirty = true;
        }
        existing
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Write the store back onto the response jar, but only if something
    /// changed. An empty store deletes the cookie instead of setting an
    /// empty payload.
    pub fn commit(&self, jar: CookieJar) -> CookieJar {
        if !self.dirty {
            return jar;
        }

        if self.data.is_empty() {
            return jar.remove(Cookie::build(STATE_COOKIE).path("/"));
        }

        let cookie = Cookie::build((STATE_COOKIE, encode_payload(&self.data)))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .path("/")
            .max_age(time::Duration::seconds(STATE_MAX_AGE_SECS))
            .build();
        jar.add(cookie)
    }
}

fn encode_payload(data: &BTreeMap<String, Value>) -> String {
    let json = serde_json::to_vec(data).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

pub(crate) fn decode_payload(raw: Option<&str>) -> DecodeOutcome {
    let Some(raw) = raw else {
        return DecodeOutcome::Absent;
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(raw) else {
        return DecodeOutcome::Absent;
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => {
            DecodeOutcome::Decoded(map.into_iter().collect())
        }
        _ => DecodeOutcome::Absent,
    }
}
