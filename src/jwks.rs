//! JWKS model and cached retrieval.
//!
//! The identity provider's published signing keys, fetched from its
//! per-issuer endpoint and held in a TTL cache so request handlers never
//! block on the network for a warm key set.

use moka::future::Cache;
use serde::{Deserialize, Serialize};

/// A JSON Web Key Set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// A JSON Web Key. Only the RSA members we verify against are modeled;
/// `alg`/`use` are optional because not every provider publishes them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA").
    pub kty: String,
    /// Key ID, matched against the token header's `kid`.
    pub kid: String,
    /// Modulus (Base64URL encoded).
    pub n: String,
    /// Exponent (Base64URL encoded).
    pub e: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub r#use: Option<String>,
}

/// Fetch the key set for `url`, going to the network only on a cache miss.
/// Refresh happens by TTL expiry in the cache, never inside a request
/// handler's critical path beyond this single bounded call.
pub async fn fetch_cached(
    cache: &Cache<String, Jwks>,
    http: &reqwest::Client,
    url: &str,
) -> anyhow::Result<Jwks> {
    let http = http.clone();
    let fetch_url = url.to_string();
    cache
        .try_get_with(url.to_string(), async move {
            let jwks: Jwks = http
                .get(&fetch_url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok::<_, anyhow::Error>(jwks)
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to fetch or cache JWKS: {}", e))
}
