//! Identity-provider client for the authorization code flow.
//!
//! Resolves the IdP's endpoints through OIDC discovery (cached), builds the
//! authorization and end-session redirects, and exchanges authorization
//! codes for tokens. Each call is a single bounded network operation; there
//! are no retries here.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::config::Settings;
use crate::{AppState, pkce};

/// The subset of the issuer's discovery document the flow engine needs.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderMetadata {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Fetch the issuer's discovery document, cached by issuer URL.
pub async fn discover(state: &Arc<AppState>) -> anyhow::Result<ProviderMetadata> {
    let issuer = state.settings.issuer().to_string();
    let url = format!("{issuer}/.well-known/openid-configuration");
    let http = state.http.clone();

    state
        .metadata_cache
        .try_get_with(issuer, async move {
            let metadata: ProviderMetadata = http
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok::<_, anyhow::Error>(metadata)
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to fetch or cache provider metadata: {}", e))
}

/// A fully built authorization redirect plus the correlation material that
/// must survive until the callback.
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

pub fn build_authorization_request(
    metadata: &ProviderMetadata,
    settings: &Settings,
    redirect_uri: &str,
) -> anyhow::Result<AuthorizationRequest> {
    let state = pkce::generate_state();
    let nonce = pkce::generate_nonce();
    let code_verifier = pkce::generate_code_verifier();
    let code_challenge = pkce::code_challenge(&code_verifier);

    let mut url = Url::parse(&metadata.authorization_endpoint)?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &settings.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &settings.scope)
        .append_pair("state", &state)
        .append_pair("nonce", &nonce)
        .append_pair("code_challenge", &code_challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(AuthorizationRequest {
        url: url.into(),
        state,
        nonce,
        code_verifier,
    })
}

/// An end-session redirect plus its correlation state.
pub struct EndSessionRequest {
    pub url: String,
    pub state: String,
}

pub fn build_end_session_request(
    metadata: &ProviderMetadata,
    settings: &Settings,
    post_logout_redirect_uri: &str,
    id_token_hint: Option<&str>,
) -> anyhow::Result<EndSessionRequest> {
    let endpoint = metadata
        .end_session_endpoint
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("issuer does not advertise an end_session_endpoint"))?;

    let state = pkce::generate_state();
    let mut url = Url::parse(endpoint)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("client_id", &settings.client_id)
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri)
            .append_pair("state", &state);
        if let Some(hint) = id_token_hint {
            pairs.append_pair("id_token_hint", hint);
        }
    }

    Ok(EndSessionRequest {
        url: url.into(),
        state,
    })
}

/// Token endpoint response. `error` coexisting with usable fields is
/// resolved by the caller: error always wins.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Exchange an authorization code for tokens using the stored PKCE verifier.
/// A confidential client also sends its secret; a public client relies on
/// PKCE alone. Error bodies from the IdP are returned as a parsed
/// [`TokenResponse`] so the caller can apply the error-wins rule.
pub async fn exchange_code(
    state: &Arc<AppState>,
    metadata: &ProviderMetadata,
    redirect_uri: &str,
    code: &str,
    code_verifier: &str,
) -> anyhow::Result<TokenResponse> {
    let mut params = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", redirect_uri.to_string()),
        ("client_id", state.settings.client_id.clone()),
        ("code_verifier", code_verifier.to_string()),
    ];
    if let Some(secret) = &state.settings.client_secret {
        params.push(("client_secret", secret.clone()));
    }

    let response = state
        .http
        .post(&metadata.token_endpoint)
        .form(&params)
        .send()
        .await?;

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| anyhow::anyhow!("token endpoint returned an unreadable response: {}", e))
}

/// Decode the claim set of an ID token without verifying its signature.
///
/// The token arrived over the code-exchange back channel, so the transport
/// already authenticates the issuer; the claims feed the session `profile`
/// and the nonce check only, never an authorization decision.
pub fn id_token_claims(id_token: &str) -> Option<Map<String, Value>> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> ProviderMetadata {
        ProviderMetadata {
            authorization_endpoint: "https://idp.example.com/realms/test/auth".to_string(),
            token_endpoint: "https://idp.example.com/realms/test/token".to_string(),
            end_session_endpoint: Some("https://idp.example.com/realms/test/logout".to_string()),
        }
    }

    #[test]
    fn authorization_request_carries_pkce_and_correlation_params() {
        let settings = Settings::for_tests();
        let request =
            build_authorization_request(&metadata(), &settings, "https://app.example.com/cb")
                .unwrap();

        let url = Url::parse(&request.url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "gatehouse-client");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/cb");
        assert_eq!(pairs["scope"], "openid profile email");
        assert_eq!(pairs["state"], request.state);
        assert_eq!(pairs["nonce"], request.nonce);
        assert_eq!(pairs["code_challenge"], pkce::code_challenge(&request.code_verifier));
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[test]
    fn end_session_request_includes_the_hint_only_when_present() {
        let settings = Settings::for_tests();
        let request = build_end_session_request(
            &metadata(),
            &settings,
            "https://app.example.com/bye",
            Some("the-id-token"),
        )
        .unwrap();
        let url = Url::parse(&request.url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["id_token_hint"], "the-id-token");
        assert_eq!(pairs["post_logout_redirect_uri"], "https://app.example.com/bye");
        assert_eq!(pairs["state"], request.state);

        let request =
            build_end_session_request(&metadata(), &settings, "https://app.example.com/bye", None)
                .unwrap();
        assert!(!request.url.contains("id_token_hint"));
    }

    #[test]
    fn missing_end_session_endpoint_is_an_error() {
        let settings = Settings::for_tests();
        let mut metadata = metadata();
        metadata.end_session_endpoint = None;
        assert!(
            build_end_session_request(&metadata, &settings, "https://app.example.com/", None)
                .is_err()
        );
    }

    #[test]
    fn id_token_claims_decodes_the_payload_segment() {
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({"sub": "u1", "nonce": "n1", "email": "u@example.com"}))
                .unwrap(),
        );
        let token = format!("eyJhbGciOiJSUzI1NiJ9.{payload}.signature");

        let claims = id_token_claims(&token).unwrap();
        assert_eq!(claims["sub"], json!("u1"));
        assert_eq!(claims["nonce"], json!("n1"));
    }

    #[test]
    fn malformed_id_tokens_yield_no_claims() {
        assert!(id_token_claims("not-a-jwt").is_none());
        assert!(id_token_claims("a.%%%.c").is_none());
    }
}
