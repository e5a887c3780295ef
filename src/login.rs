//! `GET /api/oidc/login` — the login-start leg of the authorization code
//! flow.
//!
//! Sanitizes the caller's return path, builds an authorization redirect with
//! a fresh state/nonce/PKCE bundle, and parks the bundle in the flow-state
//! cookie until the callback comes back.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::{CookieJar, Host};
use serde::Deserialize;
use serde_json::json;

use crate::error::AuthError;
use crate::state_store::StateStore;
use crate::{AppState, audit, provider, sanitize, session};

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

#[tracing::instrument(skip(state, jar))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Host(host): Host,
    Query(params): Query<LoginParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let origin = sanitize::request_origin(&state.settings, &host);
    let return_to = sanitize::sanitize_return_to(&origin, params.return_to.as_deref());

    let metadata = provider::discover(&state)
        .await
        .map_err(|e| AuthError::start(e.to_string()))?;
    let request = provider::build_authorization_request(
        &metadata,
        &state.settings,
        &state.settings.redirect_uri(&origin),
    )
    .map_err(|e| AuthError::start(e.to_string()))?;

    let mut store = StateStore::from_jar(&jar, state.settings.secure_cookies);
    store.set(
        request.state.clone(),
        json!({
            "code_verifier": request.code_verifier,
            "nonce": request.nonce,
            "return_to": return_to,
            "created": session::unix_now(),
        }),
    );

    audit!(
        "login flow started for client {}, returning to {}",
        state.settings.client_id,
        return_to
    );

    Ok((store.commit(jar), Redirect::to(&request.url)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::state_store::STATE_COOKIE;
    use crate::verifier::tests::{TestIdp, app_state, start_idp};
    use axum::http::{StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use axum_extra::extract::cookie::Cookie;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Publish a discovery document pointing at the mock server itself.
    pub(crate) async fn mount_discovery(idp: &TestIdp) {
        let uri = idp.server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authorization_endpoint": format!("{uri}/auth"),
                "token_endpoint": format!("{uri}/token"),
                "end_session_endpoint": format!("{uri}/logout"),
            })))
            .mount(&idp.server)
            .await;
    }

    /// Collect the Set-Cookie headers of a response into a jar, dropping
    /// removal cookies.
    pub(crate) fn response_jar(response: &Response) -> CookieJar {
        let mut jar = CookieJar::new();
        for value in response.headers().get_all(header::SET_COOKIE) {
            if let Ok(cookie) = Cookie::parse(value.to_str().unwrap().to_owned()) {
                if !cookie.value().is_empty() {
                    jar = jar.add(cookie.into_owned());
                }
            }
        }
        jar
    }

    pub(crate) fn location_of(response: &Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn login_redirects_to_the_idp_with_a_persisted_flow_bundle() {
        let idp = start_idp().await;
        mount_discovery(&idp).await;
        let state = app_state(&idp);

        let response = login(
            State(state),
            Host("app.example.com".to_string()),
            Query(LoginParams {
                return_to: Some("/dashboard".to_string()),
            }),
            CookieJar::new(),
        )
        .await
        .expect("login-start should succeed")
        .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = Url::parse(&location_of(&response)).unwrap();
        assert!(location.as_str().starts_with(&format!("{}/auth", idp.server.uri())));
        let pairs: std::collections::HashMap<_, _> =
            location.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/api/oidc/callback");

        // The flow bundle for this state landed in the cookie.
        let jar = response_jar(&response);
        let store = StateStore::from_jar(&jar, true);
        let entry = store.get(&pairs["state"]).expect("flow state should be stored");
        assert_eq!(entry["return_to"], json!("/dashboard"));
        assert!(entry["code_verifier"].is_string());
        assert_eq!(pairs["nonce"], entry["nonce"].as_str().unwrap());
        assert_eq!(jar.get(STATE_COOKIE).unwrap().max_age(), Some(time::Duration::seconds(600)));
    }

    #[tokio::test]
    async fn cross_origin_return_path_is_neutralized_at_start() {
        let idp = start_idp().await;
        mount_discovery(&idp).await;
        let state = app_state(&idp);

        let response = login(
            State(state),
            Host("app.example.com".to_string()),
            Query(LoginParams {
                return_to: Some("https://evil.example.net/phish".to_string()),
            }),
            CookieJar::new(),
        )
        .await
        .unwrap()
        .into_response();

        let location = Url::parse(&location_of(&response)).unwrap();
        let pairs: std::collections::HashMap<_, _> =
            location.query_pairs().into_owned().collect();
        let jar = response_jar(&response);
        let store = StateStore::from_jar(&jar, true);
        assert_eq!(store.get(&pairs["state"]).unwrap()["return_to"], json!("/"));
    }

    #[tokio::test]
    async fn unreachable_issuer_is_a_start_failure() {
        let server = MockServer::start().await;
        // No discovery document mounted: the fetch 404s.
        let mut settings = crate::config::Settings::for_tests();
        settings.authority = server.uri();
        let state = Arc::new(AppState::new(settings));

        let result = login(
            State(state),
            Host("app.example.com".to_string()),
            Query(LoginParams { return_to: None }),
            CookieJar::new(),
        )
        .await;
        assert!(matches!(result, Err(AuthError::Start(_))));
    }
}
