use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use moka::future::Cache;

mod audit;
mod callback;
mod config;
mod error;
mod jwks;
mod login;
mod logout;
mod middleware;
mod pkce;
mod profile;
mod provider;
mod sanitize;
mod session;
mod state_store;
mod telemetry;
mod verifier;

/// Shared, read-only request context: settings loaded once at startup plus
/// the remote-document caches. Nothing here is mutated by handlers.
pub struct AppState {
    pub settings: config::Settings,
    pub metadata_cache: Cache<String, provider::ProviderMetadata>,
    pub jwks_cache: Cache<String, jwks::Jwks>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: config::Settings) -> Self {
        AppState {
            settings,
            metadata_cache: Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .build(),
            jwks_cache: Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .build(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

#[tokio::main]
async fn main() {
    let settings = config::load().expect("failed to load configuration");
    let _telemetry = telemetry::init(&settings.telemetry);

    let port = settings.port;
    let shared_state = Arc::new(AppState::new(settings));

    let app = Router::new()
        .route("/api/oidc/login", get(login::login))
        .route("/api/oidc/callback", get(callback::callback))
        .route("/api/oidc/logout", get(logout::logout))
        .route("/api/oidc/logout/callback", get(logout::logout_callback))
        .route("/api/oidc/session", get(session::session_info))
        .route("/api/profile", get(profile::profile))
        .layer(middleware::RequestContextLayer::new())
        .with_state(shared_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}
