//! Configuration management for Gatehouse.
//!
//! Settings come from an optional `gatehouse` config file plus
//! `GATEHOUSE_`-prefixed environment variables, loaded once at startup and
//! never re-read. Authority and client id are mandatory; everything else has
//! a default or is derived from the request origin at runtime.

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing required setting: {0}")]
    MissingRequired(&'static str),
}

/// Application configuration settings.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// Issuer URL of the external identity provider.
    #[serde(default)]
    pub authority: String,
    /// OAuth2 client identifier registered at the IdP.
    #[serde(default)]
    pub client_id: String,
    /// Client secret. Absent for public (PKCE-only) clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Space-delimited scope string requested at login.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Explicit redirect URI. When unset it is derived from the request
    /// origin, so one artifact works across environments.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Explicit post-logout redirect URI; derived from origin when unset.
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
    /// Comma-separated audience values accepted during token verification.
    /// Defaults to the client id.
    #[serde(default)]
    pub audience: Option<String>,
    /// Externally visible origin override for deployments behind a proxy.
    #[serde(default)]
    pub public_origin: Option<String>,
    /// Whether cookies carry the `Secure` attribute. On by default; turn
    /// off only for plain-http local development.
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
    /// Port number the server will listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.authority.trim().is_empty() {
            return Err(ConfigError::MissingRequired("GATEHOUSE_AUTHORITY"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired("GATEHOUSE_CLIENT_ID"));
        }
        Ok(())
    }

    /// Issuer URL without a trailing slash, the exact-match form used for
    /// `iss` checks and endpoint derivation.
    pub fn issuer(&self) -> &str {
        self.authority.trim_end_matches('/')
    }

    /// Audience values a verified token may carry: the configured override
    /// (comma-separated, one-of-many) or the client id.
    pub fn audience_candidates(&self) -> Vec<String> {
        match &self.audience {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec![self.client_id.clone()],
        }
    }

    pub fn redirect_uri(&self, origin: &str) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{origin}/api/oidc/callback"))
    }

    pub fn post_logout_redirect_uri(&self, origin: &str) -> String {
        self.post_logout_redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{origin}/api/oidc/logout/callback"))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LoggingFormat {
    Json,
    Pretty,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_level")]
    pub level: LogLevel,
    #[serde(default = "default_level")]
    pub axum_level: LogLevel,
    #[serde(default = "default_format")]
    pub format: LoggingFormat,
    #[serde(default)]
    pub otlp_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            service_name: default_service_name(),
            level: default_level(),
            axum_level: default_level(),
            format: default_format(),
            otlp_enabled: false,
        }
    }
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    3000
}

fn default_service_name() -> String {
    "gatehouse".to_string()
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

fn default_format() -> LoggingFormat {
    LoggingFormat::Json
}

/// Loads configuration from the optional `gatehouse` file and the
/// environment.
///
/// Called exactly once at startup; the result lives in `AppState` for the
/// rest of the process.
pub fn load() -> Result<Settings, ConfigError> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name("gatehouse").required(false))
        .add_source(
            config::Environment::with_prefix("GATEHOUSE")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .map_err(|e| {
            tracing::error!("failed to build configuration: {}", e);
            e
        })?;

    let settings: Settings = cfg.try_deserialize().map_err(|e| {
        tracing::error!("failed to deserialize configuration: {}", e);
        e
    })?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
impl Settings {
    pub fn for_tests() -> Self {
        Settings {
            authority: "https://idp.example.com/realms/test".to_string(),
            client_id: "gatehouse-client".to_string(),
            client_secret: None,
            scope: default_scope(),
            redirect_uri: None,
            post_logout_redirect_uri: None,
            audience: None,
            public_origin: None,
            secure_cookies: true,
            port: default_port(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn load_reads_env_overrides() {
        unsafe {
            env::set_var("GATEHOUSE_AUTHORITY", "https://env-idp.example.com");
            env::set_var("GATEHOUSE_CLIENT_ID", "env-client");
            env::set_var("GATEHOUSE_SECURE_COOKIES", "false");
        }

        let settings = load().expect("settings should load from env");
        assert_eq!(settings.authority, "https://env-idp.example.com");
        assert_eq!(settings.client_id, "env-client");
        assert!(!settings.secure_cookies);
        assert_eq!(settings.scope, "openid profile email");

        unsafe {
            env::remove_var("GATEHOUSE_AUTHORITY");
            env::remove_var("GATEHOUSE_CLIENT_ID");
            env::remove_var("GATEHOUSE_SECURE_COOKIES");
        }
    }

    #[test]
    fn blank_required_settings_are_fatal() {
        let mut settings = Settings::for_tests();
        settings.authority = "   ".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingRequired("GATEHOUSE_AUTHORITY"))
        ));

        let mut settings = Settings::for_tests();
        settings.client_id = String::new();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingRequired("GATEHOUSE_CLIENT_ID"))
        ));
    }

    #[test]
    fn audience_override_splits_into_candidates() {
        let mut settings = Settings::for_tests();
        assert_eq!(settings.audience_candidates(), vec!["gatehouse-client"]);

        settings.audience = Some("api-a, api-b,api-c".to_string());
        assert_eq!(settings.audience_candidates(), vec!["api-a", "api-b", "api-c"]);
    }

    #[test]
    fn redirect_uris_derive_from_origin_when_unset() {
        let mut settings = Settings::for_tests();
        assert_eq!(
            settings.redirect_uri("https://app.example.com"),
            "https://app.example.com/api/oidc/callback"
        );
        assert_eq!(
            settings.post_logout_redirect_uri("https://app.example.com"),
            "https://app.example.com/api/oidc/logout/callback"
        );

        settings.redirect_uri = Some("https://fixed.example.com/cb".to_string());
        assert_eq!(settings.redirect_uri("https://app.example.com"), "https://fixed.example.com/cb");
    }
}
