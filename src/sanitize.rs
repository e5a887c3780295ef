//! Redirect-target sanitization.
//!
//! Every user-influenceable redirect destination (login `returnTo`, logout
//! `returnTo`) passes through [`sanitize_return_to`] before being used,
//! closing the open-redirect hole: whatever was supplied, the result is a
//! same-origin relative target or `/`.

use url::Url;

use crate::config::Settings;

/// Constrain a caller-supplied return path to a same-origin relative target.
///
/// Returns `/` if the candidate is absent, unparseable, or resolves to a
/// different origin. Otherwise returns path + query + fragment with the
/// scheme and host stripped.
pub fn sanitize_return_to(origin: &str, candidate: Option<&str>) -> String {
    let Some(candidate) = candidate else {
        return "/".to_string();
    };
    if candidate.is_empty() {
        return "/".to_string();
    }

    let Ok(base) = Url::parse(origin) else {
        return "/".to_string();
    };

    let resolved = if candidate.starts_with("http://") || candidate.starts_with("https://") {
        Url::parse(candidate)
    } else {
        base.join(candidate)
    };

    let Ok(target) = resolved else {
        return "/".to_string();
    };

    if target.origin() != base.origin() {
        return "/".to_string();
    }

    let mut path = target.path().to_string();
    if let Some(query) = target.query() {
        path.push('?');
        path.push_str(query);
    }
    if let Some(fragment) = target.fragment() {
        path.push('#');
        path.push_str(fragment);
    }
    path
}

/// Resolve the externally visible origin of the current request.
///
/// An explicit `public_origin` setting wins (deployments behind proxies that
/// rewrite Host); otherwise the origin is derived from the Host header, with
/// the scheme following the cookie-security setting.
pub fn request_origin(settings: &Settings, host: &str) -> String {
    if let Some(origin) = &settings.public_origin {
        return origin.trim_end_matches('/').to_string();
    }
    let scheme = if settings.secure_cookies { "https" } else { "http" };
    format!("{scheme}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://app.example.com";

    #[test]
    fn absent_candidate_falls_back_to_root() {
        assert_eq!(sanitize_return_to(ORIGIN, None), "/");
        assert_eq!(sanitize_return_to(ORIGIN, Some("")), "/");
    }

    #[test]
    fn relative_path_is_kept_with_query_and_fragment() {
        assert_eq!(
            sanitize_return_to(ORIGIN, Some("/dashboard?tab=keys#top")),
            "/dashboard?tab=keys#top"
        );
    }

    #[test]
    fn same_origin_absolute_url_is_reduced_to_its_path() {
        assert_eq!(
            sanitize_return_to(ORIGIN, Some("https://app.example.com/settings?x=1")),
            "/settings?x=1"
        );
    }

    #[test]
    fn cross_origin_absolute_url_is_rejected() {
        assert_eq!(
            sanitize_return_to(ORIGIN, Some("https://evil.example.net/phish")),
            "/"
        );
    }

    #[test]
    fn protocol_relative_url_is_rejected() {
        assert_eq!(sanitize_return_to(ORIGIN, Some("//evil.example.net/phish")), "/");
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        assert_eq!(sanitize_return_to(ORIGIN, Some("javascript:alert(1)")), "/");
    }

    #[test]
    fn scheme_mismatch_is_a_different_origin() {
        assert_eq!(
            sanitize_return_to(ORIGIN, Some("http://app.example.com/dashboard")),
            "/"
        );
    }

    #[test]
    fn origin_derivation_prefers_the_configured_override() {
        let mut settings = Settings::for_tests();
        settings.public_origin = Some("https://gate.example.com/".to_string());
        assert_eq!(request_origin(&settings, "internal:3000"), "https://gate.example.com");

        settings.public_origin = None;
        settings.secure_cookies = false;
        assert_eq!(request_origin(&settings, "localhost:3000"), "http://localhost:3000");
    }
}
