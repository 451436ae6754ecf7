//! CORS handling.
//!
//! Matching is exact and case-insensitive; an origin list of exactly `["*"]`
//! matches any origin and emits the literal `*`, otherwise the matching
//! origin is echoed back. `OPTIONS` requests terminate here with
//! 204 No Content.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::CorsConfig;

pub async fn apply_cors(
    State(cfg): State<Arc<CorsConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut cors_headers = HeaderMap::new();
    if origin_allowed(&cfg.allowed_origins, &origin) {
        if cfg.allowed_origins.len() == 1 && cfg.allowed_origins[0] == "*" {
            cors_headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        } else if !origin.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&origin) {
                cors_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
        }
        if cfg.allow_credentials {
            cors_headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        insert_joined(
            &mut cors_headers,
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            &cfg.expose_headers,
        );
        insert_joined(
            &mut cors_headers,
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            &cfg.allowed_headers,
        );
        insert_joined(
            &mut cors_headers,
            header::ACCESS_CONTROL_ALLOW_METHODS,
            &cfg.allow_methods,
        );
    }

    if cfg.max_age_seconds > 0 {
        if let Ok(value) = HeaderValue::from_str(&cfg.max_age_seconds.to_string()) {
            cors_headers.insert(header::ACCESS_CONTROL_MAX_AGE, value);
        }
    }

    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        response.headers_mut().extend(cors_headers);
        return response;
    }

    let mut response = next.run(req).await;
    response.headers_mut().extend(cors_headers);
    response
}

fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed[0] == "*" {
        return true;
    }
    allowed
        .iter()
        .any(|o| o.trim().eq_ignore_ascii_case(origin))
}

fn insert_joined(headers: &mut HeaderMap, name: header::HeaderName, values: &[String]) {
    if values.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&values.join(",")) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_list_matches_any_origin() {
        let allowed = vec!["*".to_string()];
        assert!(origin_allowed(&allowed, "https://anything.example"));
        assert!(origin_allowed(&allowed, ""));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let allowed = vec!["https://App.Example".to_string()];
        assert!(origin_allowed(&allowed, "https://app.example"));
        assert!(!origin_allowed(&allowed, "https://other.example"));
    }

    #[test]
    fn empty_list_matches_nothing() {
        assert!(!origin_allowed(&[], "https://app.example"));
    }
}
