//! Configuration validation logic.

use crate::config::schema::{parse_proxy_url, Config};

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation error: {}", self.0)
    }
}

/// Validate a merged [`Config`] for semantic correctness.
pub fn validate_config(cfg: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if cfg.target.is_empty() {
        errors.push(ValidationError("target is required".to_string()));
    } else {
        match url::Url::parse(&cfg.target) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => errors.push(ValidationError(format!(
                "target must be http or https, got {}",
                u.scheme()
            ))),
            Err(e) => errors.push(ValidationError(format!("invalid target url: {e}"))),
        }
    }

    if cfg.listen.is_empty() {
        errors.push(ValidationError("listen is required".to_string()));
    }

    match cfg.proxy.kind.to_ascii_lowercase().as_str() {
        "" | "direct" | "socks5" | "http" | "https" => {}
        other => errors.push(ValidationError(format!("unsupported proxy type: {other}"))),
    }

    for raw in &cfg.proxy.urls {
        if let Err(e) = parse_proxy_url(raw) {
            errors.push(ValidationError(format!("invalid proxy URL {raw:?}: {e}")));
        }
    }

    match cfg.proxy.rotation.to_ascii_lowercase().as_str() {
        "" | "round-robin" | "random" => {}
        other => errors.push(ValidationError(format!(
            "unsupported proxy rotation: {other}"
        ))),
    }

    if cfg.tls.acme.enabled && cfg.tls.acme.domain.is_empty() {
        errors.push(ValidationError(
            "acme enabled but domain is empty".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
