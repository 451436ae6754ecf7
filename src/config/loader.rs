//! Configuration loading and layered merge.
//!
//! Merge order, lowest to highest precedence:
//! defaults → config file → environment (`SOCKSTREAM_` prefix) → CLI flags.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::schema::Config;
use crate::config::validation::validate_config;
use crate::config::ConfigError;

/// Flag-level overrides applied on top of file and environment values.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub host_name: Option<String>,
    pub target: Option<String>,
    pub proxy_type: Option<String>,
    pub proxy_address: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub allow_cidrs: Vec<String>,
    pub cors_origins: Vec<String>,
    pub add_headers: BTreeMap<String, String>,
    pub tls_cert_file: Option<String>,
    pub tls_key_file: Option<String>,
    pub acme_domain: Option<String>,
    pub acme_email: Option<String>,
    pub acme_cache_dir: Option<String>,
    pub disable_rewrite_host: bool,
}

/// Load, merge, and validate the configuration.
pub fn load(
    path: Option<&Path>,
    env_prefix: &str,
    overrides: Overrides,
) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        cfg = parse_config(&content, &ext)?;
    }

    apply_env_from(&mut cfg, |key| {
        std::env::var(format!("{}_{}", env_prefix.to_ascii_uppercase(), key)).ok()
    });
    apply_overrides(&mut cfg, overrides);

    validate_config(&cfg).map_err(ConfigError::Validation)?;

    Ok(cfg)
}

/// Parse config file content. Known extensions pick a parser directly;
/// anything else tries each parser in turn and accepts the first to succeed.
pub fn parse_config(content: &str, extension: &str) -> Result<Config, ConfigError> {
    match extension {
        "yaml" | "yml" => Ok(serde_yaml::from_str(content)?),
        "toml" => Ok(toml::from_str(content)?),
        _ => {
            if let Ok(cfg) = serde_yaml::from_str(content) {
                return Ok(cfg);
            }
            if let Ok(cfg) = toml::from_str(content) {
                return Ok(cfg);
            }
            Err(ConfigError::UnknownFormat)
        }
    }
}

/// Overlay environment values. Takes a lookup closure so tests can drive it
/// without touching the process environment.
pub fn apply_env_from<F>(cfg: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("LISTEN") {
        cfg.listen = v;
    }
    if let Some(v) = lookup("HOST_NAME") {
        cfg.host_name = v;
    }
    if let Some(v) = lookup("TARGET") {
        cfg.target = v;
    }
    if let Some(v) = lookup("PROXY_TYPE") {
        cfg.proxy.kind = v;
    }
    if let Some(v) = lookup("PROXY_ADDRESS") {
        cfg.proxy.address = v;
    }
    if let Some(v) = lookup("PROXY_USERNAME") {
        cfg.proxy.auth.username = v;
    }
    if let Some(v) = lookup("PROXY_PASSWORD") {
        cfg.proxy.auth.password = v;
    }
    if let Some(v) = lookup("PROXY_URLS") {
        cfg.proxy.urls = split_and_clean(&v);
    }
    if let Some(v) = lookup("PROXY_ROTATION") {
        cfg.proxy.rotation = v;
    }
    if let Some(v) = lookup("ALLOW_IPS") {
        cfg.access.allow = split_and_clean(&v);
    }
    if let Some(v) = lookup("BLOCK_IPS") {
        cfg.access.block = split_and_clean(&v);
    }
    if let Some(v) = lookup("CORS_ORIGINS") {
        cfg.cors.allowed_origins = split_and_clean(&v);
    }
    if let Some(v) = lookup("ADD_HEADERS") {
        for pair in split_and_clean(&v) {
            if let Some((key, value)) = pair.split_once('=') {
                cfg.headers
                    .add
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    if let Some(v) = lookup("TLS_CERT_FILE") {
        cfg.tls.cert_file = v;
    }
    if let Some(v) = lookup("TLS_KEY_FILE") {
        cfg.tls.key_file = v;
    }
    if let Some(v) = lookup("ACME_DOMAIN") {
        cfg.tls.acme.enabled = true;
        cfg.tls.acme.domain = v;
    }
    if let Some(v) = lookup("ACME_EMAIL") {
        cfg.tls.acme.email = v;
    }
    if let Some(v) = lookup("ACME_CACHE_DIR") {
        cfg.tls.acme.cache_dir = v;
    }
}

fn apply_overrides(cfg: &mut Config, overrides: Overrides) {
    if let Some(v) = overrides.listen {
        cfg.listen = v;
    }
    if let Some(v) = overrides.host_name {
        cfg.host_name = v;
    }
    if let Some(v) = overrides.target {
        cfg.target = v;
    }
    if let Some(v) = overrides.proxy_type {
        cfg.proxy.kind = v;
    }
    if let Some(v) = overrides.proxy_address {
        cfg.proxy.address = v;
    }
    if let Some(v) = overrides.proxy_username {
        cfg.proxy.auth.username = v;
    }
    if let Some(v) = overrides.proxy_password {
        cfg.proxy.auth.password = v;
    }
    if !overrides.allow_cidrs.is_empty() {
        cfg.access.allow = overrides.allow_cidrs;
    }
    if !overrides.cors_origins.is_empty() {
        cfg.cors.allowed_origins = overrides.cors_origins;
    }
    for (key, value) in overrides.add_headers {
        cfg.headers.add.insert(key, value);
    }
    if overrides.disable_rewrite_host {
        cfg.headers.rewrite_host = false;
    }
    if let Some(v) = overrides.tls_cert_file {
        cfg.tls.cert_file = v;
    }
    if let Some(v) = overrides.tls_key_file {
        cfg.tls.key_file = v;
    }
    if let Some(v) = overrides.acme_domain {
        cfg.tls.acme.domain = v;
        cfg.tls.acme.enabled = true;
    }
    if let Some(v) = overrides.acme_email {
        cfg.tls.acme.email = v;
    }
    if let Some(v) = overrides.acme_cache_dir {
        cfg.tls.acme.cache_dir = v;
    }
}

/// Split a comma-separated value, trimming whitespace and dropping empties.
fn split_and_clean(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
