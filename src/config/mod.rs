//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/TOML)
//!     → loader.rs (parse & deserialize)
//!     → env overlay (SOCKSTREAM_* variables)
//!     → flag overrides
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no runtime reload
//! - All fields have defaults so a minimal config (just `target`) works
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, Overrides};
pub use schema::{
    AccessConfig, AcmeConfig, Config, CorsConfig, HeaderConfig, LoggingConfig, ParsedProxy,
    ProxyAuth, ProxyConfig, ProxyKind, TimeoutConfig, TlsConfig,
};
pub use validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse config: unknown format")]
    UnknownFormat,

    #[error("{0}")]
    InvalidProxy(String),

    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.0.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
