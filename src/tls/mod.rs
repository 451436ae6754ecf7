//! TLS lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! static mode: cert_file + key_file → rustls config
//! acme mode:   acme.rs orders via HTTP-01 → cached PEMs → rustls config
//!              renewal task re-issues and hot-reloads
//! ```

pub mod acme;

pub use acme::AcmeManager;

/// Error type for certificate management.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("certificate io: {0}")]
    Io(#[from] std::io::Error),

    #[error("acme: {0}")]
    Acme(#[from] instant_acme::Error),

    #[error("certificate request: {0}")]
    Csr(#[from] rcgen::Error),

    #[error("acme order failed: {0}")]
    OrderFailed(String),
}
