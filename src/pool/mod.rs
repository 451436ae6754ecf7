//! Upstream proxy pool subsystem.
//!
//! # Data Flow
//! ```text
//! proxy settings (config)
//!     → transport.rs (one outbound client per descriptor)
//!     → entry.rs (client + health metadata)
//!     → pool.rs (snapshot, rotation, dispatch with retry-on-timeout)
//!
//! background:
//!     probe.rs (periodic canary probes → entry health transitions)
//! ```
//!
//! # Design Decisions
//! - Entries start healthy; the first probe pass corrects state
//! - Retry happens only on timeouts; other failures surface immediately
//! - When no entry is healthy, dispatch falls back to the full set

pub mod entry;
pub mod pool;
pub mod probe;
pub mod rotation;
pub mod transport;

pub use entry::{ProxyEntry, ProxyStatus};
pub use pool::{is_timeout_error, ProxyPool};
pub use rotation::Rotation;
pub use transport::build_transport;

/// Error type for pool construction and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    InvalidProxy(String),

    #[error("create transport for {proxy}: {source}")]
    Transport {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no proxies available")]
    NoProxies,

    #[error("read request body: {0}")]
    BodyRead(String),

    #[error(transparent)]
    Upstream(reqwest::Error),

    #[error("all proxies failed: {0}")]
    AllProxiesFailed(#[source] reqwest::Error),
}
