//! HTTP front-end subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (serve-mode selection, router)
//!     → middleware/ (logging → CORS → access control)
//!     → /healthz or the reverse-proxy fallback
//! ```

pub mod middleware;
pub mod server;

pub use server::{Server, ServerError};
