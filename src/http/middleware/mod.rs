//! Inbound middleware chain.
//!
//! Composition order, outermost first: logging → CORS → access control →
//! handler. Each layer wraps the next; CORS short-circuits `OPTIONS` and
//! access control may answer 403 before the handler runs.

pub mod access;
pub mod cors;
pub mod logging;

pub use access::enforce_access;
pub use cors::apply_cors;
pub use logging::log_requests;
