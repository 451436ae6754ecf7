//! Reverse-proxy pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request (after middleware)
//!     → reverse.rs (URL + header rewrites)
//!     → pool (dispatch through an intermediary)
//!     → reverse.rs (stream response back; 502 on failure)
//!
//! upgrade requests:
//!     reverse.rs detects the handshake
//!     → websocket.rs (101 to the client, bidirectional byte copy)
//! ```

pub mod reverse;
pub mod websocket;

pub use reverse::ReverseProxy;
