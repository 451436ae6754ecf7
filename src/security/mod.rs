//! Security subsystem.
//!
//! Inbound address evaluation: CIDR allow/block sets and client-IP
//! extraction. Block wins over allow; X-Forwarded-For is trusted
//! unconditionally as a documented deployment contract.

pub mod access;

pub use access::{client_ip, AccessControl, AccessError};
