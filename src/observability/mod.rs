//! Observability subsystem.
//!
//! Structured logging via `tracing`; every subsystem logs with fields
//! rather than formatted strings so records stay machine-parseable.

pub mod logging;
