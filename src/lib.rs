//! sockstream: a lightweight HTTP(S) reverse proxy.
//!
//! A single listener forwards all traffic to one origin URL, optionally
//! through a rotating pool of SOCKS5 or HTTP(S) CONNECT intermediaries with
//! health probing and retry-on-timeout.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────┐
//!                      │                  SOCKSTREAM                    │
//!                      │                                                │
//!   Client Request     │  ┌────────┐   ┌────────────┐   ┌───────────┐  │
//!   ──────────────────▶│  │  http  │──▶│ middleware │──▶│   proxy   │  │
//!                      │  │ server │   │ log/cors/  │   │ pipeline  │  │
//!                      │  └────────┘   │   access   │   └─────┬─────┘  │
//!                      │               └────────────┘         │        │
//!                      │                                      ▼        │
//!                      │                               ┌───────────┐   │
//!   Client Response    │                               │   pool    │───┼──▶ intermediary ──▶ Origin
//!   ◀──────────────────│◀──────────────────────────────│ (rotation,│   │
//!                      │                               │  health)  │   │
//!                      │                               └───────────┘   │
//!                      │                                                │
//!                      │  config · security · tls · lifecycle ·         │
//!                      │  observability                                  │
//!                      └───────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod pool;
pub mod proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod tls;

pub use config::Config;
pub use http::Server;
pub use lifecycle::Shutdown;
pub use pool::ProxyPool;
