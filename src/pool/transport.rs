//! Outbound transport construction.
//!
//! # Responsibilities
//! - Build one outbound HTTP client per proxy descriptor
//! - Route the client through SOCKS5 or HTTP(S) CONNECT intermediaries
//! - Apply connect/idle timeouts and keep-alive settings
//!
//! # Design Decisions
//! - One `reqwest::Client` per entry: each intermediary gets its own
//!   connection pool, so rotation always changes the physical path
//! - Direct clients keep reqwest's environment-proxy fallback; explicit
//!   intermediaries override it

use std::time::Duration;

use crate::config::{ParsedProxy, ProxyKind, TimeoutConfig};
use crate::pool::PoolError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const KEEPALIVE: Duration = Duration::from_secs(30);
const MAX_IDLE_PER_HOST: usize = 100;

/// Build the outbound client for one descriptor.
pub fn build_transport(
    descriptor: &ParsedProxy,
    timeouts: &TimeoutConfig,
) -> Result<reqwest::Client, PoolError> {
    // The connect timeout bounds the whole dial: DNS, TCP, proxy CONNECT,
    // and TLS handshake share one budget. reqwest exposes no separate
    // handshake timeout, and it never sends Expect: 100-continue.
    let builder = reqwest::Client::builder()
        .connect_timeout(duration_from_seconds(
            timeouts.connect_seconds,
            DEFAULT_CONNECT_TIMEOUT,
        ))
        .pool_idle_timeout(duration_from_seconds(
            timeouts.idle_seconds,
            DEFAULT_IDLE_TIMEOUT,
        ))
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .tcp_keepalive(KEEPALIVE)
        .redirect(reqwest::redirect::Policy::none());

    let builder = match descriptor.kind {
        // Environment proxy variables stay honored for direct dialing.
        ProxyKind::Direct => builder,
        ProxyKind::Socks5 | ProxyKind::Http | ProxyKind::Https => {
            builder.proxy(proxy_for(descriptor)?)
        }
    };

    builder.build().map_err(|source| PoolError::Transport {
        proxy: descriptor.to_string(),
        source,
    })
}

fn proxy_for(descriptor: &ParsedProxy) -> Result<reqwest::Proxy, PoolError> {
    if descriptor.address.is_empty() {
        return Err(PoolError::InvalidProxy(format!(
            "proxy address required for {}",
            descriptor.kind
        )));
    }

    let invalid = |message: String| PoolError::InvalidProxy(message);

    let mut url = url::Url::parse(&format!("{}://{}", descriptor.kind, descriptor.address))
        .map_err(|e| invalid(format!("parse proxy url {descriptor}: {e}")))?;

    // SOCKS5 credentials ride in the URL (RFC 1929 username/password method);
    // HTTP(S) intermediaries get Proxy-Authorization instead.
    if descriptor.kind == ProxyKind::Socks5 {
        if let Some(username) = &descriptor.username {
            url.set_username(username)
                .map_err(|_| invalid(format!("set proxy username for {descriptor}")))?;
            url.set_password(descriptor.password.as_deref())
                .map_err(|_| invalid(format!("set proxy password for {descriptor}")))?;
        }
    }

    let mut proxy = reqwest::Proxy::all(url.as_str())
        .map_err(|e| invalid(format!("create proxy for {descriptor}: {e}")))?;

    if descriptor.kind != ProxyKind::Socks5 {
        if let Some(username) = &descriptor.username {
            proxy = proxy.basic_auth(username, descriptor.password.as_deref().unwrap_or(""));
        }
    }

    Ok(proxy)
}

fn duration_from_seconds(seconds: i64, fallback: Duration) -> Duration {
    if seconds <= 0 {
        fallback
    } else {
        Duration::from_secs(seconds as u64)
    }
}
