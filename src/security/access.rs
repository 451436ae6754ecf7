//! Inbound access control.
//!
//! # Responsibilities
//! - Parse allow/block CIDR lists into IP sets
//! - Decide whether a client IP may pass (block wins over allow)
//! - Extract the client IP from X-Forwarded-For or the peer address
//!
//! X-Forwarded-For is trusted unconditionally; a deployment terminating TLS
//! in front of this proxy is responsible for stripping untrusted forwarding
//! headers upstream.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use ipnet::IpNet;

/// Error type for access-control construction.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("parse cidr {cidr:?}: {source}")]
    InvalidCidr {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },
}

/// Parsed allow/block CIDR sets.
#[derive(Debug, Default)]
pub struct AccessControl {
    allow: Vec<IpNet>,
    block: Vec<IpNet>,
}

impl AccessControl {
    /// Parse the textual CIDR lists; fails on the first bad entry,
    /// naming the offending string.
    pub fn new(allow: &[String], block: &[String]) -> Result<Self, AccessError> {
        Ok(Self {
            allow: parse_set(allow)?,
            block: parse_set(block)?,
        })
    }

    /// True when the client IP is permitted by the allow/block lists.
    ///
    /// A missing IP is denied. Block ranges take precedence; an empty allow
    /// list permits any non-blocked IP.
    pub fn allowed(&self, ip: Option<IpAddr>) -> bool {
        let Some(ip) = ip else {
            return false;
        };

        if self.block.iter().any(|net| net.contains(&ip)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|net| net.contains(&ip))
    }
}

fn parse_set(cidrs: &[String]) -> Result<Vec<IpNet>, AccessError> {
    cidrs
        .iter()
        .map(|cidr| {
            cidr.parse::<IpNet>().map_err(|source| AccessError::InvalidCidr {
                cidr: cidr.clone(),
                source,
            })
        })
        .collect()
}

/// Extract the client IP: first X-Forwarded-For element when it parses,
/// else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }
    peer.map(|addr| addr.ip())
}
