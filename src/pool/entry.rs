//! Pool entry: one intermediary (or the direct-dial surrogate) plus its
//! transport and health metadata.
//!
//! The transport is constructed once and reused; only the health metadata
//! mutates. The `healthy` flag is an atomic for lock-free reads on the
//! dispatch path; the check timestamp and error string sit behind a small
//! per-entry lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::config::ParsedProxy;

#[derive(Debug, Default, Clone)]
struct EntryStatus {
    last_check: Option<SystemTime>,
    last_error: String,
}

/// One upstream proxy with its transport and health state.
#[derive(Debug)]
pub struct ProxyEntry {
    pub descriptor: ParsedProxy,
    pub client: reqwest::Client,
    healthy: AtomicBool,
    status: RwLock<EntryStatus>,
}

impl ProxyEntry {
    /// Create an entry; entries start healthy so traffic flows before the
    /// first probe completes.
    pub fn new(descriptor: ParsedProxy, client: reqwest::Client) -> Self {
        Self {
            descriptor,
            client,
            healthy: AtomicBool::new(true),
            status: RwLock::new(EntryStatus::default()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Record a health transition with its timestamp and error message.
    pub fn set_healthy(&self, healthy: bool, error: &str) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        self.healthy.store(healthy, Ordering::Relaxed);
        status.last_check = Some(SystemTime::now());
        status.last_error = error.to_string();
    }

    pub fn last_error(&self) -> String {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last_error
            .clone()
    }

    pub fn last_check(&self) -> Option<SystemTime> {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last_check
    }

    pub(crate) fn status(&self) -> ProxyStatus {
        let status = self.status.read().unwrap_or_else(|e| e.into_inner());
        ProxyStatus {
            address: self.descriptor.to_string(),
            healthy: self.is_healthy(),
            last_check: status.last_check,
            last_error: status.last_error.clone(),
        }
    }
}

/// Snapshot of a single entry's health, for logs and introspection.
#[derive(Debug, Clone)]
pub struct ProxyStatus {
    pub address: String,
    pub healthy: bool,
    pub last_check: Option<SystemTime>,
    pub last_error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyKind;

    fn entry() -> ProxyEntry {
        ProxyEntry::new(
            ParsedProxy {
                kind: ProxyKind::Socks5,
                address: "p:1080".into(),
                username: None,
                password: None,
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn starts_healthy_with_no_history() {
        let e = entry();
        assert!(e.is_healthy());
        assert!(e.last_check().is_none());
        assert_eq!(e.last_error(), "");
    }

    #[test]
    fn health_transition_records_error_and_timestamp() {
        let e = entry();
        e.set_healthy(false, "connection timed out");
        assert!(!e.is_healthy());
        assert_eq!(e.last_error(), "connection timed out");
        assert!(e.last_check().is_some());

        e.set_healthy(true, "");
        assert!(e.is_healthy());
        assert_eq!(e.last_error(), "");
    }

    #[test]
    fn status_snapshot_reflects_state() {
        let e = entry();
        e.set_healthy(false, "boom");
        let status = e.status();
        assert_eq!(status.address, "socks5://p:1080");
        assert!(!status.healthy);
        assert_eq!(status.last_error, "boom");
    }
}
