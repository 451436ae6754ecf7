//! Proxy pool: ownership of the per-proxy transports, health snapshots,
//! and the dispatch retry loop.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::{ParsedProxy, ProxyConfig, ProxyKind};
use crate::pool::entry::{ProxyEntry, ProxyStatus};
use crate::pool::rotation::{Rotation, Selector};
use crate::pool::transport::build_transport;
use crate::pool::PoolError;

/// Pool of upstream proxy transports with rotation and health tracking.
///
/// The entry vector is immutable after construction; only per-entry health
/// metadata mutates.
#[derive(Debug)]
pub struct ProxyPool {
    entries: Vec<Arc<ProxyEntry>>,
    selector: Selector,
    direct: bool,
    stop_tx: watch::Sender<bool>,
}

impl ProxyPool {
    /// Build the pool from the proxy settings. With no proxies configured,
    /// the pool holds a single direct entry with probing and retry disabled.
    pub fn new(cfg: &ProxyConfig) -> Result<Self, PoolError> {
        let proxies = cfg.proxies()?;
        let rotation = Rotation::parse(&cfg.rotation);

        if proxies.is_empty() {
            let descriptor = ParsedProxy {
                kind: ProxyKind::Direct,
                address: "direct".to_string(),
                username: None,
                password: None,
            };
            let client = build_transport(&descriptor, &cfg.timeouts)?;
            return Ok(Self::assemble(
                vec![ProxyEntry::new(descriptor, client)],
                rotation,
                true,
            ));
        }

        let mut entries = Vec::with_capacity(proxies.len());
        for descriptor in proxies {
            let client = build_transport(&descriptor, &cfg.timeouts)?;
            entries.push(ProxyEntry::new(descriptor, client));
        }
        Ok(Self::assemble(entries, rotation, false))
    }

    /// Assemble a pool from prebuilt entries. Mainly a seam for tests that
    /// need transports with custom timeout behavior.
    pub fn from_entries(entries: Vec<ProxyEntry>, rotation: Rotation) -> Self {
        Self::assemble(entries, rotation, false)
    }

    fn assemble(entries: Vec<ProxyEntry>, rotation: Rotation, direct: bool) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
            selector: Selector::new(rotation),
            direct,
            stop_tx,
        }
    }

    /// True when the pool is the single direct-dial surrogate.
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// True when dispatch will make exactly one attempt, meaning callers
    /// need not make the request body replayable.
    pub fn is_single(&self) -> bool {
        self.direct || self.entries.len() == 1
    }

    /// Total number of entries.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries currently marked healthy.
    pub fn healthy_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_healthy()).count()
    }

    /// Health snapshot of every entry.
    pub fn status(&self) -> Vec<ProxyStatus> {
        self.entries.iter().map(|e| e.status()).collect()
    }

    /// Signal the probe loop to stop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub(crate) fn entries(&self) -> &[Arc<ProxyEntry>] {
        &self.entries
    }

    pub(crate) fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Healthy entries, falling back to the full set during total outages so
    /// traffic keeps flowing until probing restores correct state.
    fn healthy_snapshot(&self) -> Vec<Arc<ProxyEntry>> {
        let healthy: Vec<Arc<ProxyEntry>> = self
            .entries
            .iter()
            .filter(|e| e.is_healthy())
            .cloned()
            .collect();

        if healthy.is_empty() && !self.entries.is_empty() {
            tracing::warn!("no healthy proxies, using fallback");
            return self.entries.clone();
        }
        healthy
    }

    /// Dispatch a request through the pool.
    ///
    /// Multi-entry pools retry on timeout, rotating to an untried entry and
    /// marking the timed-out one unhealthy. Non-timeout failures surface
    /// immediately; masking them behind rotation would hide real errors.
    ///
    /// When more than one candidate is in play the request body must be
    /// replayable (buffered bytes or empty); callers buffer before
    /// dispatching unless [`ProxyPool::is_single`] holds.
    pub async fn execute(&self, req: reqwest::Request) -> Result<reqwest::Response, PoolError> {
        let candidates = self.healthy_snapshot();
        if candidates.is_empty() {
            return Err(PoolError::NoProxies);
        }

        if candidates.len() == 1 || self.direct {
            let entry = &candidates[0];
            return entry.client.execute(req).await.map_err(PoolError::Upstream);
        }

        let mut tried = vec![false; candidates.len()];
        let mut tried_count = 0;
        let mut last_err: Option<reqwest::Error> = None;

        while tried_count < candidates.len() {
            let available: Vec<usize> = (0..candidates.len()).filter(|i| !tried[*i]).collect();
            let idx = available[self.selector.pick(available.len())];
            tried[idx] = true;
            tried_count += 1;
            let entry = &candidates[idx];

            let Some(attempt) = req.try_clone() else {
                break;
            };

            match entry.client.execute(attempt).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    if !is_timeout_error(&err) {
                        tracing::error!(
                            proxy = %entry.descriptor,
                            error = %err,
                            "proxy request failed (not retrying)"
                        );
                        return Err(PoolError::Upstream(err));
                    }

                    tracing::warn!(
                        proxy = %entry.descriptor,
                        tried = tried_count,
                        total = candidates.len(),
                        "proxy timeout, trying next"
                    );
                    entry.set_healthy(false, &err.to_string());
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) => Err(PoolError::AllProxiesFailed(err)),
            None => Err(PoolError::NoProxies),
        }
    }
}

/// True when the error is a timeout anywhere in its chain: reqwest's own
/// timeout classification, an elapsed sleep, or an I/O timed-out kind.
pub fn is_timeout_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return true;
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
