//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe every entry through its own transport
//! - Drive the Healthy ↔ Unhealthy transitions
//! - Emit one summary log per pass
//!
//! # Design Decisions
//! - Probes use the entry's own client so they traverse the same path as
//!   live traffic
//! - One task per entry per tick, joined before the summary
//! - Direct-only pools skip probing entirely

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use crate::pool::entry::ProxyEntry;
use crate::pool::ProxyPool;

const PROBE_INTERVAL: Duration = Duration::from_secs(300);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Canary endpoint; any 2xx counts as success.
const PROBE_URL: &str = "https://www.google.com/generate_204";

impl ProxyPool {
    /// Spawn the probe loop. Returns `None` for direct pools. The loop runs
    /// until the shutdown signal or the pool's own stop signal fires,
    /// whichever comes first; the first pass starts immediately.
    pub fn spawn_probe_loop(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        if self.is_direct() {
            return None;
        }

        let pool = Arc::clone(self);
        let mut stop = self.stop_signal();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROBE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::debug!("probe loop stopping");
                        return;
                    }
                    _ = stop.changed() => {
                        tracing::debug!("probe loop stopping");
                        return;
                    }
                    _ = interval.tick() => pool.probe_all().await,
                }
            }
        }))
    }

    /// One probe pass: fan out, join, summarize.
    pub(crate) async fn probe_all(&self) {
        let mut tasks = JoinSet::new();
        for entry in self.entries().iter().cloned() {
            tasks.spawn(probe_entry(entry));
        }
        while tasks.join_next().await.is_some() {}

        let total = self.size();
        let healthy = self.healthy_count();
        tracing::info!(
            healthy,
            unhealthy = total - healthy,
            total,
            "proxy pool health check complete"
        );
    }
}

async fn probe_entry(entry: Arc<ProxyEntry>) {
    let result = entry
        .client
        .get(PROBE_URL)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            let was_unhealthy = !entry.is_healthy();
            entry.set_healthy(true, "");
            if was_unhealthy {
                tracing::info!(proxy = %entry.descriptor, "proxy recovered");
            } else {
                tracing::debug!(proxy = %entry.descriptor, "proxy healthy");
            }
        }
        Ok(resp) => {
            let message = format!("unexpected status: {}", resp.status().as_u16());
            entry.set_healthy(false, &message);
            tracing::warn!(proxy = %entry.descriptor, error = %message, "proxy unhealthy");
        }
        Err(err) => {
            entry.set_healthy(false, &err.to_string());
            tracing::warn!(proxy = %entry.descriptor, error = %err, "proxy unhealthy");
        }
    }
}
