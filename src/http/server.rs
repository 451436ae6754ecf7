//! Listener supervisor.
//!
//! # Responsibilities
//! - Build the Axum router and middleware chain
//! - Pick the serve mode: plain HTTP, static TLS, or ACME-managed TLS
//! - Spawn the pool's probe loop and the ACME challenge server
//! - Drain both servers gracefully on shutdown
//!
//! # Design Decisions
//! - One `axum_server::Handle` per listener; shutdown gives each 5 s to drain
//! - Static certificates win over ACME when both are configured

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tower_http::timeout::TimeoutLayer;
use url::Url;

use crate::config::Config;
use crate::http::middleware::{apply_cors, enforce_access, log_requests};
use crate::lifecycle::Shutdown;
use crate::pool::ProxyPool;
use crate::proxy::ReverseProxy;
use crate::security::access::{AccessControl, AccessError};
use crate::tls::{AcmeManager, TlsError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for server construction and serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid target url: {0}")]
    InvalidTarget(#[from] url::ParseError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("resolve listen address {addr:?}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The HTTP(S) front end: middleware chain, health endpoint, and the
/// reverse-proxy fallback route.
#[derive(Debug)]
pub struct Server {
    cfg: Arc<Config>,
    pool: Arc<ProxyPool>,
    router: Router,
}

impl Server {
    pub fn new(cfg: Config, pool: Arc<ProxyPool>) -> Result<Self, ServerError> {
        let origin = Url::parse(&cfg.target)?;

        // Empty lists permit everything, so the gate can be skipped entirely.
        let access = if cfg.access.allow.is_empty() && cfg.access.block.is_empty() {
            None
        } else {
            Some(Arc::new(AccessControl::new(
                &cfg.access.allow,
                &cfg.access.block,
            )?))
        };

        let proxy = Arc::new(ReverseProxy::new(origin, &cfg, pool.clone()));
        let router = build_router(&cfg, proxy, access);

        Ok(Self {
            cfg: Arc::new(cfg),
            pool,
            router,
        })
    }

    /// Serve until shutdown. Spawns the probe loop and, in ACME mode, the
    /// HTTP-01 challenge server.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), ServerError> {
        let addr = resolve_addr(&self.cfg.listen)?;

        let handle = Handle::new();
        drain_on_shutdown(handle.clone(), shutdown);

        let probe = self.pool.spawn_probe_loop(shutdown.subscribe());

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let result = if self.cfg.tls.has_certificates() {
            tracing::info!("serving TLS with provided certificate");
            let tls =
                RustlsConfig::from_pem_file(&self.cfg.tls.cert_file, &self.cfg.tls.key_file)
                    .await?;
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app)
                .await
        } else if self.cfg.tls.acme.enabled {
            tracing::info!(domain = %self.cfg.tls.acme.domain, "serving TLS via ACME");
            let manager = Arc::new(AcmeManager::new(self.cfg.tls.acme.clone()));
            // The challenge server must be answering before the order starts.
            spawn_challenge_server(&manager, shutdown)?;
            let tls = manager.rustls_config().await?;
            manager.clone().spawn_renewal(tls.clone(), shutdown.subscribe());
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app)
                .await
        } else {
            axum_server::bind(addr).handle(handle).serve(app).await
        };

        self.pool.stop();
        if let Some(probe) = probe {
            let _ = probe.await;
        }

        result.map_err(ServerError::Io)
    }
}

fn build_router(
    cfg: &Config,
    proxy: Arc<ReverseProxy>,
    access: Option<Arc<AccessControl>>,
) -> Router {
    let cors = Arc::new(cfg.cors.clone());

    // Layer order: the last layer added is the outermost, so traffic flows
    // logging → CORS → access control → routes.
    Router::new()
        .route("/healthz", get(healthz))
        .fallback(forward)
        .with_state(proxy)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(from_fn_with_state(access, enforce_access))
        .layer(from_fn_with_state(cors, apply_cors))
        .layer(from_fn(log_requests))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn forward(
    axum::extract::State(proxy): axum::extract::State<Arc<ReverseProxy>>,
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::extract::Request,
) -> axum::response::Response {
    proxy.forward(peer, req).await
}

fn resolve_addr(listen: &str) -> Result<SocketAddr, ServerError> {
    let resolve_err = |source| ServerError::Resolve {
        addr: listen.to_string(),
        source,
    };
    listen
        .to_socket_addrs()
        .map_err(resolve_err)?
        .next()
        .ok_or_else(|| {
            resolve_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses resolved",
            ))
        })
}

fn drain_on_shutdown(handle: Handle, shutdown: &Shutdown) {
    let mut rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = rx.recv().await;
        handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });
}

fn spawn_challenge_server(
    manager: &Arc<AcmeManager>,
    shutdown: &Shutdown,
) -> Result<(), ServerError> {
    let addr = resolve_addr(&manager.http01_addr())?;
    let router = manager.challenge_router();

    let handle = Handle::new();
    drain_on_shutdown(handle.clone(), shutdown);

    tokio::spawn(async move {
        if let Err(err) = axum_server::bind(addr)
            .handle(handle)
            .serve(router.into_make_service())
            .await
        {
            // The main server keeps going without challenge support.
            tracing::error!(error = %err, "acme http server error");
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;

    #[test]
    fn resolves_plain_socket_addrs() {
        assert_eq!(
            resolve_addr("0.0.0.0:8080").unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert!(resolve_addr("not an address").is_err());
    }

    #[test]
    fn construction_rejects_bad_target() {
        let cfg = Config {
            target: "not a url".into(),
            ..Default::default()
        };
        let pool = Arc::new(ProxyPool::new(&ProxyConfig::default()).unwrap());
        assert!(Server::new(cfg, pool).is_err());
    }

    #[test]
    fn construction_rejects_bad_cidr() {
        let mut cfg = Config {
            target: "https://example.com".into(),
            ..Default::default()
        };
        cfg.access.allow = vec!["bogus/99".into()];
        let pool = Arc::new(ProxyPool::new(&ProxyConfig::default()).unwrap());
        let err = Server::new(cfg, pool).unwrap_err();
        assert!(err.to_string().contains("bogus/99"));
    }
}
