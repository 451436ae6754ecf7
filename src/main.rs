//! CLI entry point: parse flags, load the layered config, wire the pool and
//! server together, and run until SIGINT/SIGTERM.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sockstream::config::{self, Overrides};
use sockstream::http::Server;
use sockstream::lifecycle::{shutdown_signal, Shutdown};
use sockstream::observability::logging;
use sockstream::pool::ProxyPool;

const ENV_PREFIX: &str = "SOCKSTREAM";

#[derive(Parser)]
#[command(name = "sockstream")]
#[command(about = "Lightweight reverse proxy with an upstream SOCKS5/HTTP proxy pool")]
struct Cli {
    /// Path to config file (yaml or toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long)]
    listen: Option<String>,

    /// Override the outgoing Host header to this value
    #[arg(long)]
    host_name: Option<String>,

    /// Target URL to proxy to
    #[arg(long)]
    target: Option<String>,

    /// Upstream proxy type (socks5/http/https)
    #[arg(long)]
    proxy_type: Option<String>,

    /// Upstream proxy address host:port
    #[arg(long)]
    proxy_address: Option<String>,

    /// Upstream proxy username
    #[arg(long)]
    proxy_user: Option<String>,

    /// Upstream proxy password
    #[arg(long)]
    proxy_pass: Option<String>,

    /// Allow CIDR (can repeat)
    #[arg(long = "allow")]
    allow: Vec<String>,

    /// Allowed CORS origin (can repeat)
    #[arg(long = "cors-origin")]
    cors_origin: Vec<String>,

    /// Header to add, key=value (can repeat)
    #[arg(long = "add-header")]
    add_header: Vec<String>,

    /// Path to TLS certificate
    #[arg(long)]
    tls_cert: Option<String>,

    /// Path to TLS private key
    #[arg(long)]
    tls_key: Option<String>,

    /// Enable ACME and set the domain
    #[arg(long)]
    acme_domain: Option<String>,

    /// ACME registration email
    #[arg(long)]
    acme_email: Option<String>,

    /// ACME cache directory
    #[arg(long)]
    acme_cache: Option<String>,

    /// Disable rewriting the Host header to the target
    #[arg(long)]
    no_rewrite_host: bool,
}

impl Cli {
    fn into_overrides(self) -> (Option<PathBuf>, Overrides) {
        let overrides = Overrides {
            listen: self.listen,
            host_name: self.host_name,
            target: self.target,
            proxy_type: self.proxy_type,
            proxy_address: self.proxy_address,
            proxy_username: self.proxy_user,
            proxy_password: self.proxy_pass,
            allow_cidrs: self.allow,
            cors_origins: self.cors_origin,
            add_headers: parse_header_pairs(&self.add_header),
            tls_cert_file: self.tls_cert,
            tls_key_file: self.tls_key,
            acme_domain: self.acme_domain,
            acme_email: self.acme_email,
            acme_cache_dir: self.acme_cache,
            disable_rewrite_host: self.no_rewrite_host,
        };
        (self.config, overrides)
    }
}

fn parse_header_pairs(values: &[String]) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for pair in values {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !key.is_empty() {
            headers.insert(key.to_string(), value.trim().to_string());
        }
    }
    headers
}

#[tokio::main]
async fn main() {
    let (config_path, overrides) = Cli::parse().into_overrides();

    let cfg = match config::load(config_path.as_deref(), ENV_PREFIX, overrides) {
        Ok(cfg) => cfg,
        Err(err) => {
            logging::init("info");
            tracing::error!(error = %err, "failed to load config");
            std::process::exit(1);
        }
    };

    logging::init(&cfg.logging.level);

    let pool = match ProxyPool::new(&cfg.proxy) {
        Ok(pool) => Arc::new(pool),
        Err(err) => {
            tracing::error!(error = %err, "failed to create proxy pool");
            std::process::exit(1);
        }
    };

    tracing::info!(listen = %cfg.listen, target = %cfg.target, "starting server");
    if !cfg.proxy.kind.is_empty() {
        tracing::info!(
            kind = %cfg.proxy.kind,
            address = %cfg.proxy.address,
            "using upstream proxy"
        );
    }
    if pool.size() > 1 {
        tracing::info!(proxies = pool.size(), "using upstream proxy pool");
    }

    let server = match Server::new(cfg, pool) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to init server");
            std::process::exit(1);
        }
    };

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.trigger();
    });

    if let Err(err) = server.run(&shutdown).await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }

    tracing::info!("shutdown complete");
}
