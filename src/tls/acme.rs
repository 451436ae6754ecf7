//! ACME certificate management (HTTP-01).
//!
//! # Responsibilities
//! - Serve `/.well-known/acme-challenge/` responses on the HTTP-01 port
//! - Order, cache, and renew the certificate for the configured domain
//! - Hand the server a hot-reloadable rustls config
//!
//! # Design Decisions
//! - Issued PEMs are cached under `cache_dir` and reused across restarts
//! - Renewal re-issues once the cached certificate ages past 60 days and
//!   hot-reloads the rustls config without restarting the listener

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use dashmap::DashMap;
use instant_acme::{
    Account, AuthorizationStatus, ChallengeType, Identifier, LetsEncrypt, NewAccount, NewOrder,
    OrderStatus,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::AcmeConfig;
use crate::tls::TlsError;

/// Re-issue once the cached certificate is older than this
/// (Let's Encrypt certificates live 90 days).
const RENEW_AFTER: Duration = Duration::from_secs(60 * 24 * 60 * 60);
const RENEW_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
const ORDER_POLL_LIMIT: u32 = 10;

type ChallengeMap = Arc<DashMap<String, String>>;

/// Orders and renews the certificate for a single domain.
pub struct AcmeManager {
    cfg: AcmeConfig,
    challenges: ChallengeMap,
}

impl AcmeManager {
    pub fn new(cfg: AcmeConfig) -> Self {
        Self {
            cfg,
            challenges: Arc::new(DashMap::new()),
        }
    }

    /// Bind address for the HTTP-01 challenge server (default port 80).
    pub fn http01_addr(&self) -> String {
        let port = self.cfg.http01_port.trim_start_matches(':');
        let port = if port.is_empty() { "80" } else { port };
        format!("0.0.0.0:{port}")
    }

    /// Router answering HTTP-01 challenges for in-flight orders.
    pub fn challenge_router(&self) -> Router {
        Router::new()
            .route("/.well-known/acme-challenge/{token}", get(serve_challenge))
            .with_state(self.challenges.clone())
    }

    /// Load the cached certificate or order a fresh one, as a rustls config
    /// ready for the main listener.
    pub async fn rustls_config(&self) -> Result<RustlsConfig, TlsError> {
        if let Some((cert, key)) = self.load_cached().await? {
            tracing::info!(domain = %self.cfg.domain, "using cached ACME certificate");
            return Ok(RustlsConfig::from_pem(cert, key).await?);
        }

        tracing::info!(domain = %self.cfg.domain, "requesting ACME certificate");
        let (cert, key) = self.issue().await?;
        self.store_cache(&cert, &key).await?;
        Ok(RustlsConfig::from_pem(cert.into_bytes(), key.into_bytes()).await?)
    }

    /// Background renewal: periodically re-issue an aging certificate and
    /// hot-reload `tls`.
    pub fn spawn_renewal(
        self: Arc<Self>,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RENEW_CHECK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The certificate was just loaded or issued; skip the immediate tick.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = interval.tick() => {
                        if self.certificate_is_fresh().await {
                            continue;
                        }
                        tracing::info!(domain = %self.cfg.domain, "renewing ACME certificate");
                        match self.issue().await {
                            Ok((cert, key)) => {
                                if let Err(err) = self.store_cache(&cert, &key).await {
                                    tracing::warn!(error = %err, "failed to cache renewed certificate");
                                }
                                match tls.reload_from_pem(cert.into_bytes(), key.into_bytes()).await {
                                    Ok(()) => tracing::info!(domain = %self.cfg.domain, "reloaded ACME certificate"),
                                    Err(err) => tracing::error!(error = %err, "failed to reload certificate"),
                                }
                            }
                            Err(err) => tracing::error!(error = %err, "acme renewal failed"),
                        }
                    }
                }
            }
        })
    }

    /// Run one HTTP-01 order to completion, returning (certificate chain PEM,
    /// private key PEM). Challenge tokens are published for the duration of
    /// the order.
    async fn issue(&self) -> Result<(String, String), TlsError> {
        let mut tokens = Vec::new();
        let result = self.issue_inner(&mut tokens).await;
        for token in &tokens {
            self.challenges.remove(token);
        }
        result
    }

    async fn issue_inner(&self, tokens: &mut Vec<String>) -> Result<(String, String), TlsError> {
        let contact: Vec<String> = if self.cfg.email.is_empty() {
            Vec::new()
        } else {
            vec![format!("mailto:{}", self.cfg.email)]
        };
        let contact_refs: Vec<&str> = contact.iter().map(String::as_str).collect();

        let (account, _credentials) = Account::create(
            &NewAccount {
                contact: &contact_refs,
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            LetsEncrypt::Production.url(),
            None,
        )
        .await?;

        let identifier = Identifier::Dns(self.cfg.domain.clone());
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &[identifier],
            })
            .await?;

        let authorizations = order.authorizations().await?;
        for authz in &authorizations {
            match authz.status {
                AuthorizationStatus::Valid => continue,
                AuthorizationStatus::Pending => {}
                status => {
                    return Err(TlsError::OrderFailed(format!(
                        "authorization in unexpected state {status:?}"
                    )))
                }
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Http01)
                .ok_or_else(|| TlsError::OrderFailed("no http-01 challenge offered".into()))?;

            let key_auth = order.key_authorization(challenge);
            self.challenges
                .insert(challenge.token.clone(), key_auth.as_str().to_string());
            tokens.push(challenge.token.clone());
            order.set_challenge_ready(&challenge.url).await?;
        }

        let mut attempts = 0;
        let mut delay = Duration::from_millis(500);
        loop {
            tokio::time::sleep(delay).await;
            let state = order.refresh().await?;
            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => break,
                OrderStatus::Invalid => {
                    return Err(TlsError::OrderFailed("order became invalid".into()))
                }
                _ => {}
            }
            attempts += 1;
            if attempts >= ORDER_POLL_LIMIT {
                return Err(TlsError::OrderFailed(
                    "timed out waiting for challenge validation".into(),
                ));
            }
            delay = (delay * 2).min(Duration::from_secs(8));
        }

        let key_pair = rcgen::KeyPair::generate()?;
        let mut params = rcgen::CertificateParams::new(vec![self.cfg.domain.clone()])?;
        params.distinguished_name = rcgen::DistinguishedName::new();
        let csr = params.serialize_request(&key_pair)?;
        order.finalize(csr.der()).await?;

        let mut attempts = 0;
        let cert_chain = loop {
            match order.certificate().await? {
                Some(pem) => break pem,
                None => {
                    attempts += 1;
                    if attempts >= ORDER_POLL_LIMIT {
                        return Err(TlsError::OrderFailed(
                            "timed out waiting for issued certificate".into(),
                        ));
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        };

        Ok((cert_chain, key_pair.serialize_pem()))
    }

    fn cache_paths(&self) -> (PathBuf, PathBuf) {
        let dir = PathBuf::from(&self.cfg.cache_dir);
        (
            dir.join(format!("{}.crt", self.cfg.domain)),
            dir.join(format!("{}.key", self.cfg.domain)),
        )
    }

    async fn certificate_is_fresh(&self) -> bool {
        let (cert_path, _) = self.cache_paths();
        match tokio::fs::metadata(&cert_path).await {
            Ok(meta) => meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .map(|age| age < RENEW_AFTER)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn load_cached(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, TlsError> {
        if !self.certificate_is_fresh().await {
            return Ok(None);
        }
        let (cert_path, key_path) = self.cache_paths();
        let cert = tokio::fs::read(&cert_path).await?;
        match tokio::fs::read(&key_path).await {
            Ok(key) => Ok(Some((cert, key))),
            Err(_) => Ok(None),
        }
    }

    async fn store_cache(&self, cert: &str, key: &str) -> Result<(), TlsError> {
        tokio::fs::create_dir_all(&self.cfg.cache_dir).await?;
        let (cert_path, key_path) = self.cache_paths();
        tokio::fs::write(&cert_path, cert).await?;
        tokio::fs::write(&key_path, key).await?;
        Ok(())
    }
}

async fn serve_challenge(
    State(challenges): State<ChallengeMap>,
    Path(token): Path<String>,
) -> Response {
    match challenges.get(&token) {
        Some(entry) => entry.value().clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(port: &str) -> AcmeManager {
        AcmeManager::new(AcmeConfig {
            enabled: true,
            domain: "proxy.example.com".into(),
            http01_port: port.into(),
            ..Default::default()
        })
    }

    #[test]
    fn http01_addr_defaults_to_port_80() {
        assert_eq!(manager("").http01_addr(), "0.0.0.0:80");
        assert_eq!(manager("80").http01_addr(), "0.0.0.0:80");
        assert_eq!(manager(":8081").http01_addr(), "0.0.0.0:8081");
        assert_eq!(manager("8088").http01_addr(), "0.0.0.0:8088");
    }

    #[test]
    fn cache_paths_are_per_domain() {
        let m = manager("80");
        let (cert, key) = m.cache_paths();
        assert!(cert.ends_with("proxy.example.com.crt"));
        assert!(key.ends_with("proxy.example.com.key"));
    }

    #[tokio::test]
    async fn challenge_router_serves_published_tokens() {
        use tower::ServiceExt;

        let m = manager("80");
        m.challenges
            .insert("tok".to_string(), "tok.keyauth".to_string());
        let router = m.challenge_router();

        let response = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/.well-known/acme-challenge/tok")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let missing = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/.well-known/acme-challenge/other")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
