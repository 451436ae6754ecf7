//! Reverse-proxy request pipeline.
//!
//! # Responsibilities
//! - Rewrite the request URL onto the origin (scheme, host, path join)
//! - Apply Host/Origin/Referer rewrites and additive headers
//! - Dispatch through the proxy pool; surface 502 on failure
//! - Stream the response body back unchanged
//!
//! # Design Decisions
//! - The body is buffered only when the pool can retry (multiple entries);
//!   single-entry and direct pools stream end to end
//! - Hop-by-hop headers are stripped both ways, except on upgrades

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use url::Url;

use crate::config::{Config, HeaderConfig};
use crate::pool::{PoolError, ProxyPool};
use crate::proxy::websocket;

fn hop_by_hop_headers() -> [HeaderName; 9] {
    [
        header::CONNECTION,
        HeaderName::from_static("proxy-connection"),
        HeaderName::from_static("keep-alive"),
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
}

/// Forwards every request to a single origin through the proxy pool.
pub struct ReverseProxy {
    origin: Url,
    /// The configured target string, used verbatim for Origin/Referer rewrites.
    origin_text: String,
    host_name: Option<String>,
    headers_cfg: HeaderConfig,
    pool: Arc<ProxyPool>,
}

impl ReverseProxy {
    pub fn new(origin: Url, cfg: &Config, pool: Arc<ProxyPool>) -> Self {
        Self {
            origin_text: cfg.target.clone(),
            host_name: match cfg.host_name.as_str() {
                "" => None,
                name => Some(name.to_string()),
            },
            headers_cfg: cfg.headers.clone(),
            origin,
            pool,
        }
    }

    /// Forward one request. Upstream failures become 502 with an opaque body.
    pub async fn forward(&self, peer: SocketAddr, req: Request<Body>) -> Response<Body> {
        let url = req.uri().to_string();
        match self.dispatch(peer, req).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(url = %url, error = %err, "proxy error");
                (StatusCode::BAD_GATEWAY, "proxy error").into_response()
            }
        }
    }

    async fn dispatch(
        &self,
        peer: SocketAddr,
        req: Request<Body>,
    ) -> Result<Response<Body>, PoolError> {
        let upgrading = websocket::is_upgrade_request(req.headers());
        let (mut parts, body) = req.into_parts();

        let on_upgrade = if upgrading {
            parts.extensions.remove::<hyper::upgrade::OnUpgrade>()
        } else {
            None
        };

        let url = self.rewrite_url(parts.uri.path(), parts.uri.query());
        let mut headers = parts.headers;
        self.rewrite_headers(&mut headers, peer, upgrading);

        let mut outbound = reqwest::Request::new(parts.method, url);
        *outbound.headers_mut() = headers;
        if upgrading {
            // Upgrades only exist in HTTP/1.1; an ALPN-negotiated h2
            // connection to the origin cannot carry them.
            *outbound.version_mut() = axum::http::Version::HTTP_11;
        }

        let body_is_empty = http_body::Body::size_hint(&body).exact() == Some(0);
        if self.pool.is_single() {
            // Single attempt: stream the body straight through.
            if !body_is_empty {
                *outbound.body_mut() = Some(reqwest::Body::wrap_stream(body.into_data_stream()));
            }
        } else {
            // Retry is possible: buffer once, before the first attempt, so
            // the bytes can be replayed verbatim on rotation.
            let bytes = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| PoolError::BodyRead(e.to_string()))?;
            if !bytes.is_empty() {
                *outbound.body_mut() = Some(reqwest::Body::from(bytes));
            }
        }

        let upstream = self.pool.execute(outbound).await?;

        if upstream.status() == StatusCode::SWITCHING_PROTOCOLS {
            if let Some(on_upgrade) = on_upgrade {
                return Ok(websocket::tunnel(on_upgrade, upstream));
            }
        }

        Ok(stream_response(upstream))
    }

    /// Place the request path and query onto the origin URL.
    fn rewrite_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.origin.clone();
        url.set_path(&join_paths(self.origin.path(), path));

        let origin_query = self.origin.query().unwrap_or("");
        let request_query = query.unwrap_or("");
        let combined = if origin_query.is_empty() || request_query.is_empty() {
            format!("{origin_query}{request_query}")
        } else {
            format!("{origin_query}&{request_query}")
        };
        url.set_query(if combined.is_empty() {
            None
        } else {
            Some(&combined)
        });
        url
    }

    fn rewrite_headers(&self, headers: &mut HeaderMap, peer: SocketAddr, upgrading: bool) {
        if upgrading {
            // Keep the upgrade handshake intact but normalize Connection.
            headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        } else {
            remove_hop_by_hop(headers);
        }
        // The outbound transport computes its own framing.
        headers.remove(header::CONTENT_LENGTH);

        if self.headers_cfg.rewrite_host {
            set_if_valid(headers, header::HOST, &self.origin_host());
        }

        if self.headers_cfg.rewrite_origin && headers.contains_key(header::ORIGIN) {
            set_if_valid(headers, header::ORIGIN, &self.origin_text);
        }
        if self.headers_cfg.rewrite_referer && headers.contains_key(header::REFERER) {
            set_if_valid(headers, header::REFERER, &self.origin_text);
        }

        for (key, value) in &self.headers_cfg.add {
            if key.trim().is_empty() {
                continue;
            }
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => {
                    tracing::debug!(header = %key, "skipping invalid added header");
                }
            }
        }

        // A static host override wins over everything above.
        if let Some(name) = &self.host_name {
            set_if_valid(headers, header::HOST, name);
        }

        let client_ip = peer.ip().to_string();
        let forwarded = match headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            Some(prior) => format!("{prior}, {client_ip}"),
            None => client_ip,
        };
        set_if_valid(headers, HeaderName::from_static("x-forwarded-for"), &forwarded);
    }

    fn origin_host(&self) -> String {
        let host = self.origin.host_str().unwrap_or_default();
        match self.origin.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

fn stream_response(upstream: reqwest::Response) -> Response<Body> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    remove_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn remove_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by Connection are hop-by-hop too.
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    for name in named {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            headers.remove(name);
        }
    }
    for name in hop_by_hop_headers() {
        headers.remove(name);
    }
}

fn set_if_valid(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => {
            tracing::debug!(header = %name, "skipping unrepresentable header value");
        }
    }
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}
