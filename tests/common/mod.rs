//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Request;
use axum::response::Json;
use axum::Router;

/// Record of what a mock origin observed for one request.
pub type SeenRequests = Arc<Mutex<Vec<String>>>;

/// Start a mock origin on an ephemeral port that echoes the request back as
/// JSON (method, path, query, selected headers, body). Returns the bound
/// address and the log of raw bodies it received.
pub async fn start_echo_origin(delay: Duration) -> (SocketAddr, SeenRequests) {
    let seen: SeenRequests = Arc::new(Mutex::new(Vec::new()));
    let seen_handler = seen.clone();

    let handler = move |req: Request| {
        let seen = seen_handler.clone();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let (parts, body) = req.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let body = String::from_utf8_lossy(&body).to_string();
            seen.lock().unwrap().push(body.clone());

            let header = |name: &str| {
                parts
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };

            Json(serde_json::json!({
                "method": parts.method.as_str(),
                "path": parts.uri.path(),
                "query": parts.uri.query().unwrap_or_default(),
                "host": header("host"),
                "x_forwarded_for": header("x-forwarded-for"),
                "x_proxy_id": header("x-proxy-id"),
                "x_injected": header("x-injected"),
                "origin": header("origin"),
                "body": body,
            }))
        }
    };

    let router = Router::new().fallback(handler);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service()).await;
    });

    (addr, seen)
}

/// Build a reqwest request for driving `ProxyPool::execute` directly.
#[allow(dead_code)]
pub fn pool_request(method: reqwest::Method, url: &str, body: Option<&str>) -> reqwest::Request {
    let mut req = reqwest::Request::new(method, url.parse().unwrap());
    if let Some(body) = body {
        *req.body_mut() = Some(reqwest::Body::from(body.to_string()));
    }
    req
}

/// A plain client that tags its requests so the echo origin can report which
/// pool entry carried them.
#[allow(dead_code)]
pub fn tagged_client(id: &str, timeout: Option<Duration>) -> reqwest::Client {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        "x-proxy-id",
        axum::http::HeaderValue::from_str(id).unwrap(),
    );
    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .no_proxy();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap()
}

/// Client for talking to the proxy under test.
#[allow(dead_code)]
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Extract a string field from an echo-origin JSON response.
#[allow(dead_code)]
pub fn field(value: &serde_json::Value, name: &str) -> String {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
