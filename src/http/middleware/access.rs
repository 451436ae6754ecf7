//! Access-control gate.
//!
//! Denied clients get 403 with an opaque body. A missing collaborator
//! bypasses the check entirely.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::security::access::{client_ip, AccessControl};

pub async fn enforce_access(
    State(access): State<Option<Arc<AccessControl>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let Some(access) = access else {
        return next.run(req).await;
    };

    let ip = client_ip(req.headers(), Some(peer));
    if !access.allowed(ip) {
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }
    next.run(req).await
}
