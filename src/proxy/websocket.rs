//! WebSocket and generic upgrade pass-through.
//!
//! The pipeline adds nothing beyond the header rewrites: once the origin
//! answers 101, the inbound and outbound connections are hijacked and bytes
//! are copied both ways until either side closes.

use axum::body::Body;
use axum::http::{header, HeaderMap, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

/// True when the request carries an upgrade handshake
/// (`Connection: upgrade` plus an `Upgrade` header).
pub(crate) fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false);
    connection_upgrade && headers.contains_key(header::UPGRADE)
}

/// Answer the client with the origin's 101 and bridge the two upgraded
/// connections in a background task.
pub(crate) fn tunnel(on_upgrade: OnUpgrade, upstream: reqwest::Response) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *response.headers_mut() = upstream.headers().clone();

    tokio::spawn(async move {
        let mut upstream_io = match upstream.upgrade().await {
            Ok(io) => io,
            Err(err) => {
                tracing::error!(error = %err, "upstream upgrade failed");
                return;
            }
        };
        let client_io = match on_upgrade.await {
            Ok(io) => io,
            Err(err) => {
                tracing::error!(error = %err, "client upgrade failed");
                return;
            }
        };
        let mut client_io = TokioIo::new(client_io);

        match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
            Ok((to_upstream, to_client)) => {
                tracing::debug!(to_upstream, to_client, "upgraded connection closed");
            }
            Err(err) => {
                tracing::debug!(error = %err, "upgraded connection ended with error");
            }
        }
    });

    response
}
