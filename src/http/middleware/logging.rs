//! Request logging.
//!
//! Records method, URL, final status code, and elapsed wall time for every
//! request, including those short-circuited by CORS or access control.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        url = %uri,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "request"
    );
    response
}
