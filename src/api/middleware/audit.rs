//! Access logging middleware.
//!
//! Logs every API request with user, method, path, status and latency.
//! Runs innermost (after auth has injected the `Session`). Query strings are
//! left out: they can carry patient search text.

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::session::Session;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_id = req
        .extensions()
        .get::<Session>()
        .map(|s| s.user_id.to_string());
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %method,
        path,
        user_id = user_id.as_deref().unwrap_or("anonymous"),
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "API access"
    );
    response
}
