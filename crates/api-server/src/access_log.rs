use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Logs method, path, status and duration of each request.
///
/// Bodies and query strings are never read here; prediction requests carry
/// personal inputs that must not reach the logs.
pub async fn access_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        "{} {} - Status: {} - Duration: {:.3}s",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64()
    );

    response
}
