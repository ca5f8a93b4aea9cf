//! Response-time instrumentation

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Header carrying the measured handling time
pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Middleware function timing the wrapped stages
///
/// The status logged is the one on the finished response, so early
/// rejections from inner stages are reported as written.
pub async fn response_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;

    let elapsed = start.elapsed();
    let duration_ms = elapsed.as_secs_f64() * 1000.0;
    let status = response.status();

    if let Ok(value) = HeaderValue::from_str(&format!("{:.3}ms", duration_ms)) {
        response.headers_mut().insert(X_RESPONSE_TIME, value);
    }

    tracing::info!(
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        duration_ms,
        "Request completed"
    );

    response
}
