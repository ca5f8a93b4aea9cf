//! Gzip response compression
//!
//! Built on `tower_http::compression`. The layer always calls the inner
//! service; only the response body is wrapped, and only when the caller
//! advertised gzip with a non-zero quality.

use tower_http::compression::{predicate::SizeAbove, CompressionLayer};

/// Smallest body that gets compressed
///
/// Any non-empty body qualifies; empty ones (204, HEAD) pass through untouched.
pub const MIN_COMPRESSED_SIZE: u16 = 1;

/// Gzip-only compression layer for the pipeline's compression stage
pub fn compression_layer() -> CompressionLayer<SizeAbove> {
    CompressionLayer::new()
        .gzip(true)
        .no_br()
        .no_deflate()
        .no_zstd()
        .compress_when(SizeAbove::new(MIN_COMPRESSED_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        routing::get,
        Router,
    };
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tower::ServiceExt;

    fn payload() -> String {
        (0..500)
            .map(|i| format!("teacher-{}:Math;", i))
            .collect::<String>()
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { payload() }))
            .route("/short", get(|| async { "ok" }))
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
            .layer(compression_layer())
    }

    fn request(uri: &str, accept_encoding: Option<&'static str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = accept_encoding {
            builder = builder.header(header::ACCEPT_ENCODING, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn gunzip(response: axum::response::Response) -> String {
        let compressed = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        decoded
    }

    #[tokio::test]
    async fn test_gzip_body_decompresses_to_original() {
        let response = app()
            .oneshot(request("/", Some("deflate, gzip;q=0.8")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert!(!response.headers().contains_key(header::CONTENT_LENGTH));
        assert_eq!(gunzip(response).await, payload());
    }

    #[tokio::test]
    async fn test_small_body_still_compressed() {
        let response = app().oneshot(request("/short", Some("gzip"))).await.unwrap();

        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(gunzip(response).await, "ok");
    }

    #[tokio::test]
    async fn test_no_accept_encoding_passes_through() {
        let response = app().oneshot(request("/", None)).await.unwrap();

        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, payload().as_bytes());
    }

    #[tokio::test]
    async fn test_gzip_with_zero_quality_not_used() {
        let response = app().oneshot(request("/", Some("gzip;q=0"))).await.unwrap();
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[tokio::test]
    async fn test_no_content_is_left_alone() {
        let response = app().oneshot(request("/empty", Some("gzip"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
    }
}
