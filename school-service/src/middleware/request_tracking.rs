//! Request ID generation and header management

use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
};

/// Headers that should be masked in logs
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

/// Generates a random UUID v4 request ID
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeUuidRequestId;

impl MakeRequestId for MakeUuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Set `x-request-id` on requests that arrive without one
pub fn request_id_layer() -> SetRequestIdLayer<MakeUuidRequestId> {
    SetRequestIdLayer::x_request_id(MakeUuidRequestId)
}

/// Copy `x-request-id` from the request onto the response
pub fn request_id_propagation_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Mark [`SENSITIVE_HEADERS`] so trace output hides their values
pub fn sensitive_headers_layer() -> SetSensitiveRequestHeadersLayer {
    let headers: Vec<HeaderName> = SENSITIVE_HEADERS
        .iter()
        .map(|&h| HeaderName::from_static(h))
        .collect();

    SetSensitiveRequestHeadersLayer::new(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(request_id_propagation_layer())
            .layer(request_id_layer())
    }

    #[tokio::test]
    async fn test_generated_request_id_is_uuid() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_kept() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "caller-supplied")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "caller-supplied");
    }

    #[test]
    fn test_sensitive_headers_are_valid_names() {
        let _layer = sensitive_headers_layer();
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
    }
}
