//! Request tracking middleware
//!
//! Provides request ID generation, propagation, and header masking. Ids are
//! UUIDv7 strings, so they sort by arrival time in logs.

use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
};
use uuid::Uuid;

use crate::config::RequestTrackingConfig;

/// Sensitive headers that should be masked in logs
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

/// Generates time-ordered request ids
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string())
            .ok()
            .map(RequestId::new)
    }
}

fn request_id_header(config: &RequestTrackingConfig) -> HeaderName {
    HeaderName::try_from(config.request_id_header.as_str()).unwrap_or_else(|_| {
        tracing::warn!(
            header = %config.request_id_header,
            "Invalid request id header name, using x-request-id"
        );
        HeaderName::from_static("x-request-id")
    })
}

/// Layer assigning a request id to requests that carry none
pub fn request_id_layer(config: &RequestTrackingConfig) -> SetRequestIdLayer<MakeRequestUuidV7> {
    SetRequestIdLayer::new(request_id_header(config), MakeRequestUuidV7)
}

/// Layer copying the request id onto the response
pub fn request_id_propagation_layer(config: &RequestTrackingConfig) -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(request_id_header(config))
}

/// Layer marking [`SENSITIVE_HEADERS`] so they are masked in logs
pub fn sensitive_headers_layer() -> SetSensitiveRequestHeadersLayer {
    let headers = SENSITIVE_HEADERS
        .iter()
        .copied()
        .map(HeaderName::from_static)
        .collect::<Vec<_>>();

    SetSensitiveRequestHeadersLayer::new(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_uuids() {
        let request = Request::new(());
        let id = MakeRequestUuidV7.make_request_id(&request).unwrap();
        let parsed = Uuid::parse_str(id.header_value().to_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn test_invalid_header_name_falls_back() {
        let config = RequestTrackingConfig {
            request_id_header: "bad header".to_string(),
            ..RequestTrackingConfig::default()
        };
        assert_eq!(request_id_header(&config), "x-request-id");

        let custom = RequestTrackingConfig {
            request_id_header: "x-correlation-id".to_string(),
            ..RequestTrackingConfig::default()
        };
        assert_eq!(request_id_header(&custom), "x-correlation-id");
    }

    #[test]
    fn test_sensitive_headers_constant() {
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(SENSITIVE_HEADERS.contains(&"x-api-key"));
    }
}
