//! Cross-origin policy and the coarse referrer gate.
//!
//! The referrer gate is a placeholder access check, not a security
//! boundary: any client can send whatever `Referer` it likes.

use crate::state::AccessPolicy;
use axum::{
    extract::{Request, State},
    http::{HeaderName, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Reject requests whose `Referer` does not start with the allowed prefix.
pub async fn require_referrer(
    State(policy): State<AccessPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let referrer = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());

    if policy.admits(referrer) {
        next.run(request).await
    } else {
        warn!(
            "rejecting {} {} from referrer {:?}",
            request.method(),
            request.uri().path(),
            referrer
        );
        (StatusCode::FORBIDDEN, "Forbidden").into_response()
    }
}

/// Wildcard-origin CORS exposing the range and referrer-policy headers
/// players need to read.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::RANGE,
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::ACCEPT,
            header::PRAGMA,
            header::CACHE_CONTROL,
            header::REFERRER_POLICY,
        ])
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::REFERRER_POLICY,
        ])
}
