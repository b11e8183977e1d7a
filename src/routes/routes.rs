//! Defines routes for the media relay.
//!
//! ## Structure
//! - **Relay endpoints** (behind the referrer gate)
//!   - `POST /upload`      multipart upload, field `file`
//!   - `GET  /video/{key}` ranged read, `Range` header required
//!
//! - **Probes** (no referrer required)
//!   - `GET /healthz`
//!   - `GET /readyz`
//!
//! CORS wraps everything, so preflight requests are answered before the
//! referrer gate sees them.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{stream_video, upload_object},
    },
    middleware::{cors_layer, require_referrer},
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the full router with state attached.
pub fn routes(state: AppState) -> Router {
    let relay = Router::new()
        .route(
            "/upload",
            post(upload_object).layer(DefaultBodyLimit::max(state.upload_limit)),
        )
        .route("/video/{key}", get(stream_video))
        .route_layer(from_fn_with_state(state.clone(), require_referrer));

    let probes = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz));

    Router::new()
        .merge(probes)
        .merge(relay)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
