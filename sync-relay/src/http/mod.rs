//! HTTP endpoints for giftsync-relay.
//!
//! The WebSocket upgrade is served on `/` next to the health and metrics
//! endpoints, all on the relay port.

pub mod health;
mod metrics;

use crate::server::PatchRelay;
use crate::session;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
///
/// `/metrics` is only routed when `http.metrics_enabled` is set.
pub fn build_router(relay: Arc<PatchRelay>) -> Router {
    let mut router = Router::new()
        .route("/", get(session::ws_handler))
        .route("/health", get(health::health_handler));
    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }
    router.layer(Extension(relay))
}
