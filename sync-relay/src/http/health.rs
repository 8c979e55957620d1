//! `GET /health`.

use crate::server::PatchRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the relay answers.
    pub status: &'static str,
    /// Relay version.
    pub version: &'static str,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Batches in the patch log.
    pub log_entries: usize,
    /// Patches across all batches.
    pub log_patches: usize,
    /// Seconds since the relay was created.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Sample the relay.
    pub async fn of(relay: &PatchRelay) -> Self {
        let (log_entries, log_patches) = relay.log_size().await;
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            connections: relay.connection_count().await,
            log_entries,
            log_patches,
            uptime_seconds: relay.uptime().as_secs(),
        }
    }
}

pub(crate) async fn health_handler(
    Extension(relay): Extension<Arc<PatchRelay>>,
) -> Json<HealthStatus> {
    Json(HealthStatus::of(&relay).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn reports_connections_and_log_shape() {
        let relay = PatchRelay::new(Config::default()).unwrap();
        let peer = relay.on_connect(None).await.unwrap();
        relay
            .on_message(
                peer.id,
                r#"[{"op":"remove","path":["gifts","immer_book"]},{"op":"remove","path":["gifts","coffee_mug"]}]"#,
            )
            .await
            .unwrap();

        let status = HealthStatus::of(&relay).await;
        assert_eq!(status.connections, 1);
        assert_eq!((status.log_entries, status.log_patches), (1, 2));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["log_patches"], 2);
    }
}
