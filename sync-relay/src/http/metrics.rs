//! Prometheus metrics endpoint.

use crate::server::PatchRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<PatchRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay).await,
    )
}

async fn render(relay: &PatchRelay) -> String {
    let m = relay.metrics();

    // Gauges: current state
    let connections = relay.connection_count().await;
    let (log_entries, log_patches) = relay.log_size().await;

    // Counters: monotonic since startup
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let accepted = m.batches_accepted.load(Ordering::Relaxed);
    let rejected = m.batches_rejected.load(Ordering::Relaxed);
    let relayed = m.batches_relayed.load(Ordering::Relaxed);
    let bytes_rx = m.bytes_received.load(Ordering::Relaxed);
    let delivery_failures = m.delivery_failures.load(Ordering::Relaxed);
    let compactions = m.compactions_total.load(Ordering::Relaxed);
    let compaction_failures = m.compaction_failures.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);

    format!(
        r#"# HELP giftsync_relay_connections_active Number of live connections
# TYPE giftsync_relay_connections_active gauge
giftsync_relay_connections_active {connections}

# HELP giftsync_relay_log_entries Batches in the patch log
# TYPE giftsync_relay_log_entries gauge
giftsync_relay_log_entries {log_entries}

# HELP giftsync_relay_log_patches Patches in the patch log
# TYPE giftsync_relay_log_patches gauge
giftsync_relay_log_patches {log_patches}

# HELP giftsync_relay_info Server information
# TYPE giftsync_relay_info gauge
giftsync_relay_info{{version="{version}"}} 1

# HELP giftsync_relay_connections_total Total connections registered
# TYPE giftsync_relay_connections_total counter
giftsync_relay_connections_total {conns_total}

# HELP giftsync_relay_batches_accepted_total Batches appended to the log
# TYPE giftsync_relay_batches_accepted_total counter
giftsync_relay_batches_accepted_total {accepted}

# HELP giftsync_relay_batches_rejected_total Batches refused as malformed, oversized or not applicable to the log
# TYPE giftsync_relay_batches_rejected_total counter
giftsync_relay_batches_rejected_total {rejected}

# HELP giftsync_relay_batches_relayed_total Frames queued to receivers
# TYPE giftsync_relay_batches_relayed_total counter
giftsync_relay_batches_relayed_total {relayed}

# HELP giftsync_relay_bytes_received_total Bytes of accepted frames
# TYPE giftsync_relay_bytes_received_total counter
giftsync_relay_bytes_received_total {bytes_rx}

# HELP giftsync_relay_delivery_failures_total Connections dropped on a full or closed queue
# TYPE giftsync_relay_delivery_failures_total counter
giftsync_relay_delivery_failures_total {delivery_failures}

# HELP giftsync_relay_compactions_total Compaction cycles that rewrote the log
# TYPE giftsync_relay_compactions_total counter
giftsync_relay_compactions_total {compactions}

# HELP giftsync_relay_compaction_failures_total Compaction cycles abandoned
# TYPE giftsync_relay_compaction_failures_total counter
giftsync_relay_compaction_failures_total {compaction_failures}

# HELP giftsync_relay_rate_limit_hits_total Connection attempts refused by the per-IP limit
# TYPE giftsync_relay_rate_limit_hits_total counter
giftsync_relay_rate_limit_hits_total {rate_limits}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
