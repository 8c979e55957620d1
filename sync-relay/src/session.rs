//! Per-connection WebSocket session.
//!
//! Each upgraded socket is split into a reader that feeds frames to the
//! relay and a writer task that drains the connection's outbound queue.
//! Whichever finishes first ends the session; the connection is then
//! unregistered and the other half is stopped.

use crate::error::ProtocolError;
use crate::server::{ConnectionId, PatchRelay, PeerHandle, RelayMetrics};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upgrade handler for `/`.
///
/// Connections over the per-IP rate or the global connection cap are
/// refused before the upgrade.
pub async fn ws_handler(
    Extension(relay): Extension<Arc<PatchRelay>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(e) = relay.rate_limits().check_connection(addr.ip()) {
        warn!(%addr, "connection refused: {}", e);
        RelayMetrics::incr(&relay.metrics().rate_limit_hits);
        return (StatusCode::TOO_MANY_REQUESTS, e.to_string()).into_response();
    }

    let max = relay.config().limits.max_connections;
    let live = relay.connection_count().await;
    if live >= max {
        warn!(%addr, live, max, "connection refused: relay is full");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    ws.on_upgrade(move |socket| run(socket, relay, addr))
}

/// Drive one WebSocket until either side ends.
pub async fn run(socket: WebSocket, relay: Arc<PatchRelay>, addr: SocketAddr) {
    let PeerHandle { id, mut outbound } = match relay.on_connect(Some(addr)).await {
        Ok(peer) => peer,
        Err(e) => {
            warn!(%addr, "failed to register connection: {}", e);
            return;
        }
    };

    let (mut ws_tx, ws_rx) = socket.split();

    // Writer task: outbound queue -> socket. Ends when the relay drops the
    // queue's sender (disconnect) or the socket fails.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                debug!(%id, "send failed: {}", e);
                return;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut reader = tokio::spawn(read_loop(ws_rx, relay.clone(), id));

    let writer_done = tokio::select! {
        _ = &mut reader => false,
        _ = &mut writer => {
            debug!(%id, "writer finished first");
            true
        }
    };

    relay.on_disconnect(id).await;
    reader.abort();
    // A completed JoinHandle must not be polled again
    if !writer_done
        && tokio::time::timeout(Duration::from_secs(1), &mut writer)
            .await
            .is_err()
    {
        writer.abort();
    }
}

async fn read_loop(mut ws_rx: SplitStream<WebSocket>, relay: Arc<PatchRelay>, id: ConnectionId) {
    while let Some(msg) = ws_rx.next().await {
        let frame = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    RelayMetrics::incr(&relay.metrics().batches_rejected);
                    warn!(%id, "rejected batch: binary frame is not UTF-8");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            // Pongs are answered by the socket itself
            Ok(_) => continue,
            Err(e) => {
                debug!(%id, "receive failed: {}", e);
                break;
            }
        };

        if !handle_frame(&relay, id, &frame).await {
            break;
        }
    }
}

/// Pass one frame to the relay. Returns `false` if the session should end.
async fn handle_frame(relay: &PatchRelay, id: ConnectionId, frame: &str) -> bool {
    match relay.on_message(id, frame).await {
        Ok(_) => true,
        Err(ProtocolError::ConnectionClosed) => false,
        Err(e) if e.is_recoverable() => {
            warn!(%id, "rejected batch: {}", e);
            true
        }
        Err(e) => {
            warn!(%id, "connection error: {}", e);
            false
        }
    }
}
