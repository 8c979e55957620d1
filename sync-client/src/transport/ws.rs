//! WebSocket transport over tokio-tungstenite.

use super::{Transport, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// How long to wait for the handshake to finish.
    pub connect_timeout: Duration,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket transport.
///
/// The socket is split so that a task blocked in `recv()` does not hold up
/// `send()`.
pub struct WsTransport {
    config: WsTransportConfig,
    sink: Mutex<Option<SplitSink<Socket, Message>>>,
    stream: Mutex<Option<SplitStream<Socket>>>,
    connected: AtomicBool,
}

impl WsTransport {
    /// Create a transport with default settings.
    pub fn new() -> Self {
        Self::with_config(WsTransportConfig::default())
    }

    /// Create a transport with custom settings.
    pub fn with_config(config: WsTransportConfig) -> Self {
        Self {
            config,
            sink: Mutex::new(None),
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let (socket, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(address))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (sink, stream) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);

        info!("Connected to relay at {}", address);
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;

        if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
            self.mark_closed();
            return Err(TransportError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes)
                        .map_err(|e| TransportError::ReceiveFailed(e.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.mark_closed();
                    return Err(TransportError::ConnectionClosed);
                }
                // Pings are answered by tungstenite on the next write
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.mark_closed();
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("close handshake failed: {}", e);
            }
        }
        Ok(())
    }
}
