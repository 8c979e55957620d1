//! Transport abstraction for giftsync.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented, and carries whole
//! text frames (one JSON patch batch each):
//! - `connect()` establishes a connection
//! - `send()` transmits one frame
//! - `recv()` waits for the next frame
//! - `close()` gracefully terminates
//!
//! `send()` and `recv()` may run concurrently on the same transport.
//!
//! # Example
//!
//! ```ignore
//! let transport = WsTransport::new();
//! transport.connect("ws://localhost:5001").await?;
//! let snapshot = transport.recv().await?;
//! transport.send(r#"[{"op":"remove","path":["gifts","g1"]}]"#).await?;
//! ```

mod mock;
mod ws;

pub use mock::MockTransport;
pub use ws::{WsTransport, WsTransportConfig};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Transport trait for exchanging patch batch frames with the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the relay at `address` (a `ws://host:port` URL for WebSocket).
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Blocks until a frame is available or the connection closes.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
