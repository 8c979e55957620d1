//! Error types for giftsync-relay.

use sync_core::{FixtureError, PatchError};

/// Main error type for relay startup and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Compaction error.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// The bundled base document could not be built.
    #[error("base document: {0}")]
    Fixture(#[from] FixtureError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-connection errors. None of these end the relay.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not a valid patch batch. The batch is dropped and the
    /// connection stays open.
    #[error("malformed patch batch: {reason}")]
    MalformedPatchBatch {
        /// Why the batch was rejected.
        reason: String,
    },

    /// The frame exceeds the configured size limit.
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    MessageTooLarge {
        /// Size of the frame.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// The connection is no longer registered.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection I/O error.
    #[error("connection error: {0}")]
    Connection(String),
}

impl ProtocolError {
    /// Whether the connection should keep reading after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ConnectionClosed | Self::Connection(_))
    }
}

impl From<sync_types::TypesError> for ProtocolError {
    fn from(e: sync_types::TypesError) -> Self {
        Self::MalformedPatchBatch {
            reason: e.to_string(),
        }
    }
}

/// A compaction cycle failed. The log is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    /// Replaying the log failed.
    #[error("replay failed: {0}")]
    Replay(#[from] PatchError),

    /// Replaying the log did not reach the relay's head document.
    #[error("replayed log does not match the head document")]
    Diverged,

    /// The log was rewritten after the cycle took its mark.
    #[error("patch log was rewritten since mark (generation {expected}, now {actual})")]
    Stale {
        /// Generation recorded in the mark.
        expected: u64,
        /// Current generation.
        actual: u64,
    },

    /// The mark covers more batches than the log holds.
    #[error("mark covers {mark} batches but the log holds {len}")]
    MarkOutOfRange {
        /// Batches covered by the mark.
        mark: usize,
        /// Batches in the log.
        len: usize,
    },
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_batch_is_recoverable() {
        let err = ProtocolError::MalformedPatchBatch {
            reason: "batch contains no patches".into(),
        };
        assert!(err.is_recoverable());
        assert!(!ProtocolError::ConnectionClosed.is_recoverable());
    }

    #[test]
    fn types_error_maps_to_malformed_batch() {
        let err: ProtocolError = sync_types::PatchBatch::from_json("[]").unwrap_err().into();
        assert!(matches!(err, ProtocolError::MalformedPatchBatch { .. }));
    }

    #[test]
    fn errors_display() {
        let err = ProtocolError::MessageTooLarge { size: 10, limit: 5 };
        assert_eq!(err.to_string(), "frame too large: 10 bytes (limit: 5 bytes)");
        let err = CompactionError::Stale {
            expected: 1,
            actual: 2,
        };
        assert!(err.to_string().contains("generation 1"));
    }
}
