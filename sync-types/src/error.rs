//! Error types for giftsync wire handling.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or validating wire data.
#[derive(Debug, Error)]
pub enum TypesError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Structurally invalid patch batch
    #[error("malformed patch batch: {reason}")]
    MalformedBatch {
        /// What made the batch invalid.
        reason: String,
    },
}

impl TypesError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedBatch {
            reason: reason.into(),
        }
    }
}
