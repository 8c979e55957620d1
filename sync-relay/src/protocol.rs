//! Wire framing.
//!
//! There is exactly one message shape in both directions: a JSON array of
//! patch objects sent as a WebSocket text frame. The join snapshot is the
//! whole log flattened into that same shape. No handshake, heartbeat or
//! acknowledgement frames exist.

use sync_types::PatchBatch;

use crate::error::{ProtocolError, ProtocolResult};

/// Default relay port.
pub const DEFAULT_PORT: u16 = 5001;

/// Decode and validate an inbound frame.
///
/// Frames over `max_size` bytes are refused before parsing.
pub fn parse_frame(frame: &str, max_size: usize) -> ProtocolResult<PatchBatch> {
    if frame.len() > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size: frame.len(),
            limit: max_size,
        });
    }
    Ok(PatchBatch::from_json(frame)?)
}

/// Encode the join snapshot. An empty log encodes as `[]`.
pub fn encode_snapshot(flattened: &PatchBatch) -> ProtocolResult<String> {
    Ok(flattened.to_json()?)
}
