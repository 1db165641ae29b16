//! Length-prefixed framing for the store protocol.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! MessagePack. Readers call [`body_len`] on the header before allocating.

use crate::WireError;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Maximum frame body size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Prefix `body` with its length.
pub fn encode(body: &[u8]) -> Result<Vec<u8>, WireError> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: body.len(),
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Validate a frame header and return the body length it announces.
pub fn body_len(header: [u8; HEADER_LEN]) -> Result<usize, WireError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}
