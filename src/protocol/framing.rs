//! Length-prefixed framing for the coordination stream.
//!
//! Wire format:
//! ```text
//! [len:i32-LE][payload: len bytes]
//! ```
//!
//! A declared length of zero, a negative length, or anything above
//! [`MAX_FRAME_LEN`] is a protocol violation. Partial frames are never
//! delivered: the buffer keeps accumulating until a whole frame is present.

use thiserror::Error;

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload a single frame may carry.
pub const MAX_FRAME_LEN: usize = 10_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Bad frame length {0}")]
    BadLength(i64),
}

/// Prefix `payload` with its little-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() || payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::BadLength(payload.len() as i64));
    }

    let len = payload.len() as i32;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Receive buffer for one stream connection.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(8192),
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pull one complete frame off the front of the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed; nothing is consumed in
    /// that case. Call repeatedly until it returns `Ok(None)` to drain every
    /// frame delivered by a single read.
    pub fn try_extract(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = i32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if len <= 0 || len as usize > MAX_FRAME_LEN {
            return Err(FrameError::BadLength(len as i64));
        }

        let total = HEADER_LEN + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload = self.buf[HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(payload))
    }
}
