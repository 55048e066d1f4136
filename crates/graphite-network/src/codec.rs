//! Newline-delimited JSON framing.
//!
//! One message per line. Lines that fail to parse as a known message are
//! dropped silently; a line (or an unterminated buffer) growing past the
//! frame cap is a fatal decode error, which closes the peer.

use crate::{NetworkError, WireMessage};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Default frame cap: 4 MiB.
pub const DEFAULT_MAX_FRAME: usize = 4 * 1024 * 1024;

/// Codec for the line-oriented wire protocol.
pub struct WireCodec {
    max_frame: usize,
}

impl WireCodec {
    /// Codec with the default frame cap.
    pub fn new() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    /// Codec with an explicit frame cap.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = WireMessage;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WireMessage>, NetworkError> {
        loop {
            match src.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    if pos + 1 > self.max_frame {
                        return Err(NetworkError::FrameTooLarge(pos + 1));
                    }
                    let line = src.split_to(pos + 1);
                    let line = &line[..pos];
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice(line) {
                        Ok(message) => return Ok(Some(message)),
                        Err(e) => {
                            // Invalid JSON lines are dropped, not fatal.
                            debug!(error = %e, "dropping unparseable frame");
                            continue;
                        }
                    }
                }
                None if src.len() > self.max_frame => {
                    return Err(NetworkError::FrameTooLarge(src.len()));
                }
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<WireMessage> for WireCodec {
    type Error = NetworkError;

    fn encode(&mut self, message: WireMessage, dst: &mut BytesMut) -> Result<(), NetworkError> {
        let json = serde_json::to_vec(&message).map_err(|e| NetworkError::Encode(e.to_string()))?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
