//! Incremental request decoder.
//!
//! Bytes arrive in arbitrary chunks as the socket becomes readable. The
//! decoder consumes them from the connection's read buffer only once a whole
//! stage (header, then payload) is available, so partial data simply stays
//! buffered until the next readiness event.

use bytes::BytesMut;

use crate::error::{WireError, WireResult};
use crate::message::{Request, RequestHeader};
use crate::{DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};

/// Decode progress of a single request. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePhase {
    /// Waiting for the 8-byte header.
    Header,
    /// Header accepted, waiting for `len` payload bytes.
    Payload { len: usize },
    /// The request has been produced.
    Complete,
}

/// Decoder for exactly one request per connection.
#[derive(Debug)]
pub struct RequestDecoder {
    phase: DecodePhase,
    max_payload_size: usize,
}

impl RequestDecoder {
    /// Creates a decoder with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload_size(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Creates a decoder that rejects payloads larger than `max_payload_size`.
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            phase: DecodePhase::Header,
            max_payload_size,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> DecodePhase {
        self.phase
    }

    /// Returns true once the request has been produced.
    pub fn is_complete(&self) -> bool {
        self.phase == DecodePhase::Complete
    }

    /// Number of bytes to read next, given `buffered` unconsumed bytes.
    ///
    /// Never more than the current stage needs: the rest of the header, then
    /// the rest of the payload. Once complete, a single byte is enough to
    /// detect trailing data.
    pub fn wanted(&self, buffered: usize) -> usize {
        let needed = match self.phase {
            DecodePhase::Header => HEADER_SIZE.saturating_sub(buffered),
            DecodePhase::Payload { len } => len.saturating_sub(buffered),
            DecodePhase::Complete => 0,
        };
        needed.max(1)
    }

    /// Advances as far as the buffered bytes allow.
    ///
    /// Returns `Ok(Some(request))` exactly once, when the payload completes.
    /// Returns `Ok(None)` while more bytes are needed. Any byte arriving after
    /// the request is complete is a protocol error, since the exchange is
    /// one-shot.
    pub fn decode(&mut self, buf: &mut BytesMut) -> WireResult<Option<Request>> {
        loop {
            match self.phase {
                DecodePhase::Header => {
                    if buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }
                    let mut raw = [0u8; HEADER_SIZE];
                    raw.copy_from_slice(&buf.split_to(HEADER_SIZE));
                    let len = RequestHeader::parse(raw).validate(self.max_payload_size)?;
                    self.phase = DecodePhase::Payload { len };
                }
                DecodePhase::Payload { len } => {
                    if buf.len() < len {
                        return Ok(None);
                    }
                    let payload = buf.split_to(len).freeze();
                    let request = Request::decode_payload(payload)?;
                    self.phase = DecodePhase::Complete;
                    if !buf.is_empty() {
                        return Err(WireError::TrailingBytes(buf.len()));
                    }
                    return Ok(Some(request));
                }
                DecodePhase::Complete => {
                    if !buf.is_empty() {
                        return Err(WireError::TrailingBytes(buf.len()));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}
