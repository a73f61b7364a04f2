//! Connection state management.
//!
//! Each accepted connection carries exactly one request and one response:
//!
//! ```text
//! ReadingHeader → ReadingPayload → Enqueueing → Responding → Closed
//! ```
//!
//! `Enqueueing` is where a decoded item waits while the queue is full. The
//! state never moves backward.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use mio::net::UnixStream;
use mio::{Interest, Token};

use insertbuffer_wire::{DecodePhase, RequestDecoder, Response};

use crate::error::{ServerError, ServerResult};
use crate::item::WorkItem;

/// Phase of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the 8-byte header.
    ReadingHeader,
    /// Waiting for the payload.
    ReadingPayload,
    /// Request decoded; waiting for room in the queue.
    Enqueueing,
    /// Item enqueued; flushing the response.
    Responding,
    /// Done.
    Closed,
}

impl ConnectionState {
    /// True while the request is still being read.
    pub fn is_reading(self) -> bool {
        matches!(self, Self::ReadingHeader | Self::ReadingPayload)
    }
}

/// State of a client connection.
pub struct Connection {
    token: Token,
    /// Unix stream.
    pub stream: UnixStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: RequestDecoder,
    state: ConnectionState,
    /// Decoded item waiting for room in the queue.
    pending: Option<WorkItem>,
}

impl Connection {
    /// Creates a new connection.
    pub fn new(token: Token, stream: UnixStream, buffer_size: usize, max_payload_size: usize) -> Self {
        Self {
            token,
            stream,
            read_buf: BytesMut::with_capacity(buffer_size),
            write_buf: BytesMut::new(),
            decoder: RequestDecoder::with_max_payload_size(max_payload_size),
            state: ConnectionState::ReadingHeader,
            pending: None,
        }
    }

    /// Returns the connection's poll token.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Returns the connection's phase.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reads at most `limit` bytes from the socket into the read buffer.
    ///
    /// Returns `None` when the socket has nothing more for now and
    /// `Some(0)` when the peer has hung up.
    fn read(&mut self, limit: usize) -> io::Result<Option<usize>> {
        // Use a temporary stack buffer to avoid unsafe
        let mut temp_buf = [0u8; 4096];
        let limit = limit.min(temp_buf.len());

        loop {
            match self.stream.read(&mut temp_buf[..limit]) {
                Ok(n) => {
                    self.read_buf.extend_from_slice(&temp_buf[..n]);
                    return Ok(Some(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes data from the write buffer to the socket.
    ///
    /// Returns `true` if all data was written.
    pub fn write(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    ));
                }
                Ok(n) => {
                    let _ = self.write_buf.split_to(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Socket not ready for writing
                    return Ok(false);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Handles a readable event.
    ///
    /// Reads only what the decoder still needs and decodes after every read,
    /// so a malformed header is rejected before anything behind it is
    /// buffered. Returns the decoded item once the whole request has arrived.
    /// A peer that hangs up before that is reported as `ConnectionClosed`.
    pub fn handle_readable(&mut self) -> ServerResult<Option<WorkItem>> {
        if !self.state.is_reading() {
            return Ok(None);
        }

        loop {
            let wanted = self.decoder.wanted(self.read_buf.len());
            match self.read(wanted)? {
                None => return Ok(None),
                Some(0) => return Err(ServerError::ConnectionClosed),
                Some(_) => {
                    if let Some(item) = self.try_decode()? {
                        self.reject_trailing_bytes()?;
                        return Ok(Some(item));
                    }
                }
            }
        }
    }

    /// Fails if the peer sent anything after its request.
    fn reject_trailing_bytes(&mut self) -> ServerResult<()> {
        let wanted = self.decoder.wanted(self.read_buf.len());
        if let Some(1..) = self.read(wanted)? {
            self.try_decode()?;
        }
        Ok(())
    }

    /// Attempts to decode the request from the read buffer.
    fn try_decode(&mut self) -> ServerResult<Option<WorkItem>> {
        let request = self.decoder.decode(&mut self.read_buf)?;

        self.state = match self.decoder.phase() {
            DecodePhase::Header => ConnectionState::ReadingHeader,
            DecodePhase::Payload { .. } => ConnectionState::ReadingPayload,
            DecodePhase::Complete => ConnectionState::Enqueueing,
        };

        Ok(request.map(WorkItem::from))
    }

    /// Holds a decoded item until the queue has room.
    pub fn park(&mut self, item: WorkItem) {
        self.state = ConnectionState::Enqueueing;
        self.pending = Some(item);
    }

    /// Takes the parked item, if any.
    pub fn take_pending(&mut self) -> Option<WorkItem> {
        self.pending.take()
    }

    /// Queues the "accepted" response.
    pub fn queue_response(&mut self) {
        Response::accepted().encode_into(&mut self.write_buf);
        self.state = ConnectionState::Responding;
    }

    /// Flushes the pending response, moving to `Closed` once it is out.
    ///
    /// Returns `true` when the connection is finished.
    pub fn flush_response(&mut self) -> io::Result<bool> {
        if self.state != ConnectionState::Responding {
            return Ok(false);
        }
        let done = self.write()?;
        if done {
            self.state = ConnectionState::Closed;
        }
        Ok(done)
    }

    /// Returns the interest flags for this connection.
    pub fn interest(&self) -> Interest {
        if self.write_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }
}
