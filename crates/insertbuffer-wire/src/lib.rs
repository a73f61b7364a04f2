//! # insertbuffer-wire: binary wire protocol
//!
//! Framing for the one-shot exchange between a client and the insertbuffer
//! daemon. Every connection carries exactly one request and one response;
//! there is no pipelining and no connection reuse.
//!
//! ## Request Format
//!
//! ```text
//! ┌──────────────┬──────────────────┬─────────────────┬──────────┬─────────────────┐
//! │ version (4B) │ payload_len (4B) │ database_len(4B)│ database │ statement       │
//! │ u32 LE       │ u32 LE           │ u32 LE          │ bytes    │ remaining bytes │
//! └──────────────┴──────────────────┴─────────────────┴──────────┴─────────────────┘
//!                                    └──────────── payload_len bytes ─────────────┘
//! ```
//!
//! ## Response Format
//!
//! ```text
//! ┌──────────────┬─────────────┐
//! │ version (4B) │ result (4B) │
//! │ u32 LE       │ u32 LE      │
//! └──────────────┴─────────────┘
//! ```
//!
//! The database name and statement are opaque byte strings. The daemon
//! answers [`RESULT_ACCEPTED`] once the statement is buffered; this is not a
//! commit acknowledgment.

mod decoder;
mod error;
mod message;

pub use decoder::{DecodePhase, RequestDecoder};
pub use error::{WireError, WireResult};
pub use message::{Request, RequestHeader, Response};

/// The only protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the request header: version + payload length.
pub const HEADER_SIZE: usize = 8;

/// Size of the database length prefix at the start of the payload.
pub const DATABASE_LEN_SIZE: usize = 4;

/// Size of a response: version + result code.
pub const RESPONSE_SIZE: usize = 8;

/// Result code sent once a statement has been accepted for buffering.
pub const RESULT_ACCEPTED: u32 = 1;

/// Default upper bound on a request payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
