//! Wire protocol error types.

use thiserror::Error;

use crate::PROTOCOL_VERSION;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The peer speaks a protocol version we do not support.
    #[error("unsupported protocol version {0} (expected {expected})", expected = PROTOCOL_VERSION)]
    UnsupportedVersion(u32),

    /// The payload cannot even hold the database length prefix.
    #[error("payload of {len} bytes is too short for the database length prefix")]
    PayloadTooShort { len: usize },

    /// The database length prefix points past the end of the payload.
    #[error("database length {database_len} exceeds payload length {payload_len}")]
    DatabaseLengthOverflow {
        database_len: usize,
        payload_len: usize,
    },

    /// The payload is larger than the configured limit.
    #[error("payload of {len} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    /// Bytes arrived after a complete request.
    #[error("{0} unexpected bytes after a complete request")]
    TrailingBytes(usize),

    /// A response shorter than the fixed response size.
    #[error("response too short: got {0} bytes")]
    ResponseTooShort(usize),

    /// A response carrying a result code other than "accepted".
    #[error("unknown result code {0}")]
    UnknownResult(u32),
}
