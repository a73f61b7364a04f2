//! Client error types.

use insertbuffer_wire::WireError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while submitting a statement.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting, writing, or reading failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The request could not be encoded or the response was malformed.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// The daemon closed the connection without acknowledging.
    #[error("daemon closed the connection without acknowledging the statement")]
    Rejected,
}
