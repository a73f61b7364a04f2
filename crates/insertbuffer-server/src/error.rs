//! Server error types.

use std::path::PathBuf;

use insertbuffer_wire::WireError;
use thiserror::Error;

use crate::worker::WorkerError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur on the listener side of the daemon.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Wire protocol error.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection before a full request arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// Bind failed.
    #[error("failed to bind to {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Something other than a socket lives at the configured socket path.
    #[error("refusing to replace {path}: it exists and is not a socket")]
    SocketPathOccupied { path: PathBuf },

    /// Status endpoint could not be bound.
    #[error("failed to bind status endpoint {addr}: {source}")]
    StatusBindFailed {
        addr: String,
        source: std::io::Error,
    },

    /// Listener has begun shutdown and no longer accepts statements.
    #[error("server shutdown")]
    Shutdown,

    /// A daemon thread panicked.
    #[error("{name} thread panicked")]
    ThreadPanicked { name: &'static str },
}

/// Errors that end a daemon run.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The worker stopped abnormally.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The listener failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}
