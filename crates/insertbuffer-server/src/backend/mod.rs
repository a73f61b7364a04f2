//! Downstream database backends.
//!
//! The worker only needs three operations from a backend: connect, execute
//! one statement, and close. Statements are opaque bytes; interpreting them
//! is entirely the backend's business.

mod params;
mod sqlite;

use thiserror::Error;

pub use params::{ConnectionParams, DATABASE_KEY};
pub use sqlite::{SqliteBackend, SqliteConnection};

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Could not establish a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A statement failed.
    #[error("execute failed: {0}")]
    Execute(String),

    /// Closing the connection failed.
    #[error("close failed: {0}")]
    Close(String),

    /// Connection parameters lack the mandatory database key.
    #[error("connection parameters must include `{key}=<name>`", key = DATABASE_KEY)]
    MissingDatabase,

    /// A connection parameter is malformed.
    #[error("invalid connection parameter {0:?}")]
    InvalidParameter(String),
}

/// Opens connections to the downstream database.
pub trait Backend: Send {
    /// Connection type produced by this backend.
    type Connection: BackendConnection;

    /// Opens a new connection.
    fn connect(&mut self) -> Result<Self::Connection, BackendError>;
}

/// A live connection to the downstream database.
pub trait BackendConnection: Send {
    /// Executes one statement to completion.
    fn execute(&mut self, statement: &[u8]) -> Result<(), BackendError>;

    /// Closes the connection.
    fn close(self) -> Result<(), BackendError>;
}
