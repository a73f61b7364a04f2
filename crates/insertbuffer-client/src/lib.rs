//! # insertbuffer-client: submit statements to an insertbuffer daemon
//!
//! Each submission opens a fresh connection to the daemon's Unix socket,
//! sends one request, and waits for the acknowledgement. An acknowledgement
//! means the statement is buffered, not that it has been executed.
//!
//! ## Usage
//!
//! ```ignore
//! use insertbuffer_client::Client;
//!
//! let client = Client::new("/tmp/insertbuffer.socket");
//! client.submit("shop", "INSERT INTO visits VALUES (NOW())")?;
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! use insertbuffer_client::{Client, ClientConfig};
//! use std::time::Duration;
//!
//! let config = ClientConfig {
//!     io_timeout: Some(Duration::from_secs(5)),
//! };
//! let client = Client::with_config("/tmp/insertbuffer.socket", config);
//! ```

mod client;
mod error;

pub use client::{Client, ClientConfig};
pub use error::{ClientError, ClientResult};

// Re-export useful types from dependencies
pub use insertbuffer_wire::{PROTOCOL_VERSION, RESULT_ACCEPTED, Response};
