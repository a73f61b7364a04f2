//! # insertbuffer-server: statement buffering daemon
//!
//! Clients hand SQL statements to the daemon over a Unix socket and get an
//! acknowledgement as soon as the statement is buffered. A single worker
//! replays buffered statements against the downstream database in arrival
//! order, reconnecting and retrying when the database misbehaves.
//!
//! ## Architecture
//!
//! The listener uses `mio` for non-blocking I/O with a poll-based event
//! loop. The worker is a plain blocking thread. The two meet at a bounded
//! queue, which is the only shared state besides the counters.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      insertbuffer-server                        │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────┐   ┌────────┐ │
//! │  │  Listener   │ → │ BoundedQueue │ → │  Worker  │ → │Backend │ │
//! │  │ (mio poll)  │   │   (FIFO)     │   │ (thread) │   │(SQLite)│ │
//! │  └─────────────┘   └──────────────┘   └──────────┘   └────────┘ │
//! │         ↑ signals, status endpoint                              │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use insertbuffer_server::{Daemon, ServerConfig, SqliteBackend, WorkerConfig};
//!
//! let backend = SqliteBackend::new("/var/lib/shop.db");
//! let daemon = Daemon::new(
//!     ServerConfig::new("/tmp/insertbuffer.socket"),
//!     WorkerConfig::new("shop"),
//!     backend,
//! )?
//! .with_signal_handling()?;
//! daemon.run()?;
//! ```

pub mod backend;
pub mod bounded_queue;
mod config;
mod connection;
mod counters;
mod daemon;
mod error;
mod item;
mod listener;
mod signal;
mod status;
mod worker;

pub use backend::{
    Backend, BackendConnection, BackendError, ConnectionParams, DATABASE_KEY, SqliteBackend,
    SqliteConnection,
};
pub use bounded_queue::{BoundedQueue, PushResult};
pub use config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SOCKET_PATH, ServerConfig, WorkerConfig};
pub use connection::ConnectionState;
pub use counters::{Counter, Counters};
pub use daemon::Daemon;
pub use error::{DaemonError, ServerError, ServerResult};
pub use item::WorkItem;
pub use listener::{Listener, PARKED_RETRY_INTERVAL, ShutdownHandle};
pub use signal::{ShutdownRequest, SignalCoordinator};
pub use status::StatusServer;
pub use worker::{Worker, WorkerError};
