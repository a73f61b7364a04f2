//! Server and worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use insertbuffer_wire::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default path of the listening socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/insertbuffer.socket";

/// Default number of statements the queue can hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20_000;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Filesystem path of the Unix socket.
    pub socket_path: PathBuf,
    /// Maximum number of buffered statements.
    pub queue_capacity: usize,
    /// Maximum number of concurrent client connections.
    pub max_connections: usize,
    /// Largest request payload accepted.
    pub max_payload_size: usize,
    /// Initial read buffer size per connection.
    pub read_buffer_size: usize,
}

impl ServerConfig {
    /// Creates a configuration for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    /// Sets the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the maximum number of concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the largest accepted payload.
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Sets the read buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_connections: 1024,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_buffer_size: 4 * 1024, // 4 KiB
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Database every statement must target.
    pub database: String,
    /// Pause between reconnect attempts.
    pub retry_interval: Duration,
    /// Execution attempts per statement.
    pub max_attempts: u32,
}

impl WorkerConfig {
    /// Creates a configuration for the given database with default retry policy.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retry_interval: Duration::from_secs(1),
            max_attempts: 2,
        }
    }

    /// Sets the pause between reconnect attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the number of execution attempts per statement.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}
