//! Unix-socket listener and connection event loop.
//!
//! A single `mio` poll services the listening socket, every client
//! connection, the signal pipe, the optional status endpoint, and a waker
//! used by [`ShutdownHandle`].
//!
//! # Backpressure
//!
//! The event loop never blocks on the queue. When a decoded item does not
//! fit, its connection is parked: it gets no response, and the item waits in
//! a FIFO of parked connections. While anything is parked the poll wakes up
//! every [`PARKED_RETRY_INTERVAL`] and re-offers parked items in order,
//! ahead of any newer item. Parked clients are throttled exactly as a
//! blocking enqueue would throttle them. Other connections keep being
//! accepted and read; their items line up behind the parked ones and are
//! answered in FIFO order once the queue has room. Malformed requests are
//! still rejected right away. Memory stays bounded by the queue
//! capacity plus at most `max_connections` parked items.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use mio::net::UnixListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use crate::bounded_queue::{BoundedQueue, PushResult};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::counters::{Counter, Counters};
use crate::error::{ServerError, ServerResult};
use crate::item::WorkItem;
use crate::signal::SignalCoordinator;
use crate::status::{STATUS_LISTENER_TOKEN, StatusServer};

const LISTENER_TOKEN: Token = Token(0);
const SIGNAL_TOKEN: Token = Token(1);
const WAKER_TOKEN: Token = Token(2);
const FIRST_CONNECTION_TOKEN: usize = 16;

/// How often parked items are re-offered to a full queue.
pub const PARKED_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Handle for requesting shutdown and stopping the event loop from another
/// thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    coordinator: Arc<SignalCoordinator>,
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Records a shutdown request, exactly as a SIGINT/SIGTERM would.
    pub fn request_shutdown(&self) {
        self.coordinator.record();
        self.wake();
    }

    /// Stops the event loop. Shutdown is begun first if it has not been.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake();
    }

    fn wake(&self) {
        if let Err(e) = self.waker.wake() {
            error!(error = %e, "failed to wake listener");
        }
    }
}

/// Accepts client connections and feeds decoded statements into the queue.
pub struct Listener {
    poll: Poll,
    listener: Option<UnixListener>,
    socket_path: PathBuf,
    config: ServerConfig,
    queue: Arc<BoundedQueue<WorkItem>>,
    counters: Arc<Counters>,
    coordinator: Arc<SignalCoordinator>,
    connections: HashMap<Token, Connection>,
    /// Connections whose decoded item waits for room, oldest first.
    parked: VecDeque<Token>,
    next_token: usize,
    accepting: bool,
    /// Connections left in the backlog because `max_connections` was reached.
    backlog_pending: bool,
    signals: Option<signal_hook_mio::v1_0::Signals>,
    status: Option<StatusServer>,
    waker: Arc<Waker>,
    stop: Arc<AtomicBool>,
}

impl Listener {
    /// Binds the listening socket.
    ///
    /// A stale socket file at the configured path is removed first; any other
    /// kind of file there is left alone and fails the bind.
    pub fn bind(
        config: ServerConfig,
        queue: Arc<BoundedQueue<WorkItem>>,
        counters: Arc<Counters>,
        coordinator: Arc<SignalCoordinator>,
    ) -> ServerResult<Self> {
        let socket_path = config.socket_path.clone();
        prepare_socket_path(&socket_path)?;

        let mut listener =
            UnixListener::bind(&socket_path).map_err(|source| ServerError::BindFailed {
                path: socket_path.clone(),
                source,
            })?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        info!(path = %socket_path.display(), "listening");

        Ok(Self {
            poll,
            listener: Some(listener),
            socket_path,
            config,
            queue,
            counters,
            coordinator,
            connections: HashMap::new(),
            parked: VecDeque::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            accepting: true,
            backlog_pending: false,
            signals: None,
            status: None,
            waker,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Routes SIGINT and SIGTERM into the shutdown coordinator.
    pub fn with_signal_handling(mut self) -> ServerResult<Self> {
        use signal_hook::consts::{SIGINT, SIGTERM};

        let mut signals = signal_hook_mio::v1_0::Signals::new([SIGINT, SIGTERM])?;
        self.poll
            .registry()
            .register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;
        self.signals = Some(signals);
        Ok(self)
    }

    /// Serves the counters over HTTP on `addr`.
    pub fn with_status(mut self, addr: SocketAddr) -> ServerResult<Self> {
        let status = StatusServer::bind(addr, self.poll.registry(), Arc::clone(&self.counters))
            .map_err(|source| ServerError::StatusBindFailed {
                addr: addr.to_string(),
                source,
            })?;
        self.status = Some(status);
        Ok(self)
    }

    /// Bound address of the status endpoint, if enabled.
    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status.as_ref().map(StatusServer::local_addr)
    }

    /// Returns a handle that can request shutdown or stop the event loop.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            coordinator: Arc::clone(&self.coordinator),
            stop: Arc::clone(&self.stop),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Path of the listening socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// True until shutdown has begun.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Pushes a statement, blocking while the queue is full.
    pub fn enqueue_statement(
        &self,
        database: impl Into<Bytes>,
        statement: impl Into<Bytes>,
    ) -> ServerResult<()> {
        if !self.accepting {
            return Err(ServerError::Shutdown);
        }
        self.queue
            .push(WorkItem::new(database, statement))
            .map_err(|_| ServerError::Shutdown)
    }

    /// Stops accepting, removes the socket file, drops in-flight connections,
    /// and closes the queue so the worker sees end of stream after draining.
    ///
    /// Idempotent.
    pub fn begin_shutdown(&mut self) {
        if !self.accepting {
            return;
        }
        self.accepting = false;

        if let Some(mut listener) = self.listener.take() {
            if let Err(e) = self.poll.registry().deregister(&mut listener) {
                debug!(error = %e, "failed to deregister listening socket");
            }
        }
        remove_socket_file(&self.socket_path);

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_connection(token);
        }
        self.parked.clear();

        self.queue.close();
        info!("listener closed; queue will drain");
    }

    /// Runs the event loop until [`ShutdownHandle::stop`] is called.
    ///
    /// Shutdown is always begun before returning, so the worker is never
    /// left waiting on a queue nobody will close.
    pub fn run(&mut self) -> ServerResult<()> {
        let result = self.event_loop();
        if let Err(e) = &result {
            error!(error = %e, "listener event loop failed");
        }
        self.begin_shutdown();
        if let Some(status) = self.status.as_mut() {
            status.close_all(self.poll.registry());
        }
        result
    }

    fn event_loop(&mut self) -> ServerResult<()> {
        let mut events = Events::with_capacity(1024);

        while !self.stop.load(Ordering::Acquire) {
            let timeout = if self.parked.is_empty() {
                None
            } else {
                Some(PARKED_RETRY_INTERVAL)
            };

            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in &events {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    SIGNAL_TOKEN => self.handle_signals(),
                    WAKER_TOKEN => {}
                    STATUS_LISTENER_TOKEN => {
                        if let Some(status) = self.status.as_mut() {
                            status.handle_accept(self.poll.registry());
                        }
                    }
                    token if StatusServer::owns(token) => {
                        if let Some(status) = self.status.as_mut() {
                            status.handle_readable(self.poll.registry(), token);
                        }
                    }
                    token => {
                        self.handle_connection_event(token, event.is_readable(), event.is_writable());
                    }
                }
            }

            if self.accepting && self.coordinator.shutdown_requested() {
                self.begin_shutdown();
            }
            self.retry_parked();
            if self.backlog_pending && self.connections.len() < self.config.max_connections {
                self.accept_connections();
            }
        }

        Ok(())
    }

    fn handle_signals(&mut self) {
        let Some(signals) = self.signals.as_mut() else {
            return;
        };
        for signal in signals.pending() {
            debug!(signal, "received signal");
            self.coordinator.record();
        }
    }

    fn accept_connections(&mut self) {
        self.backlog_pending = false;

        loop {
            if self.connections.len() >= self.config.max_connections {
                debug!(
                    max = self.config.max_connections,
                    "connection limit reached; leaving clients in backlog"
                );
                self.backlog_pending = true;
                return;
            }

            let Some(listener) = self.listener.as_ref() else {
                return;
            };

            match listener.accept() {
                Ok((mut stream, _addr)) => {
                    self.counters.increment(Counter::Input);

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        error!(error = %e, "failed to register connection");
                        continue;
                    }

                    let conn = Connection::new(
                        token,
                        stream,
                        self.config.read_buffer_size,
                        self.config.max_payload_size,
                    );
                    self.connections.insert(token, conn);
                    debug!(?token, "accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn handle_connection_event(&mut self, token: Token, readable: bool, writable: bool) {
        if !self.accepting {
            self.close_connection(token);
            return;
        }
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        if readable {
            match conn.handle_readable() {
                Ok(Some(item)) => {
                    self.offer(token, item);
                    return;
                }
                Ok(None) => {}
                Err(ServerError::ConnectionClosed) => {
                    debug!(?token, "peer closed before sending a full request");
                    self.close_connection(token);
                    return;
                }
                Err(e) => {
                    warn!(?token, error = %e, "dropping connection");
                    self.close_connection(token);
                    return;
                }
            }
        }

        if writable {
            self.flush(token);
        }
    }

    /// Enqueues a freshly decoded item, or parks it behind older parked items.
    fn offer(&mut self, token: Token, item: WorkItem) {
        if !self.parked.is_empty() {
            self.park(token, item);
            return;
        }

        match self.queue.try_push(item) {
            PushResult::Ok => self.respond(token),
            PushResult::Backpressure(item) => self.park(token, item),
            PushResult::Closed(_) => self.close_connection(token),
        }
    }

    fn park(&mut self, token: Token, item: WorkItem) {
        if let Some(conn) = self.connections.get_mut(&token) {
            if self.parked.is_empty() {
                debug!(capacity = self.queue.capacity(), "queue full; parking connections");
            }
            conn.park(item);
            self.parked.push_back(token);
        }
    }

    /// Re-offers parked items in arrival order until one does not fit.
    fn retry_parked(&mut self) {
        while let Some(&token) = self.parked.front() {
            let Some(item) = self
                .connections
                .get_mut(&token)
                .and_then(Connection::take_pending)
            else {
                self.parked.pop_front();
                continue;
            };

            match self.queue.try_push(item) {
                PushResult::Ok => {
                    self.parked.pop_front();
                    self.respond(token);
                }
                PushResult::Backpressure(item) => {
                    if let Some(conn) = self.connections.get_mut(&token) {
                        conn.park(item);
                    }
                    return;
                }
                PushResult::Closed(_) => {
                    self.parked.pop_front();
                    self.close_connection(token);
                }
            }
        }
    }

    fn respond(&mut self, token: Token) {
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.queue_response();
        }
        self.flush(token);
    }

    fn flush(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match conn.flush_response() {
            Ok(true) => self.close_connection(token),
            Ok(false) => {
                let interest = conn.interest();
                if let Err(e) = self
                    .poll
                    .registry()
                    .reregister(&mut conn.stream, token, interest)
                {
                    warn!(?token, error = %e, "failed to reregister connection");
                    self.close_connection(token);
                }
            }
            Err(e) => {
                debug!(?token, error = %e, "failed to write response");
                self.close_connection(token);
            }
        }
    }

    fn close_connection(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        if let Some(item) = conn.take_pending() {
            warn!(
                token = ?conn.token(),
                database = %item.database_lossy(),
                statement = %item.statement_lossy(),
                "discarding statement that was never enqueued"
            );
        }
        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            debug!(?token, error = %e, "failed to deregister connection");
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.accepting {
            remove_socket_file(&self.socket_path);
        }
    }
}

/// Removes a stale socket file, refusing to touch anything that is not a socket.
fn prepare_socket_path(path: &Path) -> ServerResult<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(path = %path.display(), "removing stale socket");
            fs::remove_file(path)?;
            Ok(())
        }
        Ok(_) => Err(ServerError::SocketPathOccupied {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_socket_file(path: &Path) {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove socket file");
            }
        }
        _ => {}
    }
}
