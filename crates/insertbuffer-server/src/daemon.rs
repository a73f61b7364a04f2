//! Wires the listener and the worker together.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::bounded_queue::BoundedQueue;
use crate::config::{ServerConfig, WorkerConfig};
use crate::counters::Counters;
use crate::error::{DaemonError, ServerError, ServerResult};
use crate::item::WorkItem;
use crate::listener::{Listener, ShutdownHandle};
use crate::signal::SignalCoordinator;
use crate::worker::Worker;

/// A bound, not yet running daemon.
///
/// [`Daemon::run`] starts the worker and the listener on their own threads
/// and joins them.
pub struct Daemon<B: Backend> {
    listener: Listener,
    worker: Worker<B>,
    queue: Arc<BoundedQueue<WorkItem>>,
    counters: Arc<Counters>,
}

impl<B: Backend + 'static> Daemon<B> {
    /// Binds the socket and prepares the worker.
    pub fn new(server: ServerConfig, worker: WorkerConfig, backend: B) -> ServerResult<Self> {
        let queue = Arc::new(BoundedQueue::new(server.queue_capacity));
        let counters = Arc::new(Counters::new());
        let coordinator = Arc::new(SignalCoordinator::new());

        let listener = Listener::bind(
            server,
            Arc::clone(&queue),
            Arc::clone(&counters),
            Arc::clone(&coordinator),
        )?;
        let worker = Worker::new(
            worker,
            backend,
            Arc::clone(&queue),
            Arc::clone(&counters),
            coordinator,
        );

        Ok(Self {
            listener,
            worker,
            queue,
            counters,
        })
    }

    /// Routes SIGINT and SIGTERM into shutdown.
    pub fn with_signal_handling(mut self) -> ServerResult<Self> {
        self.listener = self.listener.with_signal_handling()?;
        Ok(self)
    }

    /// Enables the HTTP status endpoint.
    pub fn with_status(mut self, addr: SocketAddr) -> ServerResult<Self> {
        self.listener = self.listener.with_status(addr)?;
        Ok(self)
    }

    /// Shared counters.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Handle for requesting shutdown from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.listener.shutdown_handle()
    }

    /// Path of the listening socket.
    pub fn socket_path(&self) -> &Path {
        self.listener.socket_path()
    }

    /// Bound status endpoint address, if enabled.
    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.listener.status_addr()
    }

    /// Runs until shutdown has been requested and the queue has drained.
    ///
    /// If the worker stops abnormally, the listener is shut down and whatever
    /// is still queued is logged and discarded.
    pub fn run(self) -> Result<(), DaemonError> {
        let Self {
            mut listener,
            worker,
            queue,
            ..
        } = self;
        let handle = listener.shutdown_handle();

        let listener_thread = thread::Builder::new()
            .name("insertbuffer-listener".into())
            .spawn(move || listener.run())
            .map_err(ServerError::from)?;

        let worker_thread = match thread::Builder::new()
            .name("insertbuffer-worker".into())
            .spawn(move || worker.run())
        {
            Ok(thread) => thread,
            Err(e) => {
                handle.stop();
                return Err(ServerError::from(e).into());
            }
        };

        info!("initialized");
        let worker_result: Result<(), DaemonError> = match worker_thread.join() {
            Ok(result) => result.map_err(DaemonError::from),
            Err(_) => Err(ServerError::ThreadPanicked { name: "worker" }.into()),
        };

        handle.stop();
        let listener_result = listener_thread
            .join()
            .unwrap_or(Err(ServerError::ThreadPanicked { name: "listener" }));

        if worker_result.is_err() {
            while let Some(item) = queue.try_pop() {
                warn!(
                    statement = %item.statement_lossy(),
                    "discarding statement after worker failure"
                );
            }
        }

        worker_result?;
        listener_result?;
        Ok(())
    }
}
