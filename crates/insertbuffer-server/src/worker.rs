//! Replay worker.
//!
//! The worker is the only component that talks to the backend. It pops
//! statements in FIFO order and executes each one, reconnecting as needed.
//! A statement gets `max_attempts` executions; after that it is counted as
//! an error and skipped. While the backend is unreachable the worker keeps
//! retrying, unless the user has asked for shutdown more than once, in which
//! case everything still buffered is logged and discarded.

use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendConnection, BackendError};
use crate::bounded_queue::BoundedQueue;
use crate::config::WorkerConfig;
use crate::counters::{Counter, Counters};
use crate::item::WorkItem;
use crate::signal::SignalCoordinator;

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A statement targets a database other than the configured one.
    #[error("statement targets database {actual:?}, expected {expected:?}")]
    DatabaseMismatch { expected: String, actual: String },

    /// The backend stayed unreachable and the user insisted on shutdown.
    #[error("gave up on unreachable backend, discarded {discarded} statement(s)")]
    GaveUp {
        discarded: usize,
        #[source]
        source: BackendError,
    },
}

enum Outcome {
    Executed,
    Failed(BackendError),
}

/// Executes buffered statements against a backend.
pub struct Worker<B: Backend> {
    backend: B,
    connection: Option<B::Connection>,
    queue: Arc<BoundedQueue<WorkItem>>,
    counters: Arc<Counters>,
    coordinator: Arc<SignalCoordinator>,
    config: WorkerConfig,
}

impl<B: Backend> Worker<B> {
    /// Creates a worker. No connection is opened until [`Worker::run`].
    pub fn new(
        config: WorkerConfig,
        backend: B,
        queue: Arc<BoundedQueue<WorkItem>>,
        counters: Arc<Counters>,
        coordinator: Arc<SignalCoordinator>,
    ) -> Self {
        Self {
            backend,
            connection: None,
            queue,
            counters,
            coordinator,
            config,
        }
    }

    /// True while a backend connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Opens the backend connection once. Failure is logged, not fatal:
    /// the first statement retries it.
    pub fn connect_eagerly(&mut self) {
        if self.connection.is_some() {
            return;
        }
        match self.backend.connect() {
            Ok(conn) => {
                info!(database = %self.config.database, "connected to backend");
                self.connection = Some(conn);
            }
            Err(e) => warn!(error = %e, "initial backend connection failed, will retry"),
        }
    }

    /// Processes statements until the queue is closed and drained.
    pub fn run(mut self) -> Result<(), WorkerError> {
        self.connect_eagerly();

        let mut result = Ok(());
        while let Some(item) = self.queue.pop() {
            if let Err(e) = self.process(&item) {
                result = Err(e);
                break;
            }
        }

        self.disconnect();
        if result.is_ok() {
            info!("terminated");
        }
        result
    }

    fn process(&mut self, item: &WorkItem) -> Result<(), WorkerError> {
        if item.database() != self.config.database.as_bytes() {
            return Err(WorkerError::DatabaseMismatch {
                expected: self.config.database.clone(),
                actual: item.database_lossy().into_owned(),
            });
        }

        match self.execute(item)? {
            Outcome::Executed => self.counters.increment(Counter::Output),
            Outcome::Failed(e) => {
                self.counters.increment(Counter::Error);
                error!(
                    statement = %item.statement_lossy(),
                    error = %e,
                    "could not execute statement"
                );
            }
        }
        Ok(())
    }

    fn execute(&mut self, item: &WorkItem) -> Result<Outcome, WorkerError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let mut conn = match self.connection.take() {
                Some(conn) => conn,
                None => self.connect(item)?,
            };

            match conn.execute(item.statement()) {
                Ok(()) => {
                    self.connection = Some(conn);
                    return Ok(Outcome::Executed);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "statement failed, dropping connection");
                    if let Err(close_err) = conn.close() {
                        debug!(error = %close_err, "ignoring close failure");
                    }
                    if attempt >= attempts {
                        return Ok(Outcome::Failed(e));
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Connects, retrying every `retry_interval` until it works or the user
    /// insists on shutdown.
    fn connect(&mut self, current: &WorkItem) -> Result<B::Connection, WorkerError> {
        loop {
            match self.backend.connect() {
                Ok(conn) => {
                    info!(database = %self.config.database, "connected to backend");
                    return Ok(conn);
                }
                Err(e) => {
                    error!(error = %e, "could not connect to backend");
                    if self.coordinator.user_insists() {
                        warn!("giving up due to persistent user");
                        let discarded = self.discard_remaining(current);
                        return Err(WorkerError::GaveUp {
                            discarded,
                            source: e,
                        });
                    }
                    thread::sleep(self.config.retry_interval);
                }
            }
        }
    }

    /// Logs and drops `current` and everything still queued.
    fn discard_remaining(&self, current: &WorkItem) -> usize {
        log_discarded(current);
        let mut discarded = 1;
        while let Some(item) = self.queue.pop() {
            log_discarded(&item);
            discarded += 1;
        }
        discarded
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let Err(e) = conn.close() {
                warn!(error = %e, "failed to close backend connection");
            }
        }
    }
}

fn log_discarded(item: &WorkItem) {
    error!(statement = %item.statement_lossy(), "could not execute statement");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Script {
        connects: VecDeque<bool>,
        executes: VecDeque<bool>,
        fail_close: bool,
        connect_calls: usize,
        executed: Vec<Vec<u8>>,
    }

    #[derive(Clone, Default)]
    struct FakeBackend(Arc<Mutex<Script>>);

    struct FakeConnection(Arc<Mutex<Script>>);

    impl Backend for FakeBackend {
        type Connection = FakeConnection;

        fn connect(&mut self) -> Result<FakeConnection, BackendError> {
            let mut script = self.0.lock().unwrap();
            script.connect_calls += 1;
            if script.connects.pop_front().unwrap_or(true) {
                Ok(FakeConnection(Arc::clone(&self.0)))
            } else {
                Err(BackendError::Connect("refused".into()))
            }
        }
    }

    impl BackendConnection for FakeConnection {
        fn execute(&mut self, statement: &[u8]) -> Result<(), BackendError> {
            let mut script = self.0.lock().unwrap();
            if script.executes.pop_front().unwrap_or(true) {
                script.executed.push(statement.to_vec());
                Ok(())
            } else {
                Err(BackendError::Execute("deadlock".into()))
            }
        }

        fn close(self) -> Result<(), BackendError> {
            if self.0.lock().unwrap().fail_close {
                Err(BackendError::Close("broken pipe".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        backend: FakeBackend,
        queue: Arc<BoundedQueue<WorkItem>>,
        counters: Arc<Counters>,
        coordinator: Arc<SignalCoordinator>,
    }

    impl Harness {
        fn new(statements: &[(&str, &str)]) -> Self {
            let queue = Arc::new(BoundedQueue::new(16));
            for (db, stmt) in statements {
                queue.push(WorkItem::new(db.to_string(), stmt.to_string())).unwrap();
            }
            queue.close();
            Self {
                backend: FakeBackend::default(),
                queue,
                counters: Arc::new(Counters::new()),
                coordinator: Arc::new(SignalCoordinator::new()),
            }
        }

        fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            self.backend.0.lock().unwrap()
        }

        fn run(&self) -> Result<(), WorkerError> {
            let config = WorkerConfig::new("shop").with_retry_interval(Duration::from_millis(1));
            Worker::new(
                config,
                self.backend.clone(),
                Arc::clone(&self.queue),
                Arc::clone(&self.counters),
                Arc::clone(&self.coordinator),
            )
            .run()
        }
    }

    #[test]
    fn executes_in_fifo_order() {
        let h = Harness::new(&[("shop", "a"), ("shop", "b"), ("shop", "c")]);
        h.run().unwrap();

        assert_eq!(h.script().executed, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(h.counters.output(), 3);
        assert_eq!(h.counters.error(), 0);
        assert_eq!(h.script().connect_calls, 1);
    }

    #[test]
    fn empty_closed_queue_terminates() {
        let h = Harness::new(&[]);
        h.run().unwrap();
        assert_eq!(h.counters.output(), 0);
    }

    #[test]
    fn second_attempt_recovers() {
        let h = Harness::new(&[("shop", "a")]);
        h.script().executes = VecDeque::from([false, true]);

        h.run().unwrap();

        assert_eq!(h.counters.output(), 1);
        assert_eq!(h.counters.error(), 0);
        // eager connect, then one reconnect after the failure
        assert_eq!(h.script().connect_calls, 2);
    }

    #[test]
    fn exhausted_attempts_count_an_error_and_move_on() {
        let h = Harness::new(&[("shop", "bad"), ("shop", "good")]);
        h.script().executes = VecDeque::from([false, false]);

        h.run().unwrap();

        assert_eq!(h.counters.error(), 1);
        assert_eq!(h.counters.output(), 1);
        assert_eq!(h.script().executed, vec![b"good".to_vec()]);
        assert_eq!(h.script().connect_calls, 3);
    }

    #[test]
    fn reconnects_until_backend_returns() {
        let h = Harness::new(&[("shop", "a")]);
        h.script().connects = VecDeque::from([false, false, false, true]);

        h.run().unwrap();

        assert_eq!(h.counters.output(), 1);
        assert_eq!(h.script().connect_calls, 4);
    }

    #[test]
    fn database_mismatch_is_fatal() {
        let h = Harness::new(&[("shop", "a"), ("other", "b"), ("shop", "c")]);

        let err = h.run().unwrap_err();

        assert!(matches!(
            err,
            WorkerError::DatabaseMismatch { ref expected, ref actual }
                if expected == "shop" && actual == "other"
        ));
        assert_eq!(h.script().executed, vec![b"a".to_vec()]);
    }

    #[test]
    fn gives_up_when_user_insists() {
        let h = Harness::new(&[("shop", "a"), ("shop", "b"), ("shop", "c")]);
        h.script().connects = VecDeque::from([false; 8]);
        h.coordinator.record();
        h.coordinator.record();

        let err = h.run().unwrap_err();

        assert!(matches!(err, WorkerError::GaveUp { discarded: 3, .. }));
        assert!(h.script().executed.is_empty());
        assert!(h.queue.is_empty());
        assert_eq!(h.counters.output() + h.counters.error(), 0);
    }

    #[test]
    fn single_shutdown_request_keeps_retrying() {
        let h = Harness::new(&[("shop", "a")]);
        h.script().connects = VecDeque::from([false, false, true]);
        h.coordinator.record();

        h.run().unwrap();
        assert_eq!(h.counters.output(), 1);
    }

    #[test]
    fn close_failures_are_ignored() {
        let h = Harness::new(&[("shop", "a")]);
        h.script().fail_close = true;
        h.script().executes = VecDeque::from([false, true]);

        h.run().unwrap();
        assert_eq!(h.counters.output(), 1);
    }
}
