//! Shutdown coordination.
//!
//! SIGINT and SIGTERM are folded into one "shutdown requested" event. The
//! coordinator only counts requests; the listener reacts to the first one by
//! beginning shutdown, and the worker reads [`SignalCoordinator::user_insists`]
//! to decide whether to stop waiting for an unavailable backend.
//!
//! The coordinator does not depend on how requests are delivered: the
//! listener feeds it from `signal-hook-mio`, and a [`ShutdownHandle`]
//! (see `listener`) feeds it programmatically.
//!
//! [`ShutdownHandle`]: crate::ShutdownHandle

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Outcome of recording a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownRequest {
    /// The first request: shutdown should begin.
    First,
    /// A repeated request; carries the total number observed so far.
    Repeated(usize),
}

/// Counts shutdown requests observed since process start.
#[derive(Debug, Default)]
pub struct SignalCoordinator {
    count: AtomicUsize,
}

impl SignalCoordinator {
    /// Creates a coordinator with no requests recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one shutdown request.
    pub fn record(&self) -> ShutdownRequest {
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if count == 1 {
            info!("terminating");
            ShutdownRequest::First
        } else {
            info!(requests = count, "shutdown requested again");
            ShutdownRequest::Repeated(count)
        }
    }

    /// Number of requests recorded.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// True once at least one request has been recorded.
    pub fn shutdown_requested(&self) -> bool {
        self.count() > 0
    }

    /// True once two or more requests have been recorded.
    pub fn user_insists(&self) -> bool {
        self.count() > 1
    }
}
