//! Input, output, and error counters.
//!
//! Each counter is an independent relaxed atomic. Readers (the status
//! endpoint) may observe the three values at slightly different instants;
//! no ordering between counters is promised.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Names of the counters, in sorted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    /// Statements that exhausted their execution attempts.
    Error,
    /// Accepted client connections.
    Input,
    /// Statements executed successfully.
    Output,
}

impl Counter {
    /// All counters, sorted by name.
    pub const ALL: [Counter; 3] = [Counter::Error, Counter::Input, Counter::Output];

    /// The counter's public name.
    pub fn name(self) -> &'static str {
        match self {
            Counter::Error => "error",
            Counter::Input => "input",
            Counter::Output => "output",
        }
    }

    /// Looks a counter up by its public name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|counter| counter.name() == name)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Monotonic daemon counters.
#[derive(Debug, Default)]
pub struct Counters {
    input: AtomicU64,
    output: AtomicU64,
    error: AtomicU64,
}

impl Counters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Error => &self.error,
            Counter::Input => &self.input,
            Counter::Output => &self.output,
        }
    }

    /// Increments a counter by one.
    pub fn increment(&self, counter: Counter) {
        self.cell(counter).fetch_add(1, Ordering::Relaxed);
    }

    /// Reads a counter.
    pub fn get(&self, counter: Counter) -> u64 {
        self.cell(counter).load(Ordering::Relaxed)
    }

    /// Reads a counter by name.
    pub fn get_by_name(&self, name: &str) -> Option<u64> {
        Counter::from_name(name).map(|counter| self.get(counter))
    }

    /// Reads every counter, sorted by name.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        Counter::ALL
            .into_iter()
            .map(|counter| (counter.name(), self.get(counter)))
            .collect()
    }

    pub fn input(&self) -> u64 {
        self.get(Counter::Input)
    }

    pub fn output(&self) -> u64 {
        self.get(Counter::Output)
    }

    pub fn error(&self) -> u64 {
        self.get(Counter::Error)
    }
}
