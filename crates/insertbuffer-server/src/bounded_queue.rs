//! Bounded statement queue with backpressure.
//!
//! Uses `crossbeam-queue::ArrayQueue` as fixed-capacity storage. Every
//! mutation happens under one mutex so that the capacity check, the insert,
//! and the closed check form a single atomic step, and so that blocked
//! producers and the consumer are woken through condition variables without
//! lost wake-ups.
//!
//! Closing the queue is the end-of-stream sentinel: it is ordered after every
//! item accepted before it, never occupies a slot, and is reported exactly
//! once to a consumer that has drained everything else.
//!
//! # Sizing
//!
//! Size the queue using Little's Law: `capacity = throughput * latency`.
//! For example, at 2k statements/sec and a 10s backend outage:
//! `capacity = 2_000 * 10 = 20_000`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crossbeam_queue::ArrayQueue;

/// Result of attempting to push onto the queue.
#[derive(Debug)]
pub enum PushResult<T> {
    /// Item was successfully enqueued.
    Ok,
    /// Queue is full. Returns the item for the caller to handle.
    Backpressure(T),
    /// Queue is closed. Returns the item, which will never be consumed.
    Closed(T),
}

/// A bounded FIFO queue with blocking and non-blocking producers.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    inner: ArrayQueue<T>,
    closed: AtomicBool,
    lock: Mutex<()>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Creates a new bounded queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
            lock: Mutex::new(()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded unit carries no state, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempts to push an item without blocking.
    pub fn try_push(&self, item: T) -> PushResult<T> {
        let _guard = self.guard();
        if self.closed.load(Ordering::Acquire) {
            return PushResult::Closed(item);
        }
        match self.inner.push(item) {
            Ok(()) => {
                self.not_empty.notify_one();
                PushResult::Ok
            }
            Err(item) => PushResult::Backpressure(item),
        }
    }

    /// Pushes an item, blocking while the queue is full.
    ///
    /// Returns `Err(item)` if the queue is or becomes closed while waiting.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut guard = self.guard();
        let mut item = item;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(item);
            }
            match self.inner.push(item) {
                Ok(()) => {
                    self.not_empty.notify_one();
                    return Ok(());
                }
                Err(rejected) => {
                    item = rejected;
                    guard = self
                        .not_full
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Attempts to pop an item without blocking.
    ///
    /// Returns `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let _guard = self.guard();
        let item = self.inner.pop();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Pops the next item, blocking while the queue is empty.
    ///
    /// Returns `None` only once the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.guard();
        loop {
            if let Some(item) = self.inner.pop() {
                self.not_full.notify_one();
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            guard = self
                .not_empty
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue. Never blocks, even when the queue is full.
    ///
    /// Items already queued are still delivered; later pushes are rejected.
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        let _guard = self.guard();
        let was_open = !self.closed.swap(true, Ordering::AcqRel);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        was_open
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the number of items currently in the queue.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns true if the queue is full.
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// Returns the capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;

    #[test]
    fn basic_push_pop() {
        let q = BoundedQueue::new(3);

        assert!(matches!(q.try_push(1), PushResult::Ok));
        assert!(matches!(q.try_push(2), PushResult::Ok));
        assert!(matches!(q.try_push(3), PushResult::Ok));

        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn backpressure_when_full() {
        let q = BoundedQueue::new(2);

        assert!(matches!(q.try_push(1), PushResult::Ok));
        assert!(matches!(q.try_push(2), PushResult::Ok));

        // Queue is full, should get backpressure
        match q.try_push(3) {
            PushResult::Backpressure(v) => assert_eq!(v, 3),
            other => panic!("expected backpressure, got {other:?}"),
        }
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn capacity_and_len() {
        let q = BoundedQueue::new(5);
        assert_eq!(q.capacity(), 5);
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
        assert!(!q.is_full());

        for i in 0..5 {
            let _ = q.try_push(i);
        }
        assert_eq!(q.len(), 5);
        assert!(!q.is_empty());
        assert!(q.is_full());
    }

    #[test]
    #[should_panic(expected = "queue capacity must be positive")]
    fn zero_capacity_panics() {
        let _q: BoundedQueue<i32> = BoundedQueue::new(0);
    }

    #[test]
    fn close_delivers_queued_items_then_end_of_stream() {
        let q = BoundedQueue::new(4);
        q.push(1).unwrap();
        q.push(2).unwrap();

        assert!(q.close());
        assert!(!q.close(), "second close reports already closed");

        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_after_close_is_rejected() {
        let q = BoundedQueue::new(4);
        q.close();

        assert!(matches!(q.try_push(7), PushResult::Closed(7)));
        assert_eq!(q.push(8), Err(8));
        assert!(q.is_empty());
    }

    #[test]
    fn close_on_full_queue_does_not_block() {
        let q = BoundedQueue::new(1);
        q.push(1).unwrap();
        assert!(q.close());
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn blocking_push_waits_for_consumer() {
        let q = Arc::new(BoundedQueue::new(2));
        q.push(1).unwrap();
        q.push(2).unwrap();

        let (tx, rx) = mpsc::channel();
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                q.push(3).unwrap();
                tx.send(()).unwrap();
            })
        };

        // The third push must not complete while the queue is full.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(q.len(), 2);

        assert_eq!(q.pop(), Some(1));
        rx.recv_timeout(Duration::from_secs(5))
            .expect("push should complete after a pop");
        producer.join().unwrap();

        // Order is preserved: nothing dropped, nothing reordered.
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }

    #[test]
    fn blocked_push_fails_when_closed() {
        let q = Arc::new(BoundedQueue::new(1));
        q.push(1).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(2))
        };
        thread::sleep(Duration::from_millis(50));
        q.close();

        assert_eq!(producer.join().unwrap(), Err(2));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn blocking_pop_wakes_on_push_and_close() {
        let q = Arc::new(BoundedQueue::new(4));

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = q.pop() {
                    seen.push(item);
                }
                seen
            })
        };

        for i in 0..100 {
            q.push(i).unwrap();
        }
        q.close();

        assert_eq!(consumer.join().unwrap(), (0..100).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn behaves_like_a_bounded_fifo(
            capacity in 1usize..8,
            ops in prop::collection::vec(any::<Option<u16>>(), 0..64),
        ) {
            let q = BoundedQueue::new(capacity);
            let mut model = std::collections::VecDeque::new();

            for op in ops {
                match op {
                    Some(value) => match q.try_push(value) {
                        PushResult::Ok => {
                            prop_assert!(model.len() < capacity);
                            model.push_back(value);
                        }
                        PushResult::Backpressure(v) => {
                            prop_assert_eq!(v, value);
                            prop_assert_eq!(model.len(), capacity);
                        }
                        PushResult::Closed(_) => prop_assert!(false, "queue was never closed"),
                    },
                    None => prop_assert_eq!(q.try_pop(), model.pop_front()),
                }
                prop_assert_eq!(q.len(), model.len());
            }
        }
    }
}
