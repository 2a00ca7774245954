//! Bounded FIFO with overflow-by-eviction
//!
//! Each sink owns one [`BoundedQueue`]. The registry's fan-out path pushes
//! into it; the sink's connection task pops from it. Overflow under a slow
//! consumer is the designed steady state, not an error: `push` evicts the
//! oldest unread packet instead of blocking the writer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Outcome of [`BoundedQueue::pop`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopResult {
    /// The oldest queued packet
    Item(Bytes),
    /// No packet arrived within the timeout
    TimedOut,
    /// The queue was closed; no more packets will ever arrive
    Closed,
}

struct Inner {
    items: VecDeque<Bytes>,
    closed: bool,
}

/// Fixed-capacity FIFO, safe for one concurrent writer and one concurrent
/// reader.
///
/// Invariant: at most `capacity` items are retained at any instant. `push`
/// is the only path that can exceed it, and it immediately corrects by
/// evicting the oldest item.
pub struct BoundedQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl BoundedQueue {
    /// Create a queue holding at most `capacity` packets (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a packet, evicting the oldest one first if the queue is full.
    ///
    /// Never blocks and never fails. Returns `true` if an eviction
    /// occurred. Pushes onto a closed queue are silently dropped.
    pub fn push(&self, packet: Bytes) -> bool {
        let evicted = {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            let evicted = if inner.items.len() >= self.capacity {
                inner.items.pop_front();
                true
            } else {
                false
            };
            inner.items.push_back(packet);
            evicted
        };
        // notify_one stores a permit, so a reader that checks the queue and
        // then awaits cannot miss this wakeup
        self.notify.notify_one();
        evicted
    }

    /// Remove and return the oldest packet, suspending the calling task
    /// until one is available, `timeout` elapses, or the queue is closed.
    pub async fn pop(&self, timeout: Duration) -> PopResult {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so a push between the
            // check and the await still wakes us.
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    return PopResult::Item(item);
                }
                if inner.closed {
                    return PopResult::Closed;
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // A push may have raced the deadline
                let mut inner = self.lock();
                return match inner.items.pop_front() {
                    Some(item) => PopResult::Item(item),
                    None if inner.closed => PopResult::Closed,
                    None => PopResult::TimedOut,
                };
            }
        }
    }

    /// Remove and return the oldest packet without waiting
    pub fn try_pop(&self) -> Option<Bytes> {
        self.lock().items.pop_front()
    }

    /// Close the queue, waking any blocked [`pop`](Self::pop) with
    /// [`PopResult::Closed`]. Subsequent pushes are dropped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        // Cover a reader that has not yet awaited its notified() future
        self.notify.notify_one();
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of packets currently queued
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Maximum number of retained packets
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The queue state stays consistent across a panic, so a poisoned
        // mutex is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &inner.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn packet(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = BoundedQueue::new(10);

        queue.push(packet("a"));
        queue.push(packet("b"));
        queue.push(packet("c"));

        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Item(packet("a")));
        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Item(packet("b")));
        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Item(packet("c")));
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest() {
        let queue = BoundedQueue::new(3);

        // Push capacity + 2 with no pops; only the 3 most recent survive
        for s in ["1", "2", "3", "4", "5"] {
            queue.push(packet(s));
        }
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Item(packet("3")));
        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Item(packet("4")));
        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Item(packet("5")));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_push_reports_eviction() {
        let queue = BoundedQueue::new(2);

        assert!(!queue.push(packet("1")));
        assert!(!queue.push(packet("2")));
        assert!(queue.push(packet("3")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out() {
        let queue = BoundedQueue::new(2);

        let result = queue.pop(Duration::from_millis(50)).await;
        assert_eq!(result, PopResult::TimedOut);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(BoundedQueue::new(2));

        let popper = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };

        // Let the popper block first
        tokio::task::yield_now().await;
        queue.push(packet("data"));

        assert_eq!(popper.await.unwrap(), PopResult::Item(packet("data")));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_pop() {
        let queue = Arc::new(BoundedQueue::new(2));

        let popper = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        queue.close();

        assert_eq!(popper.await.unwrap(), PopResult::Closed);
    }

    #[tokio::test]
    async fn test_push_after_close_dropped() {
        let queue = BoundedQueue::new(2);

        queue.close();
        queue.push(packet("late"));

        assert!(queue.is_empty());
        assert_eq!(queue.pop(Duration::from_millis(10)).await, PopResult::Closed);
    }

    #[tokio::test]
    async fn test_drains_remaining_before_closed() {
        // Items already queued are still readable after close
        let queue = BoundedQueue::new(5);
        queue.push(packet("a"));
        queue.close();

        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Item(packet("a")));
        assert_eq!(queue.pop(Duration::from_secs(1)).await, PopResult::Closed);
    }

    #[tokio::test]
    async fn test_no_loss_when_consumer_keeps_pace() {
        let queue = Arc::new(BoundedQueue::new(4));
        let count = 100usize;

        let popper = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut received = Vec::new();
                for _ in 0..count {
                    match queue.pop(Duration::from_secs(5)).await {
                        PopResult::Item(item) => received.push(item),
                        other => panic!("unexpected pop result: {:?}", other),
                    }
                }
                received
            })
        };

        for i in 0..count {
            queue.push(Bytes::from(i.to_string()));
            // Pop rate >= push rate
            tokio::task::yield_now().await;
        }

        let received = popper.await.unwrap();
        assert_eq!(received.len(), count);
        for (i, item) in received.iter().enumerate() {
            assert_eq!(item, &Bytes::from(i.to_string()));
        }
    }

    #[test]
    fn test_capacity_minimum_is_one() {
        let queue = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }
}
