//! Timeout-bounded FIFO used for inbound requests and per-transaction
//! responses.
//!
//! Producers (transport listener tasks) [`push`](EventQueue::push) without
//! blocking; consumers [`wait`](EventQueue::wait) for at most the given
//! duration. Capacity is unbounded and nothing is ever evicted.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// An unbounded FIFO with awaitable, timeout-bounded retrieval
pub struct EventQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        EventQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends an item and wakes waiters. Returns `false` once the queue is
    /// closed; the item is dropped in that case.
    pub fn push(&self, item: T) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.items.push_back(item);
        }
        self.notify.notify_waiters();
        true
    }

    /// Pops the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Waits up to `timeout` for the next item
    ///
    /// Returns `None` when the timeout expires or the queue is closed and
    /// drained.
    pub async fn wait(&self, timeout: Duration) -> Option<T> {
        self.wait_for(|_| true, timeout).await
    }

    /// Waits up to `timeout` for the oldest item matching `predicate` and
    /// removes it. Items that do not match stay queued in order.
    pub async fn wait_for<F>(&self, mut predicate: F, timeout: Duration) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not lost
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(pos) = state.items.iter().position(|item| predicate(item)) {
                    return state.items.remove(pos);
                }
                if state.closed {
                    return None;
                }
            }

            if timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Rejects further pushes and wakes all waiters. Queued items can still
    /// be popped.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Removes and returns everything queued
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventQueue")
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.wait(Duration::from_millis(10)).await, Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.wait(Duration::from_millis(10)).await, Some(3));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let queue: EventQueue<u32> = EventQueue::new();
        let start = std::time::Instant::now();
        assert_eq!(queue.wait(Duration::from_millis(100)).await, None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90), "returned too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "took too long: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = Arc::new(EventQueue::new());
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            producer.push("hello");
        });
        assert_eq!(queue.wait(Duration::from_secs(2)).await, Some("hello"));
    }

    #[tokio::test]
    async fn test_wait_for_skips_non_matching() {
        let queue = EventQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.wait_for(|n| *n == 2, Duration::from_millis(10)).await, Some(2));
        assert_eq!(queue.drain(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters_and_rejects_pushes() {
        let queue: Arc<EventQueue<u32>> = Arc::new(EventQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait(Duration::from_secs(10)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(result, None);
        assert!(!queue.push(7));
        assert!(queue.is_closed());
    }
}
