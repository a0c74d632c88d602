//! A bounded FIFO that drops its oldest entry on overflow rather than blocking the producer
//! (§5's backpressure model: an in-progress session keeps advancing even under flood).
//!
//! Shares `dot8021x-scheduler`'s `Arc<Mutex<..>>` + `Notify` shape for the same reason: a cheap,
//! cloneable handle onto one shared queue, with waiters parked on a `Notify` rather than polling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// A cloneable handle onto one bounded, drop-oldest-on-overflow queue.
pub struct BoundedQueue<T> {
    name: &'static str,
    state: Arc<Mutex<State<T>>>,
    notify: Arc<Notify>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            state: self.state.clone(),
            notify: self.notify.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue holding at most `capacity` entries. `name` identifies the queue
    /// in drop-overflow log lines.
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(State {
                items: VecDeque::with_capacity(capacity.min(64)),
                capacity,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Pushes `item`. If the queue is already at capacity, the oldest entry is dropped and
    /// logged at `warn` first.
    pub fn push(&self, item: T) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        if state.items.len() >= state.capacity {
            state.items.pop_front();
            tracing::warn!(queue = self.name, "outbound queue full, dropped oldest entry");
        }
        state.items.push_back(item);
        drop(state);
        self.notify.notify_one();
    }

    /// Waits for and removes the oldest entry.
    pub async fn pop(&self) -> T {
        loop {
            {
                let mut state = self.state.lock().expect("queue mutex poisoned");
                if let Some(item) = state.items.pop_front() {
                    return item;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushes_and_pops_in_fifo_order() {
        let queue = BoundedQueue::new("test", 4);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop().await, 1);
        assert_eq!(queue.pop().await, 2);
        assert_eq!(queue.pop().await, 3);
    }

    #[tokio::test]
    async fn overflow_drops_the_oldest_entry_not_the_newest() {
        let queue = BoundedQueue::new("test", 2);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop().await, 2);
        assert_eq!(queue.pop().await, 3);
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let queue = BoundedQueue::new("test", 4);
        let reader = queue.clone();
        let handle = tokio::spawn(async move { reader.pop().await });
        tokio::task::yield_now().await;
        queue.push(42);
        assert_eq!(handle.await.unwrap(), 42);
    }
}
