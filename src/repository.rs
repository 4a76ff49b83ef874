//! Bidirectional data repository.
//!
//! Two unbounded FIFO queues decouple application code from network I/O:
//!
//! ```text
//! application ─► push_outbound ─► [outbound] ─► send task ─► socket(s)
//! application ◄─ pop_inbound  ◄─ [inbound]  ◄─ receive task(s) ◄─ socket(s)
//! ```
//!
//! Each queue has its own mutex, held only for the push/pop itself and never
//! across an `.await`. Pops never block; `outbound_ready` and `recv_inbound`
//! let tasks wait for items without polling.
//!
//! # Example
//!
//! ```
//! use mocap_netop::Repository;
//!
//! let repo: Repository<&str, u32> = Repository::new();
//! repo.push_outbound("a");
//! repo.push_outbound("b");
//!
//! assert_eq!(repo.pop_outbound(), Some("a"));
//! assert_eq!(repo.pop_outbound(), Some("b"));
//! assert_eq!(repo.pop_inbound(), None);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

/// Outbound and inbound item queues shared by an engine and its application.
pub struct Repository<Out, In> {
    outbound: Mutex<VecDeque<Out>>,
    inbound: Mutex<VecDeque<In>>,
    outbound_signal: Notify,
    inbound_signal: Notify,
}

impl<Out, In> Repository<Out, In> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            outbound: Mutex::new(VecDeque::new()),
            inbound: Mutex::new(VecDeque::new()),
            outbound_signal: Notify::new(),
            inbound_signal: Notify::new(),
        }
    }

    /// Queue an item for sending.
    pub fn push_outbound(&self, item: Out) {
        lock(&self.outbound).push_back(item);
        self.outbound_signal.notify_one();
    }

    /// Take the oldest outbound item, if any.
    pub fn pop_outbound(&self) -> Option<Out> {
        lock(&self.outbound).pop_front()
    }

    /// Queue a received item for the application.
    pub fn push_inbound(&self, item: In) {
        lock(&self.inbound).push_back(item);
        self.inbound_signal.notify_one();
    }

    /// Take the oldest received item, if any.
    pub fn pop_inbound(&self) -> Option<In> {
        lock(&self.inbound).pop_front()
    }

    /// Number of items waiting to be sent.
    pub fn outbound_len(&self) -> usize {
        lock(&self.outbound).len()
    }

    /// Number of received items not yet popped.
    pub fn inbound_len(&self) -> usize {
        lock(&self.inbound).len()
    }

    /// Whether both queues are empty.
    pub fn is_empty(&self) -> bool {
        self.outbound_len() == 0 && self.inbound_len() == 0
    }

    /// Discard every queued item in both directions.
    pub fn drain(&self) {
        let outbound = std::mem::take(&mut *lock(&self.outbound));
        let inbound = std::mem::take(&mut *lock(&self.inbound));
        // Items are dropped outside the locks.
        drop(outbound);
        drop(inbound);
    }

    /// Wait until the outbound queue is non-empty.
    ///
    /// Returns immediately if items are already queued. A single waiter is
    /// assumed (the engine's send task).
    pub async fn outbound_ready(&self) {
        loop {
            let notified = self.outbound_signal.notified();
            if self.outbound_len() > 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for the next received item and take it.
    pub async fn recv_inbound(&self) -> In {
        loop {
            let notified = self.inbound_signal.notified();
            if let Some(item) = self.pop_inbound() {
                return item;
            }
            notified.await;
        }
    }
}

impl<Out, In> Default for Repository<Out, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out, In> fmt::Debug for Repository<Out, In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("outbound", &self.outbound_len())
            .field("inbound", &self.inbound_len())
            .finish()
    }
}

/// Lock a queue, recovering it if a previous holder panicked.
///
/// The critical sections only push or pop, so a poisoned queue is still
/// consistent.
fn lock<T>(queue: &Mutex<VecDeque<T>>) -> MutexGuard<'_, VecDeque<T>> {
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_per_queue() {
        let repo: Repository<u32, u32> = Repository::new();
        for i in 0..10 {
            repo.push_outbound(i);
            repo.push_inbound(100 + i);
        }

        let out: Vec<u32> = std::iter::from_fn(|| repo.pop_outbound()).collect();
        let inb: Vec<u32> = std::iter::from_fn(|| repo.pop_inbound()).collect();

        assert_eq!(out, (0..10).collect::<Vec<_>>());
        assert_eq!(inb, (100..110).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let repo: Repository<String, String> = Repository::new();
        assert!(repo.pop_outbound().is_none());
        assert!(repo.pop_inbound().is_none());
        assert!(repo.is_empty());
    }

    #[test]
    fn test_drain_empties_both_queues() {
        let repo: Repository<u8, u8> = Repository::new();
        repo.push_outbound(1);
        repo.push_inbound(2);
        assert_eq!(repo.outbound_len(), 1);
        assert_eq!(repo.inbound_len(), 1);

        repo.drain();

        assert!(repo.is_empty());
    }

    #[test]
    fn test_concurrent_pushes_lose_nothing() {
        let repo: Arc<Repository<usize, ()>> = Arc::new(Repository::new());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        repo.push_outbound(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut items: Vec<usize> = std::iter::from_fn(|| repo.pop_outbound()).collect();
        assert_eq!(items.len(), 1000);
        items.sort_unstable();
        items.dedup();
        assert_eq!(items.len(), 1000);
    }

    #[tokio::test]
    async fn test_outbound_ready_wakes_on_push() {
        let repo: Arc<Repository<u8, ()>> = Arc::new(Repository::new());

        let waiter = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                repo.outbound_ready().await;
                repo.pop_outbound()
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        repo.push_outbound(5);

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, Some(5));
    }

    #[tokio::test]
    async fn test_outbound_ready_returns_when_already_queued() {
        let repo: Repository<u8, ()> = Repository::new();
        repo.push_outbound(1);

        tokio::time::timeout(Duration::from_millis(100), repo.outbound_ready())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recv_inbound_in_order() {
        let repo: Arc<Repository<(), u32>> = Arc::new(Repository::new());

        let producer = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                for i in 0..3 {
                    repo.push_inbound(i);
                    tokio::task::yield_now().await;
                }
            })
        };

        for expected in 0..3 {
            let item = tokio::time::timeout(Duration::from_secs(1), repo.recv_inbound())
                .await
                .unwrap();
            assert_eq!(item, expected);
        }
        producer.await.unwrap();
    }
}
