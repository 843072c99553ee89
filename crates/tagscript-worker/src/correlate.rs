//! Outstanding calls keyed by correlation id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error as ThisError;
use tokio::sync::oneshot;

use crate::protocol::CorrelationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum WaitError {
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    /// The other side went away before answering.
    #[error("correlation dropped")]
    Closed,
}

pub struct Pending<T> {
    next: AtomicU64,
    waiting: Mutex<HashMap<CorrelationId, oneshot::Sender<T>>>,
}

impl<T> Pending<T> {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1), waiting: Mutex::new(HashMap::new()) }
    }

    /// Reserve a fresh id and the receiver its answer will arrive on.
    pub fn register(&self) -> (CorrelationId, oneshot::Receiver<T>) {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(id, tx);
        (id, rx)
    }

    /// Deliver an answer. `false` when nobody waits for `id` any more
    /// (unknown, expired or already answered).
    pub fn resolve(&self, id: CorrelationId, value: T) -> bool {
        let Some(tx) = self.waiting.lock().remove(&id) else {
            return false;
        };
        tx.send(value).is_ok()
    }

    pub fn cancel(&self, id: CorrelationId) {
        self.waiting.lock().remove(&id);
    }

    /// Wake every waiter with [`WaitError::Closed`].
    pub fn close_all(&self) {
        self.waiting.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Await the answer for `id`. The slot is released on timeout and when
    /// the returned future is dropped early, so a late answer is dropped.
    pub fn wait(
        &self,
        id: CorrelationId,
        rx: oneshot::Receiver<T>,
        timeout: Duration,
    ) -> impl Future<Output = Result<T, WaitError>> + '_ {
        let release = Release { pending: self, id };
        async move {
            let _release = release;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(_)) => Err(WaitError::Closed),
                Err(_) => Err(WaitError::Timeout(timeout)),
            }
        }
    }
}

/// Frees a slot when its waiter goes away, answered or not.
struct Release<'a, T> {
    pending: &'a Pending<T>,
    id: CorrelationId,
}

impl<T> Drop for Release<'_, T> {
    fn drop(&mut self) {
        self.pending.cancel(self.id);
    }
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_match_by_id() {
        let pending = Pending::new();
        let (a, rx_a) = pending.register();
        let (b, rx_b) = pending.register();
        assert_ne!(a, b);
        assert!(pending.resolve(b, "second"));
        assert!(pending.resolve(a, "first"));
        assert_eq!(pending.wait(a, rx_a, Duration::from_secs(1)).await, Ok("first"));
        assert_eq!(pending.wait(b, rx_b, Duration::from_secs(1)).await, Ok("second"));
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_calls_drop_late_answers() {
        let pending = Pending::<u8>::new();
        let (id, rx) = pending.register();
        let waited = pending.wait(id, rx, Duration::from_millis(50)).await;
        assert_eq!(waited, Err(WaitError::Timeout(Duration::from_millis(50))));
        assert!(!pending.resolve(id, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_waits_release_their_slot() {
        let pending = Pending::<u8>::new();
        let (id, rx) = pending.register();
        let wait = pending.wait(id, rx, Duration::from_secs(60));
        assert!(tokio::time::timeout(Duration::from_millis(10), wait).await.is_err());
        assert!(pending.is_empty());
        assert!(!pending.resolve(id, 1));

        let (id, rx) = pending.register();
        drop(pending.wait(id, rx, Duration::from_secs(60)));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn closing_wakes_waiters() {
        let pending = Pending::<u8>::new();
        let (id, rx) = pending.register();
        pending.close_all();
        assert_eq!(pending.wait(id, rx, Duration::from_secs(1)).await, Err(WaitError::Closed));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let pending = Pending::new();
        assert!(!pending.resolve(42, ()));
    }
}
