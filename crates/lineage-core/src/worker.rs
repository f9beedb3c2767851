//! Concurrency primitives for the worker-pool boundary (feature-gated
//! behind `worker`). Spawning the pool itself, and deciding when a task
//! runs, is a concern of the embedding application; the core only hands
//! out the cooperative cancellation token and a bounded result channel
//! in the shape a worker needs to report back without the live
//! `Experiment` ever crossing a thread boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};

/// Cooperative cancellation flag, polled once per time point by long tasks
/// (the link selector, the error detector scan, the comparison engine).
/// Cloning shares the same underlying flag.
#[derive(Debug, Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A single-use, capacity-1 channel a worker uses to report its result
/// back to the foreground thread. On cancellation the worker should send
/// `None` and the foreground side discards it rather than applying
/// anything to the live `Experiment`.
pub struct ResultChannel<T> {
    tx: Sender<Option<T>>,
    rx: Receiver<Option<T>>,
}

impl<T> ResultChannel<T> {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        ResultChannel { tx, rx }
    }

    pub fn sender(&self) -> Sender<Option<T>> {
        self.tx.clone()
    }

    /// Blocks until the worker reports a result or is dropped without
    /// sending one.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok().flatten()
    }

    pub fn try_recv(&self) -> Option<Option<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Default for ResultChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled_and_flips_once() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cloned_token_observes_the_same_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn result_channel_round_trips_a_value_across_threads() {
        let channel: ResultChannel<u32> = ResultChannel::new();
        let tx = channel.sender();
        std::thread::spawn(move || {
            let _ = tx.send(Some(42));
        })
        .join()
        .unwrap();
        assert_eq!(channel.recv(), Some(42));
    }

    #[test]
    fn cancelled_worker_reports_none() {
        let channel: ResultChannel<u32> = ResultChannel::new();
        let token = CancellationToken::new();
        let tx = channel.sender();
        let worker_token = token.clone();
        token.cancel();
        std::thread::spawn(move || {
            let result = if worker_token.is_cancelled() { None } else { Some(7) };
            let _ = tx.send(result);
        })
        .join()
        .unwrap();
        assert_eq!(channel.recv(), None);
    }
}
