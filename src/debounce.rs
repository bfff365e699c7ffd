//! Trailing-edge debouncer for async work.
//!
//! Scheduling replaces any pending invocation: only the last future
//! scheduled within a burst actually runs, after the delay elapses.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Schedules at most one pending future; rescheduling aborts the previous
/// one and restarts the delay.
pub struct Debouncer {
    delay: Duration,
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Mutex::new(None),
        }
    }

    /// Schedules `work` to run after the delay, replacing any pending run.
    pub fn schedule<F, Fut>(&self, work: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work().await;
        });

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Cancels any pending run.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// Whether a run is still pending or executing.
    pub fn is_pending(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn burst_collapses_to_one_run() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let runs = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let runs = Arc::clone(&runs);
            debouncer.schedule(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_prevents_the_pending_run() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let runs = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&runs);
        debouncer.schedule(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.is_pending());
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn separate_bursts_each_run() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let runs = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&runs);
            debouncer.schedule(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
