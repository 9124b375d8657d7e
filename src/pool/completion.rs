//! # Submission accounting for the worker pool.
//!
//! [`Completions`] is the counter behind
//! [`WorkerPool::wait`](crate::pool::WorkerPool::wait): every accepted
//! submission increments it exactly once and every terminal outcome (task
//! ran, task panicked, task dropped at shutdown) decrements it exactly once.
//!
//! ## Rules
//! - `wait()` registers for notification **before** re-checking the count, so
//!   a concurrent final `done()` cannot be lost.
//! - Decrementing below zero is a programmer error and terminates the
//!   process.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counter of submitted-but-not-yet-finished tasks.
pub(crate) struct Completions {
    active: AtomicUsize,
    notify: Notify,
}

impl Completions {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Records one accepted submission.
    pub(crate) fn add(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    /// Records one terminal outcome; wakes waiters when the count hits zero.
    pub(crate) fn done(&self) {
        let prev = self.active.fetch_sub(1, Ordering::AcqRel);
        crate::assert::ensure(prev > 0, "completion counter decremented below zero");
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Current number of outstanding tasks.
    pub(crate) fn outstanding(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Blocks until the count reaches zero.
    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let c = Completions::new();
        c.wait().await;
    }

    #[tokio::test]
    async fn wait_blocks_until_all_done() {
        let c = Arc::new(Completions::new());
        c.add();
        c.add();

        let waiter = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        c.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        c.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait resolved")
            .expect("waiter task");
        assert_eq!(c.outstanding(), 0);
    }
}
