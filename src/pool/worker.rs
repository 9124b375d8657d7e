//! # Worker: one executor loop of the pool.
//!
//! A worker repeatedly pulls a task from the shared handoff queue, runs it
//! with panic containment, and reports the completion. It exits when:
//! - the pool's cancellation token fires (pool stop), or
//! - its personal retire token fires (idle reap by the sweeper).
//!
//! ## State machine
//! ```text
//! Idle ──dequeue──► Busy ──task done──► Idle (touch lastActive)
//!   │                                     │
//!   └──cancel / retire──► Terminated ◄────┘ (observed between tasks)
//! ```
//!
//! ## Rules
//! - A panic inside a task is caught, counted, and published; the worker
//!   keeps servicing the queue.
//! - A running task is never interrupted; retirement and pool stop are
//!   observed between tasks only.
//! - The worker never reaches back into the pool's worker set; the sweeper
//!   owns membership (no back-pointer cycle).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventKind};

use super::PoolShared;

/// Executor loop state shared with the sweeper.
pub(super) struct Worker {
    pub(super) id: u64,
    pub(super) shared: Arc<PoolShared>,
    pub(super) retire: CancellationToken,
    pub(super) last_active: Arc<AtomicU64>,
    pub(super) busy: Arc<AtomicBool>,
}

impl Worker {
    fn touch(&self) {
        self.last_active
            .store(self.shared.elapsed_millis(), Ordering::Release);
    }

    /// Runs the worker loop to termination.
    pub(super) async fn run(self) {
        loop {
            let task = {
                let mut rx = self.shared.queue_rx.lock().await;
                tokio::select! {
                    _ = self.shared.token.cancelled() => None,
                    _ = self.retire.cancelled() => None,
                    t = rx.recv() => t,
                }
            };

            let Some(task) = task else { break };

            self.busy.store(true, Ordering::Release);
            self.touch();
            let name = task.name().to_string();
            self.shared.bus.publish(
                Event::now(EventKind::TaskStarted)
                    .with_task(&name)
                    .with_worker(self.id),
            );

            let ctx = self.shared.token.child_token();
            let fut = std::panic::AssertUnwindSafe(task.spawn(ctx)).catch_unwind();
            match fut.await {
                Ok(()) => {
                    self.shared.bus.publish(
                        Event::now(EventKind::TaskFinished)
                            .with_task(&name)
                            .with_worker(self.id),
                    );
                }
                Err(panic_err) => {
                    self.shared.panics.fetch_add(1, Ordering::AcqRel);
                    let info = {
                        let any = &*panic_err;
                        if let Some(msg) = any.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = any.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        }
                    };
                    self.shared.bus.publish(
                        Event::now(EventKind::TaskPanicked)
                            .with_task(&name)
                            .with_worker(self.id)
                            .with_error(info),
                    );
                }
            }

            self.shared.completions.done();
            self.touch();
            self.busy.store(false, Ordering::Release);
        }

        self.shared
            .bus
            .publish(Event::now(EventKind::WorkerRetired).with_worker(self.id));
    }
}
