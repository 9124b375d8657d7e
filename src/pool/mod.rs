//! # Elastic worker pool.
//!
//! The execution engine behind the simulation and monitor drivers.
//!
//! ## Files & responsibilities
//! - **pool.rs**: public [`WorkerPool`] facade; owns the handoff queue, the
//!   worker set, the idle sweeper and the cancellation token; advisory
//!   scale-up on submission pressure.
//! - **worker.rs**: one executor loop; pulls from the shared queue, contains
//!   task panics, reports completions, exits on pool stop or idle reap.
//! - **completion.rs**: submitted-vs-finished accounting behind
//!   [`WorkerPool::wait`].
//!
//! ## Wiring
//! ```text
//! driver ──submit──► WorkerPool ──handoff──► Worker 1..N ──events──► Bus
//!                        │                      ▲
//!                        └── sweeper (idle/2) ──┘ retire tokens
//! ```
//!
//! ## Shutdown timeline
//! ```text
//! stop() → cancel token → close queue → drain parked tasks (count them done)
//!        → workers observe the token between tasks and exit
//! ```

mod completion;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PoolError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::TaskRef;

use self::completion::Completions;
use self::worker::Worker;

/// Compile-time ceiling on the worker ceiling itself.
pub const MAX_WORKERS: usize = 64;

/// Handle kept by the pool for each live worker.
struct WorkerHandle {
    retire: CancellationToken,
    last_active: Arc<AtomicU64>,
    busy: Arc<AtomicBool>,
    _join: JoinHandle<()>,
}

/// State shared between the pool facade, its workers and the sweeper.
pub(super) struct PoolShared {
    min: usize,
    max: usize,
    idle: Duration,
    epoch: Instant,
    queue_tx: mpsc::Sender<TaskRef>,
    pub(super) queue_rx: tokio::sync::Mutex<mpsc::Receiver<TaskRef>>,
    workers: Mutex<HashMap<u64, WorkerHandle>>,
    next_id: AtomicU64,
    pub(super) completions: Completions,
    pub(super) token: CancellationToken,
    pub(super) panics: AtomicUsize,
    pub(super) bus: Bus,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl PoolShared {
    /// Milliseconds since pool construction; basis for idle accounting.
    pub(super) fn elapsed_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Adds one worker under the worker-set lock, if below the ceiling.
    fn spawn_worker(self: &Arc<Self>) -> bool {
        let mut workers = match self.workers.lock() {
            Ok(w) => w,
            Err(_) => return false,
        };
        if self.token.is_cancelled() || workers.len() >= self.max {
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        let retire = CancellationToken::new();
        let last_active = Arc::new(AtomicU64::new(self.elapsed_millis()));
        let busy = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            id,
            shared: Arc::clone(self),
            retire: retire.clone(),
            last_active: Arc::clone(&last_active),
            busy: Arc::clone(&busy),
        };
        let join = tokio::spawn(worker.run());

        workers.insert(
            id,
            WorkerHandle {
                retire,
                last_active,
                busy,
                _join: join,
            },
        );
        self.bus
            .publish(Event::now(EventKind::WorkerSpawned).with_worker(id));
        true
    }

    /// Retires workers idle beyond the threshold, never below the floor.
    ///
    /// Busy workers are exempt regardless of their timestamp; a retired
    /// worker observes its token between tasks and exits on its own.
    fn reap_idle(&self) {
        let now = self.elapsed_millis();
        let idle_ms = self.idle.as_millis() as u64;

        let mut workers = match self.workers.lock() {
            Ok(w) => w,
            Err(_) => return,
        };
        if workers.len() <= self.min {
            return;
        }

        let mut stale: Vec<u64> = workers
            .iter()
            .filter(|(_, h)| {
                !h.busy.load(Ordering::Acquire)
                    && now.saturating_sub(h.last_active.load(Ordering::Acquire)) > idle_ms
            })
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();

        for id in stale {
            if workers.len() <= self.min {
                break;
            }
            if let Some(handle) = workers.remove(&id) {
                handle.retire.cancel();
            }
        }
    }

    fn spawn_sweeper(self: Arc<Self>) {
        let period = (self.idle / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    _ = tick.tick() => self.reap_idle(),
                }
            }
        });
    }
}

/// Elastic executor over [`Task`](crate::tasks::Task)s.
///
/// Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Creates a pool with the given floor, ceiling, and idle threshold.
    ///
    /// Preconditions (fatal invariants): `0 < min < max <= MAX_WORKERS`,
    /// `idle > 0`.
    pub fn new(min: usize, max: usize, idle: Duration, bus: Bus) -> Self {
        crate::assert::ensure(min > 0, "worker pool floor must be at least 1");
        crate::assert::ensure_with(
            min < max,
            "worker pool floor must be below its ceiling",
            &[("min", min.to_string()), ("max", max.to_string())],
        );
        crate::assert::ensure_with(
            max <= MAX_WORKERS,
            "worker pool ceiling exceeds the hard cap",
            &[("max", max.to_string()), ("cap", MAX_WORKERS.to_string())],
        );
        crate::assert::ensure(idle > Duration::ZERO, "worker idle threshold must be positive");

        let (queue_tx, queue_rx) = mpsc::channel(1);
        Self {
            shared: Arc::new(PoolShared {
                min,
                max,
                idle,
                epoch: Instant::now(),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                workers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                completions: Completions::new(),
                token: CancellationToken::new(),
                panics: AtomicUsize::new(0),
                bus,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Spawns the floor workers and the idle sweeper. Idempotent.
    pub fn run(&self) {
        let s = &self.shared;
        if s.token.is_cancelled() || s.started.swap(true, Ordering::AcqRel) {
            return;
        }
        for _ in 0..s.min {
            s.spawn_worker();
        }
        Arc::clone(s).spawn_sweeper();
        s.bus.publish(Event::now(EventKind::PoolStarted));
    }

    /// Hands a task to the pool, blocking until it is accepted.
    ///
    /// If no worker is ready the pool first attempts an advisory scale-up,
    /// then waits for the handoff. Returns [`PoolError::Shutdown`] once
    /// [`stop`](Self::stop) has been called; in that case the completion
    /// counter is untouched.
    pub async fn submit(&self, task: TaskRef) -> Result<(), PoolError> {
        let s = &self.shared;
        if s.token.is_cancelled() {
            return Err(PoolError::Shutdown);
        }

        s.completions.add();
        let name = task.name().to_string();

        let task = match s.queue_tx.try_send(task) {
            Ok(()) => {
                s.bus
                    .publish(Event::now(EventKind::TaskSubmitted).with_task(name));
                return Ok(());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                s.completions.done();
                return Err(PoolError::Shutdown);
            }
            Err(mpsc::error::TrySendError::Full(task)) => task,
        };

        // Queue occupied: no worker was ready to take the handoff.
        s.spawn_worker();

        tokio::select! {
            res = s.queue_tx.send(task) => match res {
                Ok(()) => {
                    s.bus
                        .publish(Event::now(EventKind::TaskSubmitted).with_task(name));
                    Ok(())
                }
                Err(_) => {
                    s.completions.done();
                    Err(PoolError::Shutdown)
                }
            },
            _ = s.token.cancelled() => {
                s.completions.done();
                Err(PoolError::Shutdown)
            }
        }
    }

    /// Blocks until every accepted task has finished. Does not stop the pool.
    pub async fn wait(&self) {
        self.shared.completions.wait().await;
    }

    /// Signals cancellation, closes the queue, and drains parked tasks.
    ///
    /// Running tasks complete naturally; workers exit as they observe the
    /// token. Subsequent `submit` calls fail with [`PoolError::Shutdown`].
    /// Idempotent.
    pub async fn stop(&self) {
        let s = &self.shared;
        s.token.cancel();
        if s.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let mut rx = s.queue_rx.lock().await;
            rx.close();
            while let Ok(task) = rx.try_recv() {
                s.bus
                    .publish(Event::now(EventKind::TaskDropped).with_task(task.name()));
                s.completions.done();
            }
        }

        if let Ok(mut workers) = s.workers.lock() {
            workers.clear();
        }
        s.bus.publish(Event::now(EventKind::PoolStopped));
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Number of tasks that panicked while running on this pool.
    pub fn panic_count(&self) -> usize {
        self.shared.panics.load(Ordering::Acquire)
    }

    /// Number of accepted tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.shared.completions.outstanding()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::tasks::TaskFn;

    fn counting_task(hits: Arc<AtomicUsize>, hold: Duration) -> TaskRef {
        TaskFn::arc("counting", move |_ctx: CancellationToken| {
            let hits = hits.clone();
            async move {
                if hold > Duration::ZERO {
                    tokio::time::sleep(hold).await;
                }
                hits.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_every_submitted_task() {
        let pool = WorkerPool::new(1, 5, Duration::from_secs(5), Bus::new(64));
        pool.run();

        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            pool.submit(counting_task(hits.clone(), Duration::ZERO))
                .await
                .expect("submit");
        }

        pool.wait().await;
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        pool.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scales_up_under_burst_and_back_down_when_idle() {
        let pool = WorkerPool::new(1, 5, Duration::from_millis(300), Bus::new(64));
        pool.run();
        assert_eq!(pool.worker_count(), 1);

        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            pool.submit(counting_task(hits.clone(), Duration::from_millis(200)))
                .await
                .expect("submit");
        }

        let during_burst = pool.worker_count();
        assert!(
            (2..=5).contains(&during_burst),
            "expected 2..=5 live workers during the burst, got {during_burst}"
        );

        pool.wait().await;
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        // After a sustained idle period the pool shrinks back to the floor.
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(pool.worker_count(), 1);

        pool.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_count_never_exceeds_ceiling() {
        let pool = WorkerPool::new(1, 3, Duration::from_secs(5), Bus::new(64));
        pool.run();

        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..12 {
            pool.submit(counting_task(hits.clone(), Duration::from_millis(50)))
                .await
                .expect("submit");
            assert!(pool.worker_count() <= 3);
        }

        pool.wait().await;
        pool.stop().await;
        assert_eq!(hits.load(Ordering::SeqCst), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_task_is_contained_and_counted() {
        let pool = WorkerPool::new(1, 2, Duration::from_secs(5), Bus::new(64));
        pool.run();

        let boom: TaskRef = TaskFn::arc("boom", |_ctx: CancellationToken| async move {
            panic!("task exploded");
        });
        pool.submit(boom).await.expect("submit");

        let hits = Arc::new(AtomicUsize::new(0));
        pool.submit(counting_task(hits.clone(), Duration::ZERO))
            .await
            .expect("submit");

        pool.wait().await;
        assert_eq!(pool.panic_count(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "pool kept servicing tasks");
        pool.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_after_stop_is_rejected() {
        let pool = WorkerPool::new(1, 2, Duration::from_secs(5), Bus::new(64));
        pool.run();
        pool.stop().await;

        let hits = Arc::new(AtomicUsize::new(0));
        let res = pool.submit(counting_task(hits.clone(), Duration::ZERO)).await;
        assert_eq!(res, Err(PoolError::Shutdown));
        assert_eq!(pool.outstanding(), 0);

        // wait() must not hang after a rejected submission.
        pool.wait().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_drains_parked_tasks() {
        let pool = WorkerPool::new(1, 2, Duration::from_secs(5), Bus::new(64));
        // Deliberately not started: submissions park in the handoff buffer.
        let hits = Arc::new(AtomicUsize::new(0));
        pool.submit(counting_task(hits.clone(), Duration::ZERO))
            .await
            .expect("parked submit");
        assert_eq!(pool.outstanding(), 1);

        pool.stop().await;
        assert_eq!(pool.outstanding(), 0, "dropped task still signalled done");
        pool.wait().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_is_idempotent() {
        let pool = WorkerPool::new(2, 4, Duration::from_secs(5), Bus::new(64));
        pool.run();
        pool.run();
        pool.run();
        assert_eq!(pool.worker_count(), 2);
        pool.stop().await;
    }
}
