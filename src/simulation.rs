//! # Simulation: the attempts × count load matrix.
//!
//! A simulation issues `count` request tasks per attempt round, sleeps the
//! cadence between rounds, and waits for every task (including the monitors
//! they spawn) to finish.
//!
//! ## Execution
//! ```text
//! start()
//!   ├─ pool = WorkerPool(1, 10, 5s); pool.run()
//!   ├─ for attempt in 0..attempts:
//!   │    ├─ exit loop if cancelled
//!   │    ├─ submit one request task per client
//!   │    └─ sleep cadence (skipped after the final round, cancellable)
//!   ├─ pool.wait()  (cancellable)
//!   └─ pool.stop() → Completed | Cancelled | Failed
//! ```
//!
//! Each request task POSTs to the target, optionally extracts a marker from
//! the response body, and — when a monitor is configured — builds a fresh
//! [`Monitor`] and runs it to completion on the same pool slot.
//!
//! ## Rules
//! - Submissions are enqueued in iteration order; execution order is not
//!   guaranteed.
//! - Dry-run suppresses all external I/O while exercising the scheduling
//!   faithfully.
//! - A task panic is contained by the pool and marks the simulation *failed*
//!   once it drains.
//! - Cancellation is observed between submissions, inside cadence sleeps,
//!   and while waiting for the pool to drain.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ApiClient, RequestClient};
use crate::config::SimulationConfig;
use crate::events::{Bus, Event, EventKind};
use crate::monitor::{Monitor, MonitorTarget};
use crate::pool::{WorkerPool, MAX_WORKERS};
use crate::tasks::{TaskFn, TaskRef};

/// Extracts an identifier from a POST response body.
///
/// Hook for target-specific response formats; absent by default.
pub type MarkerHook = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Monitor specification carried by a simulation target.
///
/// A fresh [`Monitor`] is built from this after every request task.
#[derive(Clone)]
pub struct SimulationMonitorSpec {
    /// Display name of the monitor.
    pub name: String,
    /// Probe specifications.
    pub targets: Vec<MonitorTarget>,
}

/// Fan-out specification: the clients to drive and what to watch afterwards.
pub struct SimulationTarget {
    id: Uuid,
    clients: Vec<Arc<dyn RequestClient>>,
    monitor: Option<SimulationMonitorSpec>,
    marker: Option<MarkerHook>,
}

impl SimulationTarget {
    /// Creates a target over a non-empty client list.
    pub fn new(clients: Vec<Arc<dyn RequestClient>>, monitor: Option<SimulationMonitorSpec>) -> Self {
        crate::assert::ensure(
            !clients.is_empty(),
            "simulation target can not have 0 clients",
        );
        Self {
            id: Uuid::new_v4(),
            clients,
            monitor,
            marker: None,
        }
    }

    /// Installs a response-marker extraction hook.
    pub fn with_marker(mut self, marker: MarkerHook) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Stable identifier of this target.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of request-issuing handles.
    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

/// Terminal outcome of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// All attempts ran and every task finished.
    Completed,
    /// The simulation was cancelled before finishing.
    Cancelled,
    /// At least one task panicked.
    Failed,
}

/// One driver instance over a [`SimulationTarget`].
pub struct Simulation {
    id: Uuid,
    name: String,
    target: SimulationTarget,
    attempts: u32,
    cadence: Duration,
    dry: bool,
    token: CancellationToken,
    bus: Bus,
    progress: Arc<AtomicU8>,
    pool_max: usize,
}

impl Simulation {
    /// Creates a simulation driver.
    ///
    /// Preconditions (fatal invariants): `attempts > 0`, `cadence > 0`.
    pub fn new(
        name: impl Into<String>,
        target: SimulationTarget,
        attempts: u32,
        cadence: Duration,
        dry: bool,
        token: CancellationToken,
        bus: Bus,
    ) -> Self {
        crate::assert::ensure(attempts > 0, "simulation must have at least 1 attempt");
        crate::assert::ensure(cadence > Duration::ZERO, "simulation cadence must be positive");

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            target,
            attempts,
            cadence,
            dry,
            token,
            bus,
            progress: Arc::new(AtomicU8::new(0)),
            pool_max: 10,
        }
    }

    /// Builds a simulation from wire configuration.
    ///
    /// Creates `target.count` HTTP clients for the target endpoint and, when
    /// configured, the monitor probe specifications. Durations in the config
    /// are whole seconds.
    pub fn from_config(cfg: &SimulationConfig, dry: bool, token: CancellationToken, bus: Bus) -> Self {
        let clients: Vec<Arc<dyn RequestClient>> = (0..cfg.target.count)
            .map(|_| Arc::new(ApiClient::from_config(&cfg.target.client)) as Arc<dyn RequestClient>)
            .collect();

        let monitor = cfg.target.monitor.as_ref().map(|m| SimulationMonitorSpec {
            name: m.name.clone(),
            targets: MonitorTarget::from_configs(&m.monitor_targets),
        });

        Self::new(
            cfg.name.clone(),
            SimulationTarget::new(clients, monitor),
            cfg.attempts,
            cfg.cadence_duration(),
            dry,
            token,
            bus,
        )
    }

    /// Overrides the worker ceiling of the simulation's pool.
    ///
    /// The floor stays 1; the ceiling is a fatal invariant if it is not in
    /// `2..=MAX_WORKERS`.
    pub fn with_pool_ceiling(mut self, max: usize) -> Self {
        crate::assert::ensure_with(
            max > 1 && max <= MAX_WORKERS,
            "simulation pool ceiling out of range",
            &[("max", max.to_string())],
        );
        self.pool_max = max;
        self
    }

    /// Stable identifier of this simulation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of attempt rounds.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Shared progress percentage (0..=100), updated per round.
    pub fn progress_handle(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.progress)
    }

    /// Runs the full matrix to a terminal outcome. Drive once.
    pub async fn start(&self) -> SimulationOutcome {
        self.bus
            .publish(Event::now(EventKind::SimulationStarted).with_simulation(&self.name));

        let pool = WorkerPool::new(1, self.pool_max, Duration::from_secs(5), self.bus.clone());
        pool.run();

        let mut cancelled = false;
        'rounds: for a in 0..self.attempts {
            if self.token.is_cancelled() {
                cancelled = true;
                break;
            }
            self.bus.publish(
                Event::now(EventKind::AttemptStarted)
                    .with_simulation(&self.name)
                    .with_attempt(a + 1),
            );

            for client in &self.target.clients {
                let task = self.request_task(Arc::clone(client));
                if pool.submit(task).await.is_err() {
                    cancelled = true;
                    break 'rounds;
                }
            }
            self.progress
                .store((((a + 1) * 100) / self.attempts) as u8, Ordering::Release);

            if a + 1 < self.attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.cadence) => {}
                    _ = self.token.cancelled() => {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if !cancelled {
            tokio::select! {
                _ = pool.wait() => {}
                _ = self.token.cancelled() => {
                    cancelled = true;
                }
            }
        }
        pool.stop().await;

        if cancelled {
            self.bus
                .publish(Event::now(EventKind::SimulationCancelled).with_simulation(&self.name));
            SimulationOutcome::Cancelled
        } else if pool.panic_count() > 0 {
            self.bus
                .publish(Event::now(EventKind::SimulationFailed).with_simulation(&self.name));
            SimulationOutcome::Failed
        } else {
            self.progress.store(100, Ordering::Release);
            self.bus
                .publish(Event::now(EventKind::SimulationCompleted).with_simulation(&self.name));
            SimulationOutcome::Completed
        }
    }

    /// Builds one request task: POST, extract marker, run the monitor.
    fn request_task(&self, client: Arc<dyn RequestClient>) -> TaskRef {
        let sim = self.name.clone();
        let bus = self.bus.clone();
        let token = self.token.clone();
        let monitor = self.target.monitor.clone();
        let marker = self.target.marker.clone();
        let dry = self.dry;

        TaskFn::arc(
            format!("{} {}", self.name, self.id),
            move |_ctx: CancellationToken| {
                let client = Arc::clone(&client);
                let sim = sim.clone();
                let bus = bus.clone();
                let token = token.clone();
                let monitor = monitor.clone();
                let marker = marker.clone();
                async move {
                    let body = if dry {
                        None
                    } else {
                        match client.post().await {
                            Ok(b) => Some(b),
                            Err(e) => {
                                bus.publish(
                                    Event::now(EventKind::RequestFailed)
                                        .with_simulation(&sim)
                                        .with_error(e.to_string()),
                                );
                                None
                            }
                        }
                    };

                    let marker = marker
                        .as_ref()
                        .zip(body.as_deref())
                        .and_then(|(hook, body)| hook(body));

                    if let Some(spec) = &monitor {
                        let name = match &marker {
                            Some(m) => format!("{} {m}", spec.name),
                            None => spec.name.clone(),
                        };
                        let m = Monitor::new(
                            name,
                            spec.targets.clone(),
                            token.child_token(),
                            bus.clone(),
                            dry,
                        );
                        let _ = m.start().await;
                    }
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;
    use crate::error::ClientError;

    struct StubClient {
        body: String,
        posts: AtomicUsize,
        gets: AtomicUsize,
        panic_on_post: bool,
    }

    impl StubClient {
        fn returning(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: body.to_string(),
                posts: AtomicUsize::new(0),
                gets: AtomicUsize::new(0),
                panic_on_post: false,
            })
        }

        fn panicking() -> Arc<Self> {
            Arc::new(Self {
                body: String::new(),
                posts: AtomicUsize::new(0),
                gets: AtomicUsize::new(0),
                panic_on_post: true,
            })
        }
    }

    #[async_trait]
    impl RequestClient for StubClient {
        fn url(&self) -> &str {
            "stub://simulation"
        }

        async fn post(&self) -> Result<String, ClientError> {
            if self.panic_on_post {
                panic!("post exploded");
            }
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }

        async fn get(&self) -> Result<String, ClientError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn fanout(client: &Arc<StubClient>, count: usize) -> Vec<Arc<dyn RequestClient>> {
        (0..count)
            .map(|_| Arc::clone(client) as Arc<dyn RequestClient>)
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_attempts_times_count_tasks() {
        let client = StubClient::returning("{}");
        let sim = Simulation::new(
            "s1",
            SimulationTarget::new(fanout(&client, 3), None),
            2,
            Duration::from_millis(100),
            false,
            CancellationToken::new(),
            Bus::new(256),
        );

        let started = Instant::now();
        let outcome = sim.start().await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, SimulationOutcome::Completed);
        assert_eq!(client.posts.load(Ordering::SeqCst), 6);
        assert_eq!(sim.progress_handle().load(Ordering::SeqCst), 100);
        assert!(elapsed >= Duration::from_millis(100), "one cadence sleep");
        assert!(elapsed < Duration::from_millis(300), "final round does not sleep");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_attempt_skips_the_cadence_sleep() {
        let client = StubClient::returning("{}");
        let sim = Simulation::new(
            "quick",
            SimulationTarget::new(fanout(&client, 1), None),
            1,
            Duration::from_secs(30),
            false,
            CancellationToken::new(),
            Bus::new(64),
        );

        let started = Instant::now();
        let outcome = sim.start().await;

        assert_eq!(outcome, SimulationOutcome::Completed);
        assert_eq!(client.posts.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dry_run_suppresses_requests_but_completes() {
        let client = StubClient::returning("{}");
        let sim = Simulation::new(
            "dry",
            SimulationTarget::new(fanout(&client, 3), None),
            2,
            Duration::from_millis(50),
            true,
            CancellationToken::new(),
            Bus::new(64),
        );

        let outcome = sim.start().await;
        assert_eq!(outcome, SimulationOutcome::Completed);
        assert_eq!(client.posts.load(Ordering::SeqCst), 0);
        assert_eq!(sim.progress_handle().load(Ordering::SeqCst), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancellation_stops_the_matrix_promptly() {
        let client = StubClient::returning("{}");
        let token = CancellationToken::new();
        let sim = Arc::new(Simulation::new(
            "long",
            SimulationTarget::new(fanout(&client, 3), None),
            100,
            Duration::from_millis(100),
            false,
            token.clone(),
            Bus::new(256),
        ));
        let progress = sim.progress_handle();

        let handle = {
            let sim = Arc::clone(&sim);
            tokio::spawn(async move { sim.start().await })
        };

        // Wait until at least one round went out, then cancel.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(progress.load(Ordering::SeqCst) > 0);
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("simulation returned promptly")
            .expect("task");
        assert_eq!(outcome, SimulationOutcome::Cancelled);

        let posts = client.posts.load(Ordering::SeqCst);
        assert!(posts > 0);
        assert!(posts < 300, "cancellation prevented the full matrix");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn task_panic_marks_the_simulation_failed() {
        let client = StubClient::panicking();
        let sim = Simulation::new(
            "fragile",
            SimulationTarget::new(fanout(&client, 1), None),
            1,
            Duration::from_millis(10),
            false,
            CancellationToken::new(),
            Bus::new(64),
        );

        let outcome = sim.start().await;
        assert_eq!(outcome, SimulationOutcome::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn monitor_runs_after_each_request_task() {
        let client = StubClient::returning(r#"{"status": "ok"}"#);
        let probe_client = StubClient::returning(r#"{"status": "ok"}"#);

        let mut expected = Map::new();
        expected.insert("status".to_string(), Value::String("ok".to_string()));

        let monitor = SimulationMonitorSpec {
            name: "health".to_string(),
            targets: vec![MonitorTarget::new(
                Arc::clone(&probe_client) as Arc<dyn RequestClient>,
                expected,
                Duration::from_millis(50),
                3,
            )],
        };

        let sim = Simulation::new(
            "monitored",
            SimulationTarget::new(fanout(&client, 1), Some(monitor)),
            2,
            Duration::from_millis(20),
            false,
            CancellationToken::new(),
            Bus::new(256),
        );

        let outcome = sim.start().await;
        assert_eq!(outcome, SimulationOutcome::Completed);
        assert_eq!(client.posts.load(Ordering::SeqCst), 2);
        // One satisfied probe per request task.
        assert_eq!(probe_client.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn marker_hook_sees_the_response_body() {
        let client = StubClient::returning(r#"{"id": "abc-123"}"#);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let hook: MarkerHook = {
            let seen = Arc::clone(&seen);
            Arc::new(move |body: &str| {
                let id = serde_json::from_str::<Value>(body)
                    .ok()?
                    .get("id")?
                    .as_str()?
                    .to_string();
                seen.lock().expect("seen").push(id.clone());
                Some(id)
            })
        };

        let sim = Simulation::new(
            "marked",
            SimulationTarget::new(fanout(&client, 1), None).with_marker(hook),
            1,
            Duration::from_millis(10),
            false,
            CancellationToken::new(),
            Bus::new(64),
        );

        let outcome = sim.start().await;
        assert_eq!(outcome, SimulationOutcome::Completed);
        assert_eq!(seen.lock().expect("seen").as_slice(), ["abc-123"]);
    }
}
