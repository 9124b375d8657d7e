//! # Runtime events emitted by the pool, drivers, and control plane.
//!
//! The [`EventKind`] enum classifies event types across the subsystems:
//! - **Pool events**: worker lifecycle and task execution flow
//! - **Simulation events**: attempt rounds and terminal outcomes
//! - **Monitor events**: probe matches, exhaustion, transient failures
//! - **Subscriber events**: fan-out overflow and panic reports
//!
//! The [`Event`] struct carries optional metadata such as the simulation
//! name, task name, worker id, attempt counter and error text.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.
//!
//! ## Event flow examples
//!
//! ### One simulation round
//! ```text
//! SimulationStarted
//!   → AttemptStarted{attempt=1}
//!   → TaskSubmitted × count
//!   → TaskStarted / TaskFinished per worker
//!   → ... remaining attempts ...
//!   → SimulationCompleted
//! ```
//!
//! ### One monitor probe
//! ```text
//! MonitorStarted
//!   → ProbeRequestFailed (transient, counts against the budget)
//!   → ProbeMatched | ProbeExhausted
//!   → MonitorFinished
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Worker pool events ===
    /// Pool started and spawned its floor workers.
    PoolStarted,
    /// Pool stopped; queued tasks were dropped.
    PoolStopped,
    /// A worker was added to the pool.
    WorkerSpawned,
    /// A worker exited (idle reap or pool stop).
    WorkerRetired,

    // === Task events ===
    /// A task was accepted by the pool.
    TaskSubmitted,
    /// A worker began executing a task.
    TaskStarted,
    /// A task ran to completion.
    TaskFinished,
    /// A task panicked; the worker recovered and continues.
    TaskPanicked,
    /// A queued task was dropped because the pool stopped first.
    TaskDropped,

    // === Simulation events ===
    /// A simulation driver started.
    SimulationStarted,
    /// A fan-out round began.
    AttemptStarted,
    /// The POST request inside a task failed.
    RequestFailed,
    /// The simulation finished all attempts.
    SimulationCompleted,
    /// The simulation was cancelled externally.
    SimulationCancelled,
    /// A task panic marked the simulation as failed.
    SimulationFailed,

    // === Monitor events ===
    /// A monitor began polling its targets.
    MonitorStarted,
    /// All probes of a monitor terminated.
    MonitorFinished,
    /// A probe response matched the expected value.
    ProbeMatched,
    /// A probe request failed; retry budget is still consumed.
    ProbeRequestFailed,
    /// A probe consumed its retry budget without a match.
    ProbeExhausted,

    // === Control plane ===
    /// Shutdown requested (OS signal received).
    ShutdownRequested,
}

/// Runtime event with optional metadata.
///
/// ## Fields
/// - `seq`: unique sequence number for ordering (monotonically increasing)
/// - `at`: wall-clock timestamp (may go backwards due to NTP; logging only)
/// - `kind`: event classification
/// - `simulation`, `task`, `worker`, `attempt`, `error`: optional metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Simulation or monitor display name, if applicable.
    pub simulation: Option<String>,
    /// Task name, if applicable.
    pub task: Option<String>,
    /// Worker id, if applicable.
    pub worker: Option<u64>,
    /// Attempt counter (starting from 1), if applicable.
    pub attempt: Option<u32>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            simulation: None,
            task: None,
            worker: None,
            attempt: None,
            error: None,
        }
    }

    /// Attaches a simulation or monitor name.
    pub fn with_simulation(mut self, name: impl Into<String>) -> Self {
        self.simulation = Some(name.into());
        self
    }

    /// Attaches a task name.
    pub fn with_task(mut self, name: impl Into<String>) -> Self {
        self.task = Some(name.into());
        self
    }

    /// Attaches a worker id.
    pub fn with_worker(mut self, id: u64) -> Self {
        self.worker = Some(id);
        self
    }

    /// Attaches an attempt counter.
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Creates a subscriber overflow event.
    ///
    /// Emitted when a subscriber's queue is full and an event is dropped.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_error(info)
    }
}
