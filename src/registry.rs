//! # Simulation registry: id → record, safe under concurrent access.
//!
//! The registry mediates between external control-plane requests and the
//! internal simulation lifecycle. It owns nothing but the records; the
//! simulation's own state machine drives its teardown, the record merely
//! mirrors it and holds the cancel handle.
//!
//! ## Rules
//! - Identifiers are uniquely generated; `insert` cannot collide.
//! - `lookup`/`remove` are O(1); `remove` is idempotent.
//! - `snapshot` returns a consistent list; ordering unspecified; readers do
//!   not block each other and may trail the latest write.
//! - A record's status moves `running → completed | cancelled | failed`
//!   exactly once; later transitions are ignored.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::simulation::SimulationOutcome;

/// Lifecycle state of a registered simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStatus {
    /// The driver is executing.
    Running,
    /// All attempts finished.
    Completed,
    /// Cancelled through the control plane.
    Cancelled,
    /// A task panic surfaced.
    Failed,
}

impl SimulationStatus {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SimulationStatus::Running => "running",
            SimulationStatus::Completed => "completed",
            SimulationStatus::Cancelled => "cancelled",
            SimulationStatus::Failed => "failed",
        }
    }

    /// Maps a driver outcome onto the terminal status.
    pub fn from_outcome(outcome: SimulationOutcome) -> Self {
        match outcome {
            SimulationOutcome::Completed => SimulationStatus::Completed,
            SimulationOutcome::Cancelled => SimulationStatus::Cancelled,
            SimulationOutcome::Failed => SimulationStatus::Failed,
        }
    }
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct RecordState {
    status: SimulationStatus,
    ended_at: Option<DateTime<Utc>>,
}

/// Registry entry for one simulation.
pub struct SimulationRecord {
    id: Uuid,
    name: String,
    attempts: u32,
    started_at: DateTime<Utc>,
    progress: Arc<AtomicU8>,
    cancel: CancellationToken,
    state: RwLock<RecordState>,
}

impl SimulationRecord {
    /// Creates a record in the *running* state.
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        attempts: u32,
        progress: Arc<AtomicU8>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            attempts,
            started_at: Utc::now(),
            progress,
            cancel,
            state: RwLock::new(RecordState {
                status: SimulationStatus::Running,
                ended_at: None,
            }),
        })
    }

    /// Simulation identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured number of attempt rounds.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start timestamp.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// End timestamp, once terminal.
    pub async fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.ended_at
    }

    /// Current status.
    pub async fn status(&self) -> SimulationStatus {
        self.state.read().await.status
    }

    /// Current progress percentage (0..=100).
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    /// Cancel handle for the underlying simulation.
    pub fn cancel_handle(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Transitions to a terminal status and stamps the end time.
    ///
    /// Only the first transition wins; a record that is already terminal is
    /// left untouched (the control plane may have marked it cancelled before
    /// the driver unwound).
    pub async fn finish(&self, status: SimulationStatus) {
        let mut state = self.state.write().await;
        if state.status != SimulationStatus::Running {
            return;
        }
        state.status = status;
        state.ended_at = Some(Utc::now());
    }
}

/// Process-wide mapping from simulation identifier to record.
#[derive(Default)]
pub struct SimulationRegistry {
    simulations: DashMap<Uuid, Arc<SimulationRecord>>,
}

impl SimulationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts a record. Ids are uniquely generated, so no collision occurs.
    pub fn insert(&self, record: Arc<SimulationRecord>) {
        self.simulations.insert(record.id(), record);
    }

    /// Looks up a record by id.
    pub fn lookup(&self, id: Uuid) -> Option<Arc<SimulationRecord>> {
        self.simulations.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Removes a record; idempotent.
    pub fn remove(&self, id: Uuid) {
        self.simulations.remove(&id);
    }

    /// Consistent list of all records; ordering unspecified.
    pub fn snapshot(&self) -> Vec<Arc<SimulationRecord>> {
        self.simulations
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// Cancels every running simulation. Used on control-server shutdown.
    pub async fn cancel_all(&self) {
        for record in self.snapshot() {
            if record.status().await == SimulationStatus::Running {
                record.cancel_handle().cancel();
                record.finish(SimulationStatus::Cancelled).await;
            }
        }
    }

    /// Number of registered simulations.
    pub fn len(&self) -> usize {
        self.simulations.len()
    }

    /// True when no simulations are registered.
    pub fn is_empty(&self) -> bool {
        self.simulations.is_empty()
    }
}
