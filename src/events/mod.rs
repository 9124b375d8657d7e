//! # Event data-plane: who publishes and who consumes.
//!
//! Producers (publish to [`Bus`]):
//! - **WorkerPool** → `PoolStarted`, `PoolStopped`, `WorkerSpawned`,
//!   `WorkerRetired`, `TaskSubmitted`, `TaskStarted`, `TaskFinished`,
//!   `TaskPanicked`, `TaskDropped`
//! - **Simulation** → `SimulationStarted`, `AttemptStarted`, `RequestFailed`,
//!   terminal `SimulationCompleted` / `SimulationCancelled` / `SimulationFailed`
//! - **Monitor** → `MonitorStarted`, `MonitorFinished`, `ProbeMatched`,
//!   `ProbeRequestFailed`, `ProbeExhausted`
//! - **CLI / control server** → `ShutdownRequested`
//! - **SubscriberSet (workers)** → `SubscriberOverflow`, `SubscriberPanicked`
//!
//! Consumers subscribe through [`Bus::subscribe`]; the built-in consumer is
//! the [`SubscriberSet`](crate::subscribers::SubscriberSet) fan-out, which
//! delivers events to [`Subscribe`](crate::subscribers::Subscribe)
//! implementations such as [`LogWriter`](crate::subscribers::LogWriter).

mod bus;
mod event;

pub use bus::{Bus, DEFAULT_BUS_CAPACITY};
pub use event::{Event, EventKind};
