//! # loadvisor
//!
//! **Loadvisor** is a declarative load-simulation harness: it repeatedly
//! exercises a target HTTP endpoint from many concurrent clients while
//! monitors poll related endpoints until their responses match an expected
//! shape.
//!
//! ## Features
//!
//! | Area            | Description                                                           | Key types / traits                          |
//! |-----------------|-----------------------------------------------------------------------|---------------------------------------------|
//! | **Worker pool** | Elastic executor with a floor, a ceiling, and idle reaping.           | [`WorkerPool`]                              |
//! | **Tasks**       | Opaque cancellable units of work, usually closures.                   | [`Task`], [`TaskFn`], [`TaskRef`]           |
//! | **Simulation**  | The `attempts × count` request matrix at a fixed cadence.             | [`Simulation`], [`SimulationTarget`]        |
//! | **Monitor**     | Poll-until-match probes with per-target retry budgets.                | [`Monitor`], [`MonitorTarget`]              |
//! | **Registry**    | Concurrent id → record map with cancel handles.                       | [`SimulationRegistry`], [`SimulationRecord`]|
//! | **Control API** | start / list / stop / results / validate / template over a dispatch table. | [`ControlApi`]                         |
//! | **Events**      | Structured lifecycle events through a broadcast bus.                  | [`Event`], [`EventKind`], [`Bus`]           |
//! | **Subscribers** | Non-blocking fan-out to pluggable sinks; built-in log writer.         | [`Subscribe`], [`SubscriberSet`], [`LogWriter`] |
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use loadvisor::{Bus, LogLevel, LogWriter, Simulation, SubscriberSet};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let bus = Bus::default();
//!     let subs = Arc::new(SubscriberSet::new(
//!         vec![Arc::new(LogWriter::new(LogLevel::Info)) as Arc<dyn loadvisor::Subscribe>],
//!         bus.clone(),
//!     ));
//!     subs.listen(&bus);
//!
//!     let config = loadvisor::config::load("simulation.json").expect("config");
//!     let token = CancellationToken::new();
//!     let sim = Simulation::from_config(&config, false, token.clone(), bus);
//!
//!     tokio::select! {
//!         outcome = sim.start() => println!("finished: {outcome:?}"),
//!         _ = tokio::time::sleep(Duration::from_secs(600)) => token.cancel(),
//!     }
//! }
//! ```
//!
//! ## Cancellation model
//!
//! Cooperative, hierarchical, one-shot: control plane → simulation →
//! task/monitor → probe. Child cancel never affects the parent; parent cancel
//! propagates down. In-flight work is never interrupted — cancellation is
//! observed between steps.

pub mod api;
pub mod assert;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod monitor;
pub mod pool;
pub mod registry;
pub mod shutdown;
pub mod simulation;
pub mod subscribers;
pub mod tasks;

// ---- Public re-exports ----

pub use api::{ApiClient, ClientConfig, RequestClient};
pub use config::SimulationConfig;
pub use control::ControlApi;
pub use error::{ClientError, ConfigError, ControlError, PoolError};
pub use events::{Bus, Event, EventKind};
pub use monitor::{Monitor, MonitorReport, MonitorTarget};
pub use pool::{WorkerPool, MAX_WORKERS};
pub use registry::{SimulationRecord, SimulationRegistry, SimulationStatus};
pub use simulation::{Simulation, SimulationOutcome, SimulationTarget};
pub use subscribers::{LogLevel, LogWriter, Subscribe, SubscriberSet};
pub use tasks::{Task, TaskFn, TaskRef};
