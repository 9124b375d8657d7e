//! # Monitor: poll-until-match probes.
//!
//! A monitor drives `N` independent probes, one per configured target. Each
//! probe polls its endpoint until the decoded response equals the expected
//! value by structural deep equality, or until its retry budget runs out.
//!
//! ## Per-probe algorithm
//! ```text
//! for attempt in 1..=retries {
//!   exit if cancelled
//!   GET → body
//!     transport error  → ProbeRequestFailed (transient, budget consumed)
//!     decode failure   → fatal invariant (broken fixture)
//!     match            → ProbeMatched, satisfied, exit
//!   sleep freq (cancellable)
//! }
//! ProbeExhausted
//! ```
//!
//! ## Rules
//! - Equality is JSON-value equality: same key set, same values recursively;
//!   key order irrelevant, array order significant.
//! - An exhausted probe never fails the surrounding simulation.
//! - Probes run on an internal pool (`min=1, max=10, idle=5s`); `start`
//!   blocks until every probe terminated and is single-use.
//! - In dry mode no GET is issued; the probe walks its budget and exhausts.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, RequestClient};
use crate::config::MonitorTargetConfig;
use crate::events::{Bus, Event, EventKind};
use crate::pool::WorkerPool;
use crate::tasks::TaskFn;

/// One poll-until-match probe specification.
#[derive(Clone)]
pub struct MonitorTarget {
    client: Arc<dyn RequestClient>,
    expected: Map<String, Value>,
    freq: Duration,
    retries: u32,
}

impl MonitorTarget {
    /// Creates a probe specification.
    ///
    /// `freq` must be positive (fatal invariant); `retries` may be zero, in
    /// which case the probe never issues a request.
    pub fn new(
        client: Arc<dyn RequestClient>,
        expected: Map<String, Value>,
        freq: Duration,
        retries: u32,
    ) -> Self {
        crate::assert::ensure(freq > Duration::ZERO, "monitor target freq must be positive");
        Self {
            client,
            expected,
            freq,
            retries,
        }
    }

    /// Builds probe specifications from wire configuration.
    pub fn from_configs(configs: &[MonitorTargetConfig]) -> Vec<Self> {
        configs
            .iter()
            .map(|c| {
                Self::new(
                    Arc::new(ApiClient::from_config(&c.client)),
                    c.expected_response.clone(),
                    Duration::from_secs(c.freq),
                    c.retries,
                )
            })
            .collect()
    }
}

/// Tally of probe outcomes returned by [`Monitor::start`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorReport {
    /// Probes whose response matched the expected value.
    pub satisfied: u32,
    /// Probes that consumed their budget without a match.
    pub exhausted: u32,
    /// Probes that exited early on cancellation.
    pub cancelled: u32,
}

#[derive(Default)]
struct Tally {
    satisfied: AtomicU32,
    exhausted: AtomicU32,
    cancelled: AtomicU32,
}

/// A named group of probes. Single-use: `start` consumes the monitor.
pub struct Monitor {
    name: String,
    targets: Vec<MonitorTarget>,
    token: CancellationToken,
    bus: Bus,
    dry: bool,
}

impl Monitor {
    /// Creates a monitor over a non-empty set of probe targets.
    pub fn new(
        name: impl Into<String>,
        targets: Vec<MonitorTarget>,
        token: CancellationToken,
        bus: Bus,
        dry: bool,
    ) -> Self {
        crate::assert::ensure(!targets.is_empty(), "monitor must have at least one target");
        Self {
            name: name.into(),
            targets,
            token,
            bus,
            dry,
        }
    }

    /// Runs every probe to termination and reports the tally.
    pub async fn start(self) -> MonitorReport {
        self.bus
            .publish(Event::now(EventKind::MonitorStarted).with_simulation(&self.name));

        let pool = WorkerPool::new(1, 10, Duration::from_secs(5), self.bus.clone());
        pool.run();

        let tally = Arc::new(Tally::default());
        for (i, target) in self.targets.into_iter().enumerate() {
            let name = self.name.clone();
            let bus = self.bus.clone();
            let token = self.token.child_token();
            let tally = Arc::clone(&tally);
            let dry = self.dry;

            let task = TaskFn::arc(
                format!("{} probe {i}", self.name),
                move |_ctx: CancellationToken| {
                    let target = target.clone();
                    let name = name.clone();
                    let bus = bus.clone();
                    let token = token.clone();
                    let tally = Arc::clone(&tally);
                    async move {
                        probe(target, name, token, bus, dry, tally).await;
                    }
                },
            );

            if pool.submit(task).await.is_err() {
                break;
            }
        }

        pool.wait().await;
        pool.stop().await;

        let report = MonitorReport {
            satisfied: tally.satisfied.load(Ordering::Acquire),
            exhausted: tally.exhausted.load(Ordering::Acquire),
            cancelled: tally.cancelled.load(Ordering::Acquire),
        };
        self.bus
            .publish(Event::now(EventKind::MonitorFinished).with_simulation(&self.name));
        report
    }
}

/// Drives a single probe to a terminal state.
async fn probe(
    target: MonitorTarget,
    monitor: String,
    token: CancellationToken,
    bus: Bus,
    dry: bool,
    tally: Arc<Tally>,
) {
    for attempt in 1..=target.retries {
        if token.is_cancelled() {
            tally.cancelled.fetch_add(1, Ordering::AcqRel);
            return;
        }

        if !dry {
            match target.client.get().await {
                Err(e) => {
                    bus.publish(
                        Event::now(EventKind::ProbeRequestFailed)
                            .with_simulation(&monitor)
                            .with_attempt(attempt)
                            .with_error(e.to_string()),
                    );
                }
                Ok(body) => {
                    // A response that is not a JSON object is a broken
                    // fixture, not an operational condition.
                    let actual: Map<String, Value> = crate::assert::no_error(
                        serde_json::from_str(&body),
                        "monitor response body must decode as a JSON object",
                    );
                    if actual == target.expected {
                        tally.satisfied.fetch_add(1, Ordering::AcqRel);
                        bus.publish(
                            Event::now(EventKind::ProbeMatched)
                                .with_simulation(&monitor)
                                .with_attempt(attempt),
                        );
                        return;
                    }
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(target.freq) => {}
            _ = token.cancelled() => {
                tally.cancelled.fetch_add(1, Ordering::AcqRel);
                return;
            }
        }
    }

    tally.exhausted.fetch_add(1, Ordering::AcqRel);
    bus.publish(
        Event::now(EventKind::ProbeExhausted)
            .with_simulation(&monitor)
            .with_attempt(target.retries),
    );
}
