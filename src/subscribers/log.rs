//! # LogWriter — structured event printer
//!
//! The built-in subscriber that renders runtime events as `key=value` lines.
//!
//! ## Example output
//! ```text
//! [info] pool-started workers=1
//! [info] attempt-started simulation="s1" attempt=1
//! [debug] task-started task="s1 request" worker=2
//! [error] task-panicked task="s1 request" worker=2 err="boom"
//! [info] probe-matched simulation="checkout-monitor" attempt=1
//! ```
//!
//! ## Environment
//! - `DEBUG_LOG`: file path for output; stderr when unset.
//! - `DEBUG_TYPE=pretty`: multi-line rendering with one key per line.
//! - `NO_PRETTY_LOGGER`: disables pretty rendering even if requested.
//! - `OTEL_LOGS_ENABLED`, `OTEL_SERVICE_NAME`, `OTEL_SERVICE_VERSION`,
//!   `DEPLOYMENT_ENVIRONMENT`: reserved for an exporter; not interpreted here.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::subscribe::Subscribe;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RESET: &str = "\x1b[0m";

/// Severity assigned to rendered events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Per-task chatter (submit/start/finish).
    Trace,
    /// Worker lifecycle and probe attempts.
    Debug,
    /// Simulation and monitor milestones.
    Info,
    /// Drops, overflow, transient request failures.
    Warn,
    /// Panics and terminal failures.
    Error,
}

impl LogLevel {
    /// Parses a level name; an unrecognised name is a programmer error.
    pub fn parse(s: &str) -> Self {
        match s {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            other => crate::assert::never(&format!("unrecognised log level '{other}'")),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

enum Sink {
    Stderr,
    File(std::fs::File),
}

/// Event writer subscriber.
///
/// Renders every event at or above the configured level to stderr or to the
/// `DEBUG_LOG` file.
pub struct LogWriter {
    level: LogLevel,
    color: bool,
    pretty: bool,
    out: Mutex<Sink>,
}

impl LogWriter {
    /// Constructs a writer at the given level, writing plainly to stderr.
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            color: false,
            pretty: false,
            out: Mutex::new(Sink::Stderr),
        }
    }

    /// Constructs a writer honouring `DEBUG_LOG`, `DEBUG_TYPE` and
    /// `NO_PRETTY_LOGGER`, with colour controlled by the caller.
    #[must_use]
    pub fn from_env(level: LogLevel, color: bool) -> Self {
        let pretty = std::env::var("DEBUG_TYPE").as_deref() == Ok("pretty")
            && std::env::var_os("NO_PRETTY_LOGGER").is_none();

        let sink = match std::env::var_os("DEBUG_LOG") {
            Some(path) => match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(f) => Sink::File(f),
                Err(_) => Sink::Stderr,
            },
            None => Sink::Stderr,
        };

        let to_file = matches!(sink, Sink::File(_));
        Self {
            level,
            color: color && !to_file,
            pretty,
            out: Mutex::new(sink),
        }
    }

    fn level_of(kind: EventKind) -> LogLevel {
        match kind {
            EventKind::TaskSubmitted | EventKind::TaskStarted | EventKind::TaskFinished => {
                LogLevel::Trace
            }
            EventKind::WorkerSpawned
            | EventKind::WorkerRetired
            | EventKind::PoolStarted
            | EventKind::PoolStopped => LogLevel::Debug,
            EventKind::SimulationStarted
            | EventKind::AttemptStarted
            | EventKind::SimulationCompleted
            | EventKind::MonitorStarted
            | EventKind::MonitorFinished
            | EventKind::ProbeMatched
            | EventKind::ShutdownRequested => LogLevel::Info,
            EventKind::TaskDropped
            | EventKind::RequestFailed
            | EventKind::ProbeRequestFailed
            | EventKind::ProbeExhausted
            | EventKind::SimulationCancelled
            | EventKind::SubscriberOverflow => LogLevel::Warn,
            EventKind::TaskPanicked
            | EventKind::SimulationFailed
            | EventKind::SubscriberPanicked => LogLevel::Error,
        }
    }

    fn tag(kind: EventKind) -> &'static str {
        match kind {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::PoolStarted => "pool-started",
            EventKind::PoolStopped => "pool-stopped",
            EventKind::WorkerSpawned => "worker-spawned",
            EventKind::WorkerRetired => "worker-retired",
            EventKind::TaskSubmitted => "task-submitted",
            EventKind::TaskStarted => "task-started",
            EventKind::TaskFinished => "task-finished",
            EventKind::TaskPanicked => "task-panicked",
            EventKind::TaskDropped => "task-dropped",
            EventKind::SimulationStarted => "simulation-started",
            EventKind::AttemptStarted => "attempt-started",
            EventKind::RequestFailed => "request-failed",
            EventKind::SimulationCompleted => "simulation-completed",
            EventKind::SimulationCancelled => "simulation-cancelled",
            EventKind::SimulationFailed => "simulation-failed",
            EventKind::MonitorStarted => "monitor-started",
            EventKind::MonitorFinished => "monitor-finished",
            EventKind::ProbeMatched => "probe-matched",
            EventKind::ProbeRequestFailed => "probe-request-failed",
            EventKind::ProbeExhausted => "probe-exhausted",
            EventKind::ShutdownRequested => "shutdown-requested",
        }
    }

    fn render(&self, e: &Event, level: LogLevel) -> String {
        let mut fields: Vec<(&str, String)> = Vec::new();
        if let Some(sim) = &e.simulation {
            fields.push(("simulation", format!("{sim:?}")));
        }
        if let Some(task) = &e.task {
            fields.push(("task", format!("{task:?}")));
        }
        if let Some(worker) = e.worker {
            fields.push(("worker", worker.to_string()));
        }
        if let Some(attempt) = e.attempt {
            fields.push(("attempt", attempt.to_string()));
        }
        if let Some(err) = &e.error {
            fields.push(("err", format!("{err:?}")));
        }

        let (paint, reset) = if self.color {
            let paint = match level {
                LogLevel::Error => ANSI_RED,
                LogLevel::Warn => ANSI_YELLOW,
                LogLevel::Trace | LogLevel::Debug => ANSI_DIM,
                LogLevel::Info => "",
            };
            (paint, if paint.is_empty() { "" } else { ANSI_RESET })
        } else {
            ("", "")
        };

        let mut line = format!("{paint}[{}] {}{reset}", level.as_str(), Self::tag(e.kind));
        if self.pretty {
            for (k, v) in fields {
                let _ = write!(line, "\n    {k}={v}");
            }
        } else {
            for (k, v) in fields {
                let _ = write!(line, " {k}={v}");
            }
        }
        line
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let level = Self::level_of(e.kind);
        if level < self.level {
            return;
        }

        let line = self.render(e, level);
        if let Ok(mut sink) = self.out.lock() {
            let _ = match &mut *sink {
                Sink::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
                Sink::File(f) => writeln!(f, "{line}"),
            };
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

impl crate::assert::Flush for LogWriter {
    fn flush(&self) {
        if let Ok(mut sink) = self.out.lock() {
            let _ = match &mut *sink {
                Sink::Stderr => std::io::stderr().lock().flush(),
                Sink::File(f) => f.flush(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    #[test]
    fn level_parse_known_names() {
        assert_eq!(LogLevel::parse("trace"), LogLevel::Trace);
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert!(LogLevel::Warn > LogLevel::Info);
    }

    #[test]
    fn render_includes_fields_in_order() {
        let w = LogWriter::new(LogLevel::Trace);
        let ev = Event::now(EventKind::TaskPanicked)
            .with_task("t")
            .with_worker(4)
            .with_error("boom");

        let line = w.render(&ev, LogLevel::Error);
        assert_eq!(line, "[error] task-panicked task=\"t\" worker=4 err=\"boom\"");
    }

    #[test]
    fn pretty_render_splits_lines() {
        let mut w = LogWriter::new(LogLevel::Trace);
        w.pretty = true;
        let ev = Event::now(EventKind::ProbeExhausted).with_simulation("m");

        let line = w.render(&ev, LogLevel::Warn);
        assert!(line.starts_with("[warn] probe-exhausted"));
        assert!(line.contains("\n    simulation=\"m\""));
    }
}
