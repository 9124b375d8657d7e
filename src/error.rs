//! # Error types used by the loadvisor runtime.
//!
//! One enum per concern:
//!
//! - [`PoolError`] submission failures raised by the worker pool.
//! - [`ClientError`] transport failures raised by the HTTP client capability.
//! - [`ConfigError`] failures loading or parsing a simulation configuration.
//! - [`ControlError`] operational failures surfaced by the control API.
//!
//! All types provide `as_label()` returning a short stable snake_case code for
//! logs and wire responses. Programmer invariants (bad pool bounds, corrupt
//! fixtures) never appear here; those go through [`crate::assert`].

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by [`WorkerPool::submit`](crate::pool::WorkerPool::submit).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been stopped; no further submissions are accepted.
    #[error("worker pool is shut down")]
    Shutdown,
}

impl PoolError {
    /// Returns a short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::Shutdown => "pool_shutdown",
        }
    }
}

/// Errors produced by the HTTP request capability.
///
/// These are **operational** failures: the monitor treats them as transient
/// (logged and counted against the retry budget), the simulation driver logs
/// them and moves on.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be sent or the response body could not be read.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code returned by the server.
        status: u16,
        /// Request URL, for diagnostics.
        url: String,
    },
}

impl ClientError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::Http(_) => "client_http",
            ClientError::Status { .. } => "client_status",
        }
    }
}

/// Errors produced while loading a simulation configuration from disk.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was being read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that was being parsed.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but failed semantic validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Invalid(_) => "config_invalid",
        }
    }
}

/// Operational failures surfaced by the control API.
///
/// Each variant maps onto the uniform `{error, code, message}` wire shape via
/// [`ControlError::code`] and [`ControlError::as_label`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControlError {
    /// The request was malformed or missing required fields.
    #[error("{0}")]
    InvalidRequest(String),

    /// The named control operation is not registered.
    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    /// No simulation with the given identifier exists in the registry.
    #[error("simulation with ID {0} not found")]
    SimulationNotFound(Uuid),

    /// Stop was requested for a simulation that is not running.
    #[error("simulation {id} is not running (status: {status})")]
    SimulationNotRunning {
        /// Identifier of the simulation.
        id: Uuid,
        /// Its current (terminal) status.
        status: String,
    },

    /// The handler itself failed while executing.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    /// Template or validation was requested for an unknown config type.
    #[error("unsupported config type: {0}")]
    UnsupportedType(String),
}

impl ControlError {
    /// Returns the wire error code (HTTP-style).
    pub fn code(&self) -> u16 {
        match self {
            ControlError::InvalidRequest(_) => 400,
            ControlError::ToolNotFound(_) => 404,
            ControlError::SimulationNotFound(_) => 404,
            ControlError::SimulationNotRunning { .. } => 400,
            ControlError::ExecutionFailed(_) => 500,
            ControlError::UnsupportedType(_) => 400,
        }
    }

    /// Returns a short stable label used as the wire `error` field.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::InvalidRequest(_) => "invalid_request",
            ControlError::ToolNotFound(_) => "tool_not_found",
            ControlError::SimulationNotFound(_) => "simulation_not_found",
            ControlError::SimulationNotRunning { .. } => "simulation_not_running",
            ControlError::ExecutionFailed(_) => "tool_execution_failed",
            ControlError::UnsupportedType(_) => "unsupported_type",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_error_codes_match_labels() {
        let cases: Vec<(ControlError, u16, &str)> = vec![
            (
                ControlError::InvalidRequest("name is required".into()),
                400,
                "invalid_request",
            ),
            (
                ControlError::ToolNotFound("bogus".into()),
                404,
                "tool_not_found",
            ),
            (
                ControlError::SimulationNotFound(Uuid::nil()),
                404,
                "simulation_not_found",
            ),
            (
                ControlError::SimulationNotRunning {
                    id: Uuid::nil(),
                    status: "completed".into(),
                },
                400,
                "simulation_not_running",
            ),
            (
                ControlError::ExecutionFailed("boom".into()),
                500,
                "tool_execution_failed",
            ),
            (
                ControlError::UnsupportedType("monitor".into()),
                400,
                "unsupported_type",
            ),
        ];

        for (err, code, label) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.as_label(), label);
        }
    }

    #[test]
    fn pool_error_label() {
        assert_eq!(PoolError::Shutdown.as_label(), "pool_shutdown");
    }
}
