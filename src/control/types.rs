//! # Wire types for the control API.
//!
//! Request and response bodies exchanged with external callers. Field names
//! follow the wire convention of the protocol (snake_case), except for the
//! embedded simulation configuration, which keeps its camelCase schema (see
//! [`crate::config`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::TargetConfig;
use crate::error::ControlError;

/// Request to start a simulation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartRequest {
    /// Display name (required, non-empty).
    #[serde(default)]
    pub name: String,
    /// Fan-out specification.
    pub target: TargetConfig,
    /// Seconds between rounds; defaulted to 1 when missing or non-positive.
    #[serde(default)]
    pub cadence: i64,
    /// Number of rounds; defaulted to 1 when missing or non-positive.
    #[serde(default)]
    pub attempts: i64,
    /// Suppress external I/O while keeping the scheduling behaviour.
    #[serde(default)]
    pub dry: bool,
}

/// Request naming one simulation by id.
#[derive(Debug, Clone, Deserialize)]
pub struct IdRequest {
    /// Simulation identifier as printed by the start response.
    pub id: String,
}

/// Response to start/stop/results operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResponse {
    /// Simulation identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Current status.
    pub status: String,
    /// Human-readable summary of the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Textual result lines (results operation only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<String>>,
}

/// One entry of the list operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInfo {
    /// Simulation identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Current status.
    pub status: String,
    /// Start timestamp.
    pub start_time: DateTime<Utc>,
    /// End timestamp, present once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Configured attempt rounds.
    pub attempts: u32,
    /// Progress percentage (0..=100).
    pub progress: u8,
}

/// Response to the list operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationListResponse {
    /// All registered simulations, ordering unspecified.
    pub simulations: Vec<SimulationInfo>,
    /// Human-readable summary.
    pub message: String,
}

/// Request to validate a raw configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    /// Raw configuration document.
    pub config: Value,
    /// Declared configuration type (currently only "simulation").
    #[serde(rename = "type", default)]
    pub config_type: String,
}

/// Response to the validate operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Whether the configuration parsed and passed semantic checks.
    pub valid: bool,
    /// Problems found, empty when valid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Human-readable summary.
    pub message: String,
}

/// Request for a canonical configuration template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateRequest {
    /// Requested configuration type (currently only "simulation").
    #[serde(rename = "type", default)]
    pub config_type: String,
}

/// Response carrying a canonical configuration template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateResponse {
    /// The template document.
    pub template: Value,
    /// Human-readable summary.
    pub message: String,
}

/// Uniform error body for all operational failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error label (e.g. `simulation_not_found`).
    pub error: String,
    /// HTTP-style status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
}

impl From<&ControlError> for ErrorBody {
    fn from(err: &ControlError) -> Self {
        Self {
            error: err.as_label().to_string(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}
