//! # Simulation configuration.
//!
//! Typed schema for the JSON configuration operators write, plus semantic
//! validation and a canonical template.
//!
//! ## Schema
//! ```json
//! {
//!   "name": "example-simulation",
//!   "target": {
//!     "count": 3,
//!     "client": { "url": "https://example.com/api", "contentType": "application/json" },
//!     "monitor": {
//!       "name": "example-monitor",
//!       "monitorTargets": [
//!         { "client": { "url": "https://example.com/health", "contentType": "application/json" },
//!           "freq": 5,
//!           "retries": 3,
//!           "expectedResponse": { "status": "ok" } }
//!       ]
//!     }
//!   },
//!   "cadence": 5,
//!   "attempts": 10
//! }
//! ```
//!
//! ## Rules
//! - Field names are camelCase on the wire; unknown fields are rejected.
//! - `cadence` and `freq` are **integers counted in seconds** and converted
//!   with `Duration::from_secs` when the simulation is built.
//! - Parsing and validation are separate steps: [`load`] / serde surface
//!   malformed JSON, [`SimulationConfig::validate`] returns the list of
//!   semantic problems.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ClientConfig;
use crate::error::ConfigError;

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimulationConfig {
    /// Display name of the simulation.
    pub name: String,
    /// Fan-out specification.
    pub target: TargetConfig,
    /// Seconds to sleep between attempt rounds.
    pub cadence: u64,
    /// Number of fan-out rounds.
    pub attempts: u32,
}

/// Fan-out specification: how many clients hit which endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetConfig {
    /// Number of request-issuing handles per round.
    pub count: u32,
    /// Endpoint the requests go to.
    pub client: ClientConfig,
    /// Optional monitor launched after each request task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorConfig>,
}

/// Monitor specification: a named group of poll-until-match probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MonitorConfig {
    /// Display name of the monitor.
    pub name: String,
    /// Probes to run after each request task.
    pub monitor_targets: Vec<MonitorTargetConfig>,
}

/// One poll-until-match probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MonitorTargetConfig {
    /// Endpoint the probe polls.
    pub client: ClientConfig,
    /// Seconds between polls.
    pub freq: u64,
    /// Maximum number of polls before the probe gives up.
    pub retries: u32,
    /// Response object the probe waits for (structural equality).
    pub expected_response: Map<String, Value>,
}

impl SimulationConfig {
    /// Returns the cadence as a duration (configured in whole seconds).
    pub fn cadence_duration(&self) -> Duration {
        Duration::from_secs(self.cadence)
    }

    /// Checks semantic constraints; returns all problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("simulation name is required".to_string());
        }
        if self.attempts == 0 {
            errors.push("attempts must be greater than 0".to_string());
        }
        if self.cadence == 0 {
            errors.push("cadence must be greater than 0".to_string());
        }
        if self.target.count == 0 {
            errors.push("target count must be greater than 0".to_string());
        }
        if self.target.client.url.is_empty() {
            errors.push("target client URL is required".to_string());
        }

        if let Some(monitor) = &self.target.monitor {
            if monitor.name.is_empty() {
                errors.push("monitor name is required".to_string());
            }
            if monitor.monitor_targets.is_empty() {
                errors.push("monitor must have at least one target".to_string());
            }
            for (i, t) in monitor.monitor_targets.iter().enumerate() {
                if t.client.url.is_empty() {
                    errors.push(format!("monitor target {i} client URL is required"));
                }
                if t.freq == 0 {
                    errors.push(format!("monitor target {i} freq must be greater than 0"));
                }
            }
        }

        errors
    }

    /// Canonical example configuration.
    pub fn template() -> Self {
        let mut expected = Map::new();
        expected.insert("status".to_string(), Value::String("ok".to_string()));

        Self {
            name: "example-simulation".to_string(),
            cadence: 5,
            attempts: 10,
            target: TargetConfig {
                count: 3,
                client: ClientConfig {
                    url: "https://example.com/api".to_string(),
                    content_type: "application/json".to_string(),
                },
                monitor: Some(MonitorConfig {
                    name: "example-monitor".to_string(),
                    monitor_targets: vec![MonitorTargetConfig {
                        client: ClientConfig {
                            url: "https://example.com/health".to_string(),
                            content_type: "application/json".to_string(),
                        },
                        freq: 5,
                        retries: 3,
                        expected_response: expected,
                    }],
                }),
            },
        }
    }
}

/// Loads and parses a configuration file (strict: unknown fields rejected).
pub fn load(path: impl AsRef<Path>) -> Result<SimulationConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "name": "s1",
            "target": {
                "count": 3,
                "client": { "url": "http://localhost:3333/api", "contentType": "application/json" },
                "monitor": {
                    "name": "s1-monitor",
                    "monitorTargets": [
                        {
                            "client": { "url": "http://localhost:3333/test", "contentType": "application/json" },
                            "freq": 1,
                            "retries": 3,
                            "expectedResponse": { "id": "test", "name": "A Test Response" }
                        }
                    ]
                }
            },
            "cadence": 1,
            "attempts": 2
        }"#
    }

    #[test]
    fn parses_full_configuration() {
        let cfg: SimulationConfig = serde_json::from_str(sample()).expect("parse");
        assert_eq!(cfg.name, "s1");
        assert_eq!(cfg.target.count, 3);
        assert_eq!(cfg.cadence_duration(), Duration::from_secs(1));
        let monitor = cfg.target.monitor.expect("monitor");
        assert_eq!(monitor.monitor_targets.len(), 1);
        assert_eq!(monitor.monitor_targets[0].retries, 3);
        assert_eq!(
            monitor.monitor_targets[0].expected_response["id"],
            Value::String("test".to_string())
        );
    }

    #[test]
    fn monitor_is_optional() {
        let cfg: SimulationConfig = serde_json::from_str(
            r#"{
                "name": "plain",
                "target": {
                    "count": 1,
                    "client": { "url": "http://localhost:3333", "contentType": "application/json" }
                },
                "cadence": 1,
                "attempts": 1
            }"#,
        )
        .expect("parse");
        assert!(cfg.target.monitor.is_none());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res: Result<SimulationConfig, _> = serde_json::from_str(
            r#"{
                "name": "plain",
                "target": {
                    "count": 1,
                    "client": { "url": "http://localhost:3333", "contentType": "application/json" }
                },
                "cadence": 1,
                "attempts": 1,
                "extra": true
            }"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn validation_collects_all_problems() {
        let mut cfg: SimulationConfig = serde_json::from_str(sample()).expect("parse");
        cfg.name.clear();
        cfg.attempts = 0;
        cfg.target.count = 0;
        cfg.target.client.url.clear();

        let errors = cfg.validate();
        assert!(errors.contains(&"simulation name is required".to_string()));
        assert!(errors.contains(&"attempts must be greater than 0".to_string()));
        assert!(errors.contains(&"target count must be greater than 0".to_string()));
        assert!(errors.contains(&"target client URL is required".to_string()));
    }

    #[test]
    fn template_is_valid() {
        assert!(SimulationConfig::template().validate().is_empty());
    }

    #[test]
    fn template_round_trips_through_json() {
        let raw = serde_json::to_string(&SimulationConfig::template()).expect("serialize");
        let back: SimulationConfig = serde_json::from_str(&raw).expect("reparse");
        assert_eq!(back, SimulationConfig::template());
    }
}
