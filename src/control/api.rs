//! # ControlApi: typed operations over the registry and drivers.
//!
//! The control surface external callers use to start, list, stop, and query
//! simulations, plus configuration validation and template generation.
//!
//! ## Dispatch table
//!
//! | Tool | Behaviour |
//! |---|---|
//! | `run_simulation` | validate, build, register, launch asynchronously |
//! | `list_simulations` | registry snapshot mapped to info records |
//! | `stop_simulation` | cancel a running simulation |
//! | `get_simulation_results` | textual summary of one simulation |
//! | `validate_config` | parse + semantic checks, list of problems |
//! | `generate_config_template` | canonical example configuration |
//!
//! Failures use the uniform `{error, code, message}` body: 400 invalid
//! request, 404 unknown identifier or tool, 500 handler failure. How the
//! table is bridged to a transport (stdio, TCP, in-process) is the
//! transport's concern; see [`crate::control::transport`].

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::SimulationConfig;
use crate::error::ControlError;
use crate::events::Bus;
use crate::registry::{SimulationRecord, SimulationRegistry, SimulationStatus};
use crate::simulation::Simulation;

use super::types::{
    ErrorBody, IdRequest, SimulationInfo, SimulationListResponse, SimulationResponse,
    StartRequest, TemplateRequest, TemplateResponse, ValidateRequest, ValidateResponse,
};

/// Names of the registered control operations.
pub const TOOLS: &[&str] = &[
    "run_simulation",
    "list_simulations",
    "stop_simulation",
    "get_simulation_results",
    "validate_config",
    "generate_config_template",
];

/// Typed control operations over the simulation registry.
pub struct ControlApi {
    registry: Arc<SimulationRegistry>,
    bus: Bus,
}

impl ControlApi {
    /// Creates a control API with a fresh registry.
    pub fn new(bus: Bus) -> Self {
        Self {
            registry: SimulationRegistry::new(),
            bus,
        }
    }

    /// The registry this API manages.
    pub fn registry(&self) -> &Arc<SimulationRegistry> {
        &self.registry
    }

    /// Cancels every running simulation. Called on server shutdown.
    pub async fn shutdown(&self) {
        self.registry.cancel_all().await;
    }

    /// Routes one raw call to its handler and serializes the outcome.
    ///
    /// Unknown tool names yield `tool_not_found`; handler errors are mapped
    /// to the uniform error body.
    pub async fn dispatch(&self, tool: &str, params: Value) -> Value {
        let result = match tool {
            "run_simulation" => self.run_simulation(params).await,
            "list_simulations" => self.list_simulations().await,
            "stop_simulation" => self.stop_simulation(params).await,
            "get_simulation_results" => self.get_simulation_results(params).await,
            "validate_config" => self.validate_config(params),
            "generate_config_template" => self.generate_config_template(params),
            other => Err(ControlError::ToolNotFound(other.to_string())),
        };

        match result {
            Ok(value) => value,
            Err(err) => match serde_json::to_value(ErrorBody::from(&err)) {
                Ok(body) => body,
                Err(_) => Value::Null,
            },
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(params: Value, what: &str) -> Result<T, ControlError> {
        serde_json::from_value(params)
            .map_err(|e| ControlError::InvalidRequest(format!("failed to parse {what}: {e}")))
    }

    fn parse_id(raw: &str) -> Result<uuid::Uuid, ControlError> {
        raw.parse()
            .map_err(|_| ControlError::InvalidRequest("invalid simulation ID format".to_string()))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ControlError> {
        serde_json::to_value(value).map_err(|e| ControlError::ExecutionFailed(e.to_string()))
    }

    async fn info(record: &SimulationRecord) -> SimulationInfo {
        SimulationInfo {
            id: record.id(),
            name: record.name().to_string(),
            status: record.status().await.as_str().to_string(),
            start_time: record.started_at(),
            end_time: record.ended_at().await,
            attempts: record.attempts(),
            progress: record.progress(),
        }
    }

    /// Builds, registers, and asynchronously launches a simulation.
    async fn run_simulation(&self, params: Value) -> Result<Value, ControlError> {
        let req: StartRequest = Self::parse(params, "simulation request")?;
        if req.name.is_empty() {
            return Err(ControlError::InvalidRequest(
                "simulation name is required".to_string(),
            ));
        }

        let attempts = if req.attempts <= 0 { 1 } else { req.attempts as u32 };
        let cadence = if req.cadence <= 0 { 1 } else { req.cadence as u64 };

        let cfg = SimulationConfig {
            name: req.name.clone(),
            target: req.target,
            cadence,
            attempts,
        };
        let problems = cfg.validate();
        if !problems.is_empty() {
            return Err(ControlError::InvalidRequest(problems.join("; ")));
        }

        let token = CancellationToken::new();
        let sim = Simulation::from_config(&cfg, req.dry, token.clone(), self.bus.clone());
        let record = SimulationRecord::new(
            sim.id(),
            sim.name(),
            attempts,
            sim.progress_handle(),
            token,
        );
        self.registry.insert(Arc::clone(&record));

        let response = SimulationResponse {
            id: sim.id(),
            name: req.name.clone(),
            status: SimulationStatus::Running.as_str().to_string(),
            message: Some(format!("Simulation '{}' started successfully", req.name)),
            results: None,
        };

        tokio::spawn(async move {
            let status = match std::panic::AssertUnwindSafe(sim.start()).catch_unwind().await {
                Ok(outcome) => SimulationStatus::from_outcome(outcome),
                Err(_) => SimulationStatus::Failed,
            };
            record.finish(status).await;
        });

        Self::encode(&response)
    }

    /// Maps the registry snapshot to info records.
    async fn list_simulations(&self) -> Result<Value, ControlError> {
        let records = self.registry.snapshot();
        let mut simulations = Vec::with_capacity(records.len());
        for record in &records {
            simulations.push(Self::info(record).await);
        }

        Self::encode(&SimulationListResponse {
            message: format!("Found {} simulations", simulations.len()),
            simulations,
        })
    }

    /// Cancels a running simulation.
    ///
    /// Stopping an already cancelled simulation is an idempotent no-op that
    /// returns the terminal record; stopping a completed or failed one is a
    /// client error.
    async fn stop_simulation(&self, params: Value) -> Result<Value, ControlError> {
        let req: IdRequest = Self::parse(params, "stop simulation request")?;
        let id = Self::parse_id(&req.id)?;

        let record = self
            .registry
            .lookup(id)
            .ok_or(ControlError::SimulationNotFound(id))?;

        match record.status().await {
            SimulationStatus::Running => {
                record.cancel_handle().cancel();
                record.finish(SimulationStatus::Cancelled).await;
                Self::encode(&SimulationResponse {
                    id,
                    name: record.name().to_string(),
                    status: SimulationStatus::Cancelled.as_str().to_string(),
                    message: Some(format!(
                        "Simulation '{}' stopped successfully",
                        record.name()
                    )),
                    results: None,
                })
            }
            SimulationStatus::Cancelled => Self::encode(&SimulationResponse {
                id,
                name: record.name().to_string(),
                status: SimulationStatus::Cancelled.as_str().to_string(),
                message: Some(format!("Simulation '{}' already stopped", record.name())),
                results: None,
            }),
            status @ (SimulationStatus::Completed | SimulationStatus::Failed) => {
                Err(ControlError::SimulationNotRunning {
                    id,
                    status: status.as_str().to_string(),
                })
            }
        }
    }

    /// Returns a textual summary for one simulation.
    async fn get_simulation_results(&self, params: Value) -> Result<Value, ControlError> {
        let req: IdRequest = Self::parse(params, "get simulation results request")?;
        let id = Self::parse_id(&req.id)?;

        let record = self
            .registry
            .lookup(id)
            .ok_or(ControlError::SimulationNotFound(id))?;

        let status = record.status().await;
        let results = vec![
            format!("Simulation '{}' status: {}", record.name(), status),
            format!("Progress: {}%", record.progress()),
            format!("Started: {}", record.started_at().to_rfc3339()),
        ];

        Self::encode(&SimulationResponse {
            id,
            name: record.name().to_string(),
            status: status.as_str().to_string(),
            message: Some(format!(
                "Retrieved results for simulation '{}'",
                record.name()
            )),
            results: Some(results),
        })
    }

    /// Parses a raw document as the declared type and lists the problems.
    fn validate_config(&self, params: Value) -> Result<Value, ControlError> {
        let req: ValidateRequest = Self::parse(params, "config validation request")?;

        let errors = match req.config_type.as_str() {
            "simulation" => match serde_json::from_value::<SimulationConfig>(req.config) {
                Ok(cfg) => cfg.validate(),
                Err(e) => vec![format!("invalid JSON: {e}")],
            },
            other => vec![format!("unsupported config type: {other}")],
        };

        let valid = errors.is_empty();
        Self::encode(&ValidateResponse {
            valid,
            errors,
            message: if valid {
                "Configuration is valid".to_string()
            } else {
                "Configuration validation failed".to_string()
            },
        })
    }

    /// Emits the canonical example configuration for the requested type.
    fn generate_config_template(&self, params: Value) -> Result<Value, ControlError> {
        let req: TemplateRequest = Self::parse(params, "config template request")?;

        match req.config_type.as_str() {
            "simulation" => {
                let template = Self::encode(&SimulationConfig::template())?;
                Self::encode(&TemplateResponse {
                    template,
                    message: "Generated simulation configuration template".to_string(),
                })
            }
            other => Err(ControlError::UnsupportedType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn api() -> ControlApi {
        ControlApi::new(Bus::new(256))
    }

    fn start_params(name: &str, attempts: i64) -> Value {
        json!({
            "name": name,
            "target": {
                "count": 2,
                "client": { "url": "http://localhost:3333/api", "contentType": "application/json" }
            },
            "cadence": 1,
            "attempts": attempts,
            "dry": true
        })
    }

    async fn wait_terminal(api: &ControlApi, id: uuid::Uuid) -> SimulationStatus {
        for _ in 0..100 {
            let record = api.registry().lookup(id).expect("registered");
            let status = record.status().await;
            if status != SimulationStatus::Running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("simulation never reached a terminal status");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn run_simulation_registers_and_completes() {
        let api = api();
        let out = api.dispatch("run_simulation", start_params("dry-run", 1)).await;

        assert_eq!(out["status"], "running");
        assert_eq!(out["name"], "dry-run");
        let id: uuid::Uuid = serde_json::from_value(out["id"].clone()).expect("id");
        assert_eq!(api.registry().len(), 1);

        assert_eq!(wait_terminal(&api, id).await, SimulationStatus::Completed);

        let listed = api.dispatch("list_simulations", json!({})).await;
        let sims = listed["simulations"].as_array().expect("array");
        assert_eq!(sims.len(), 1);
        assert_eq!(sims[0]["status"], "completed");
        assert_eq!(sims[0]["progress"], 100);
        assert!(sims[0].get("end_time").is_some());
    }

    #[tokio::test]
    async fn empty_name_is_rejected_without_registration() {
        let api = api();
        let out = api.dispatch("run_simulation", start_params("", 1)).await;

        assert_eq!(out["error"], "invalid_request");
        assert_eq!(out["code"], 400);
        assert!(api.registry().is_empty());
    }

    #[tokio::test]
    async fn zero_count_is_an_operational_error_not_a_crash() {
        let api = api();
        let params = json!({
            "name": "bad",
            "target": {
                "count": 0,
                "client": { "url": "http://localhost:3333", "contentType": "application/json" }
            }
        });
        let out = api.dispatch("run_simulation", params).await;
        assert_eq!(out["error"], "invalid_request");
        assert!(api.registry().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_cancels_then_becomes_idempotent() {
        let api = api();
        let out = api.dispatch("run_simulation", start_params("long", 600)).await;
        let id = out["id"].as_str().expect("id").to_string();

        let stopped = api.dispatch("stop_simulation", json!({ "id": id })).await;
        assert_eq!(stopped["status"], "cancelled");

        // Second stop: no-op returning the same terminal record.
        let again = api.dispatch("stop_simulation", json!({ "id": id })).await;
        assert_eq!(again["status"], "cancelled");

        let uuid: uuid::Uuid = id.parse().expect("uuid");
        assert_eq!(wait_terminal(&api, uuid).await, SimulationStatus::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_after_completion_is_not_running() {
        let api = api();
        let out = api.dispatch("run_simulation", start_params("short", 1)).await;
        let id: uuid::Uuid = serde_json::from_value(out["id"].clone()).expect("id");
        wait_terminal(&api, id).await;

        let res = api
            .dispatch("stop_simulation", json!({ "id": id.to_string() }))
            .await;
        assert_eq!(res["error"], "simulation_not_running");
        assert_eq!(res["code"], 400);
    }

    #[tokio::test]
    async fn stop_validates_the_identifier() {
        let api = api();

        let res = api
            .dispatch("stop_simulation", json!({ "id": "not-a-uuid" }))
            .await;
        assert_eq!(res["error"], "invalid_request");

        let res = api
            .dispatch(
                "stop_simulation",
                json!({ "id": uuid::Uuid::new_v4().to_string() }),
            )
            .await;
        assert_eq!(res["error"], "simulation_not_found");
        assert_eq!(res["code"], 404);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_summarise_the_record() {
        let api = api();
        let out = api.dispatch("run_simulation", start_params("summary", 1)).await;
        let id: uuid::Uuid = serde_json::from_value(out["id"].clone()).expect("id");
        wait_terminal(&api, id).await;

        let res = api
            .dispatch("get_simulation_results", json!({ "id": id.to_string() }))
            .await;
        let results = res["results"].as_array().expect("results");
        assert_eq!(results.len(), 3);
        assert!(results[0].as_str().expect("line").contains("status: completed"));
        assert!(results[1].as_str().expect("line").contains("Progress: 100%"));
    }

    #[tokio::test]
    async fn results_for_unknown_id_is_404() {
        let api = api();
        let res = api
            .dispatch(
                "get_simulation_results",
                json!({ "id": uuid::Uuid::new_v4().to_string() }),
            )
            .await;
        assert_eq!(res["error"], "simulation_not_found");
    }

    #[tokio::test]
    async fn template_validates_cleanly() {
        let api = api();
        let template = api
            .dispatch("generate_config_template", json!({ "type": "simulation" }))
            .await;

        let validated = api
            .dispatch(
                "validate_config",
                json!({ "type": "simulation", "config": template["template"] }),
            )
            .await;
        assert_eq!(validated["valid"], true);
        assert_eq!(validated["message"], "Configuration is valid");
    }

    #[tokio::test]
    async fn unsupported_template_type_is_rejected() {
        let api = api();
        let res = api
            .dispatch("generate_config_template", json!({ "type": "monitor" }))
            .await;
        assert_eq!(res["error"], "unsupported_type");
        assert_eq!(res["code"], 400);
    }

    #[tokio::test]
    async fn validate_reports_problems_for_broken_config() {
        let api = api();
        let res = api
            .dispatch(
                "validate_config",
                json!({ "type": "simulation", "config": { "name": "x" } }),
            )
            .await;
        assert_eq!(res["valid"], false);
        assert!(!res["errors"].as_array().expect("errors").is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_404() {
        let api = api();
        let res = api.dispatch("analyze_performance", json!({})).await;
        assert_eq!(res["error"], "tool_not_found");
        assert_eq!(res["code"], 404);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_cancels_running_simulations() {
        let api = api();
        let out = api.dispatch("run_simulation", start_params("doomed", 600)).await;
        let id: uuid::Uuid = serde_json::from_value(out["id"].clone()).expect("id");

        api.shutdown().await;
        assert_eq!(wait_terminal(&api, id).await, SimulationStatus::Cancelled);
    }
}
