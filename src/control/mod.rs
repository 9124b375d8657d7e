//! # Control plane: typed API + transports.
//!
//! - **api.rs**: [`ControlApi`], the `name → handler` dispatch table over the
//!   simulation registry and drivers.
//! - **types.rs**: request/response wire types and the uniform error body.
//! - **transport.rs**: newline-delimited JSON loops over stdio or TCP.

mod api;
pub mod transport;
mod types;

pub use api::{ControlApi, TOOLS};
pub use types::{
    ErrorBody, IdRequest, SimulationInfo, SimulationListResponse, SimulationResponse,
    StartRequest, TemplateRequest, TemplateResponse, ValidateRequest, ValidateResponse,
};
