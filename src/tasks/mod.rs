//! # Task primitives consumed by the worker pool.
//!
//! - [`Task`] — opaque unit of work with a display name and a run operation
//! - [`TaskFn`] — closure-backed implementation, the form the drivers use
//! - [`TaskRef`] / [`BoxTaskFuture`] — shared handle and future aliases

mod task;
mod task_fn;

pub use task::{BoxTaskFuture, Task, TaskRef};
pub use task_fn::TaskFn;
