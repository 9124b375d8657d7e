//! # Task abstraction for pool execution.
//!
//! Defines the core [`Task`] trait for async, cancelable units of work.
//!
//! - **[`Task`]** — trait for implementing async tasks with cancellation support
//! - **[`TaskRef`]** — shared handle (`Arc<dyn Task>`) for passing tasks into the pool
//! - **[`BoxTaskFuture`]** — type alias for boxed task futures
//!
//! ## Rules
//! - A task's work has no result and no declared failure channel; anything the
//!   task wants to surface it must capture in its own closure state or publish
//!   through the event bus.
//! - Tasks receive a [`CancellationToken`] and should check `is_cancelled()`
//!   between steps; an in-flight step is never interrupted by the pool.
//! - The pool never inspects or compares tasks; the name exists for logs and
//!   diagnostics only and need not be unique.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

/// Boxed future returned by [`Task::spawn`].
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Shared handle to a task object.
///
/// Cheap to clone; used by the drivers to hand work to the
/// [`WorkerPool`](crate::pool::WorkerPool).
pub type TaskRef = Arc<dyn Task>;

/// Asynchronous, cancelable unit of work.
///
/// ## Rules
/// - **Stateless spawning**: `spawn(&self)` is `Fn`, not `FnMut` — each call
///   creates a new independent future.
/// - **Cancellation**: implementations should check `ctx.is_cancelled()`
///   between steps to exit promptly on shutdown.
///
/// ## Example
///
/// ```rust
/// use std::future::Future;
/// use std::pin::Pin;
/// use tokio_util::sync::CancellationToken;
/// use loadvisor::tasks::Task;
///
/// struct Ping;
///
/// impl Task for Ping {
///     fn name(&self) -> &str {
///         "ping"
///     }
///
///     fn spawn(&self, ctx: CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
///         Box::pin(async move {
///             if ctx.is_cancelled() {
///                 return;
///             }
///             // do work...
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Returns a human-readable task name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Creates a new future that performs the work once.
    ///
    /// Each call returns an independent future; the pool runs it to
    /// completion on one of its workers.
    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture;
}
