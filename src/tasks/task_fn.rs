//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: Fn(CancellationToken) -> Fut`, producing a
//! fresh future per spawn. This avoids shared mutable state; if shared state
//! is needed, move an explicit `Arc<...>` into the closure.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use loadvisor::tasks::{TaskFn, TaskRef};
//!
//! let t: TaskRef = TaskFn::arc("worker", |ctx: CancellationToken| async move {
//!     if ctx.is_cancelled() {
//!         return;
//!     }
//!     // do work...
//! });
//!
//! assert_eq!(t.name(), "worker");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::task::{BoxTaskFuture, Task};

/// Function-backed task implementation.
///
/// Wraps a closure that *creates* a new future per spawn.
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the task and returns it as a shared handle (`Arc<dyn Task>`).
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = ()> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture {
        let fut = (self.f)(ctx);
        Box::pin(fut)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::tasks::TaskRef;

    #[tokio::test]
    async fn spawn_runs_the_closure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let task: TaskRef = {
            let hits = hits.clone();
            TaskFn::arc("counting", move |_ctx: CancellationToken| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        assert_eq!(task.name(), "counting");
        task.spawn(CancellationToken::new()).await;
        task.spawn(CancellationToken::new()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_context_is_observable() {
        let ran = Arc::new(AtomicUsize::new(0));
        let task: TaskRef = {
            let ran = ran.clone();
            TaskFn::arc("cancel-aware", move |ctx: CancellationToken| {
                let ran = ran.clone();
                async move {
                    if ctx.is_cancelled() {
                        return;
                    }
                    ran.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let ctx = CancellationToken::new();
        ctx.cancel();
        task.spawn(ctx).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
