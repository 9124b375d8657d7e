//! # Non-blocking event fan-out to multiple subscribers.
//!
//! [`SubscriberSet`] distributes events to multiple subscribers concurrently
//! without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! Bus ──► listen() pump ──► emit_arc(event)
//!                               │
//!                               ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!                               │    (bounded)         └──────► panic → SubscriberPanicked
//!                               ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!                               └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while
//!   B processes N+5
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//! - **Overflow**: the event is dropped for that subscriber only and a
//!   `SubscriberOverflow` is published
//! - **Isolation**: a slow or panicking subscriber doesn't affect others
//!
//! ## Panic handling
//! Worker tasks use `catch_unwind` to isolate panics: the panic is converted
//! to a `SubscriberPanicked` event and the worker continues with the next
//! event. `AssertUnwindSafe` is used, which can leave shared state
//! inconsistent if a subscriber panics while holding a lock.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};

use super::subscribe::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// ### Per-subscriber setup
    /// - Bounded `mpsc` queue (capacity from [`Subscribe::queue_capacity`],
    ///   clamped to >= 1)
    /// - Dedicated worker task (runs until the queue is closed)
    /// - Panic isolation via `catch_unwind`
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());

                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = {
                            let any = &*panic_err;
                            if let Some(msg) = any.downcast_ref::<&'static str>() {
                                (*msg).to_string()
                            } else if let Some(msg) = any.downcast_ref::<String>() {
                                msg.clone()
                            } else {
                                "unknown panic".to_string()
                            }
                        };
                        bus_for_worker.publish(Event::subscriber_panicked(s.name(), info));
                    }
                }
            });

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Spawns a pump that forwards every bus event into the set.
    ///
    /// Runs until the bus is closed (all senders dropped). `Lagged` errors
    /// are skipped; slower consumers already have their own bounded queues.
    pub fn listen(self: &Arc<Self>, bus: &Bus) {
        let mut rx = bus.subscribe();
        let set = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit_arc(Arc::new(ev)),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
    }

    /// Delivers one event to every subscriber queue without blocking.
    ///
    /// A full or closed queue drops the event for that subscriber and
    /// publishes `SubscriberOverflow`.
    pub fn emit_arc(&self, ev: Arc<Event>) {
        for ch in &self.channels {
            match ch.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.bus
                        .publish(Event::subscriber_overflow(ch.name, "queue_full"));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.bus
                        .publish(Event::subscriber_overflow(ch.name, "worker_closed"));
                }
            }
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Drop for SubscriberSet {
    fn drop(&mut self) {
        // Closing the queues lets the detached workers drain and exit.
        self.channels.clear();
        self.workers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::events::EventKind;

    struct Counting {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscribe for Counting {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _event: &Event) {
            panic!("subscriber exploded");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let bus = Bus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let set = Arc::new(SubscriberSet::new(
            vec![Arc::new(Counting { seen: seen.clone() }) as Arc<dyn Subscribe>],
            bus.clone(),
        ));
        set.listen(&bus);

        for _ in 0..3 {
            bus.publish(Event::now(EventKind::TaskFinished));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_subscriber_is_isolated() {
        let bus = Bus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let set = Arc::new(SubscriberSet::new(
            vec![
                Arc::new(Panicky) as Arc<dyn Subscribe>,
                Arc::new(Counting { seen: seen.clone() }),
            ],
            bus.clone(),
        ));
        let mut raw = bus.subscribe();
        set.listen(&bus);

        bus.publish(Event::now(EventKind::TaskFinished));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The healthy subscriber still saw the event.
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // The panic surfaced as an event on the bus.
        let mut saw_panic = false;
        while let Ok(ev) = raw.try_recv() {
            if ev.kind == EventKind::SubscriberPanicked {
                saw_panic = true;
            }
        }
        assert!(saw_panic);
    }
}
