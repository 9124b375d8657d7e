//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a wrapper around [`tokio::sync::broadcast`] that lets the
//! worker pool, the simulation and monitor drivers, and the control plane
//! broadcast [`Event`]s to multiple subscribers simultaneously.
//!
//! ## Key characteristics:
//! - **Broadcast semantics**: all active subscribers receive a clone of each event
//! - **Non-persistent**: events are lost if there are no active subscribers
//! - **Bounded capacity**: old events are dropped when the channel is full
//! - **Multiple subscribers**: any number of receivers can subscribe independently
//!
//! The harness can run entirely without subscribers; publishing into an empty
//! bus is a no-op.

use tokio::sync::broadcast;

use super::event::Event;

/// Default ring-buffer capacity for a bus.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel for runtime events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to >= 1).
    ///
    /// Subscribers that lag behind more than `capacity` events receive
    /// `Lagged` and skip older items.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// The event is cloned per subscriber. With no active subscribers the
    /// event is dropped silently; the harness operates fine unobserved.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(Event::now(EventKind::PoolStarted).with_worker(1));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::PoolStarted);
        assert_eq!(ev.worker, Some(1));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = Bus::new(1);
        bus.publish(Event::now(EventKind::PoolStopped));
    }
}
