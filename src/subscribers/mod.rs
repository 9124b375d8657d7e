//! # Event subscribers: the opaque log sink of the harness.
//!
//! The core never writes to stdout/stderr directly; it publishes [`Event`]s
//! (see [`crate::events`]) and anything that wants to observe them implements
//! [`Subscribe`]. The [`SubscriberSet`] fans events out through bounded
//! per-subscriber queues; [`LogWriter`] is the built-in renderer the CLI
//! installs.
//!
//! [`Event`]: crate::events::Event

mod log;
mod set;
mod subscribe;

pub use log::{LogLevel, LogWriter};
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
