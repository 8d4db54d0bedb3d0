//! Autopost event history and live fan-out.
//!
//! - [`EventLog`] — bounded in-memory history mirrored to one durable log
//!   file per calendar day.
//! - [`BroadcastHub`] — registry of per-observer channels with a snapshot
//!   for late joiners.
//! - [`Notification`] — the envelope observers receive.

pub mod hub;
pub mod log_store;

pub use hub::{BroadcastHub, Notification, Observer, ObserverId};
pub use log_store::{EventLog, EventLogError};
