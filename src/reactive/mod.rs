//! Reactive primitives: notification hub and events.
//!
//! - [`NotificationHub`]: ordered fan-out with generation abort and
//!   index-adjusting disconnect. Trackers publish through one.
//! - [`Event`]: standalone signal with [`Firing::Deferred`] or
//!   [`Firing::Immediate`] delivery.
//! - [`Connection`]: handle returned by every `connect`.

pub mod event;
pub mod hub;

pub use event::{Event, Firing};
pub use hub::{Connection, ConnectionId, Listener, NotificationHub};
