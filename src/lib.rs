//! # gilt-cascade
//!
//! Reactive propagation of derived per-node attributes over a host UI tree.
//!
//! For every tracked node, gilt-cascade keeps an *effective visibility* or
//! *effective scale* computed from the node's own state and its parent's
//! already-computed value. Trackers are created lazily, follow reparenting,
//! tear themselves down when unobserved, and publish changes through a
//! reentrancy-safe fan-out that never delivers a stale or duplicate value.
//!
//! ## Core Systems
//!
//! - **[`reactive`]**: `NotificationHub` fan-out and the standalone `Event`
//!   with deferred or immediate firing
//! - **[`tracker`]**: `Registry`, `Tracker`, and the `Visibility` / `Scale`
//!   attribute families
//! - **[`host`]**: the `TreeHost` interface a host tree implements
//! - **[`dom`]**: slotmap-backed reference host
//!
//! Everything is single-threaded: handles are `Rc`-based and every
//! notification runs synchronously on the caller's stack.

// Host interface
pub mod host;
pub mod dom;

// Propagation
pub mod reactive;
pub mod tracker;

pub use host::{NodeChange, NodeClass, TreeHost};
pub use reactive::{Connection, ConnectionId, Event, Firing};
pub use tracker::{Registry, Scale, Tracker, Visibility};
