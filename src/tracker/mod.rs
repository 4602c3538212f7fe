//! Attribute trackers: per-node derived attributes kept current as the host
//! tree changes.
//!
//! - [`Registry`]: per-family cache; [`Registry::get_tracker`] is the entry
//!   point.
//! - [`Tracker`]: handle to one node's tracker: current value, subscriptions.
//! - [`Attribute`]: a family's value type, local state and recompute rule.
//!   [`Visibility`] and [`Scale`] are provided.

pub mod attribute;
pub mod handle;
pub mod registry;

pub use attribute::{Attribute, Kind, Scale, ScaleState, Visibility, VisibilityState};
pub use handle::Tracker;
pub use registry::Registry;
