//! Reference host: slotmap-backed DOM arena with watcher notifications.

pub mod node;
pub mod tree;

pub use node::{NodeData, NodeId};
pub use tree::{Dom, DomError};
