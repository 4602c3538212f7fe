//! Host tree interface.
//!
//! The engine never owns nodes. A host implements [`TreeHost`] to answer
//! classification and property queries and to deliver [`NodeChange`]
//! notifications to watchers. [`crate::dom::Dom`] is the in-crate reference
//! host.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// NodeClass
// ---------------------------------------------------------------------------

/// Host-side category of a node, as reported by [`TreeHost::classify`].
///
/// Each attribute family maps classes to its own kinds; a class a family does
/// not map is unsupported for that family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    /// A drawable element with its own `visible` flag.
    Element,
    /// A top-level layer with an `enabled` flag. Its visibility depends on
    /// whether its ancestry is valid, not on its parent chain.
    Layer,
    /// A grouping node with no visual state of its own.
    Group,
    /// A modifier child that scales its parent element.
    ScaleModifier,
    /// Anything outside the UI taxonomy.
    Opaque,
}

// ---------------------------------------------------------------------------
// NodeChange
// ---------------------------------------------------------------------------

/// A notification about one node, delivered to its watchers.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange<N> {
    /// The node's `visible` flag changed.
    Visible(bool),
    /// The node's `enabled` flag changed.
    Enabled(bool),
    /// The node's scale factor changed.
    Scale(f64),
    /// The node moved under a new parent (or was detached).
    ParentChanged(Option<N>),
    /// Some ancestor of the node changed; the node's ancestry must be
    /// re-evaluated.
    AncestryChanged,
    /// The node's set of direct children changed.
    ChildrenChanged,
    /// The node was destroyed. Delivered once; no notification follows it.
    Destroyed,
}

/// Watcher registration handed out by [`TreeHost::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    /// Wrap a host-chosen raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Callback a watcher registers with the host.
pub type HostCallback<N> = Rc<dyn Fn(&NodeChange<N>)>;

// ---------------------------------------------------------------------------
// TreeHost
// ---------------------------------------------------------------------------

/// The host tree as seen by trackers.
///
/// Implementations must not hold internal borrows while invoking watcher
/// callbacks: a callback may call back into any method of the host, including
/// [`watch`](TreeHost::watch) and [`unwatch`](TreeHost::unwatch).
pub trait TreeHost: 'static {
    /// Node identity. Trackers are keyed by it.
    type Node: Copy + Eq + Hash + fmt::Debug + 'static;

    /// Category of `node`, or `None` if the host does not know it.
    fn classify(&self, node: Self::Node) -> Option<NodeClass>;

    /// Structural parent of `node`.
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Direct children of `node`, in order.
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Current `visible` flag.
    fn visible(&self, node: Self::Node) -> bool;

    /// Current `enabled` flag.
    fn enabled(&self, node: Self::Node) -> bool;

    /// Current scale factor.
    fn scale(&self, node: Self::Node) -> f64;

    /// Whether `node` sits where a [`NodeClass::Layer`] can be shown.
    fn ancestry_valid(&self, node: Self::Node) -> bool;

    /// Start delivering notifications about `node` to `callback`.
    fn watch(&self, node: Self::Node, callback: HostCallback<Self::Node>) -> WatchId;

    /// Stop a watch. Unknown ids are ignored.
    fn unwatch(&self, node: Self::Node, watch: WatchId);
}
