//! Tracker: the per-node computed-attribute state machine.
//!
//! A tracker caches its node's local state, holds a weak link to its parent's
//! tracker, and republishes its value through an embedded
//! [`NotificationHub`] whenever a recompute changes it. Child trackers are
//! ordinary hub listeners that pull the new value through their own recompute.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::attribute::{Attribute, Kind};
use super::registry::RegistryInner;
use crate::host::{NodeChange, TreeHost, WatchId};
use crate::reactive::hub::{Connection, ConnectionId, Disconnect, Listener, NotificationHub};

/// Why a tracker went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    LastSubscriber,
    NodeDestroyed,
    Unobserved,
    RegistryDropped,
}

struct ParentLink<A: Attribute, H: TreeHost> {
    tracker: Weak<TrackerInner<A, H>>,
    connection: ConnectionId,
}

/// Hub listener standing for a child tracker.
struct ChildLink<A: Attribute, H: TreeHost> {
    child: Weak<TrackerInner<A, H>>,
}

impl<A: Attribute, H: TreeHost> Listener<A::Value> for ChildLink<A, H> {
    fn deliver(&self, _: &A::Value) {
        if let Some(child) = self.child.upgrade() {
            child.recompute();
        }
    }

    fn orphaned(&self) {
        if let Some(child) = self.child.upgrade() {
            child.recompute();
        }
    }
}

pub(crate) struct TrackerInner<A: Attribute, H: TreeHost> {
    node: H::Node,
    kind: Kind,
    host: Rc<H>,
    registry: Weak<RegistryInner<A, H>>,
    state: RefCell<A::State>,
    value: Cell<A::Value>,
    parent: RefCell<Option<ParentLink<A, H>>>,
    hub: NotificationHub<A::Value>,
    watch: Cell<Option<WatchId>>,
    modifier: Cell<Option<(H::Node, WatchId)>>,
    destroyed: Cell<bool>,
}

impl<A: Attribute, H: TreeHost> TrackerInner<A, H> {
    /// Build an unattached tracker. The value is provisional until
    /// [`attach`](Self::attach) resolves the parent.
    pub(crate) fn new(
        node: H::Node,
        state: A::State,
        host: Rc<H>,
        registry: Weak<RegistryInner<A, H>>,
    ) -> Self {
        let kind = A::kind(&state);
        let value = A::compute(&state, None);
        Self {
            node,
            kind,
            host,
            registry,
            state: RefCell::new(state),
            value: Cell::new(value),
            parent: RefCell::new(None),
            hub: NotificationHub::new(),
            watch: Cell::new(None),
            modifier: Cell::new(None),
            destroyed: Cell::new(false),
        }
    }

    /// Subscribe to the host, discover the modifier, resolve the parent chain
    /// and settle the value. Must run after the tracker is in the registry.
    pub(crate) fn attach(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let watch = self.host.watch(
            self.node,
            Rc::new(move |change: &NodeChange<H::Node>| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.on_node_change(change);
                }
            }),
        );
        self.watch.set(Some(watch));

        self.rediscover_modifier();
        if self.kind.follows_parent() {
            self.link_parent(self.host.parent(self.node));
        }
        self.recompute();
    }

    fn on_node_change(self: &Rc<Self>, change: &NodeChange<H::Node>) {
        if self.destroyed.get() {
            return;
        }
        match change {
            NodeChange::Destroyed => self.destroy(Teardown::NodeDestroyed),
            NodeChange::ParentChanged(parent) => {
                A::observe(&mut self.state.borrow_mut(), &*self.host, self.node, change);
                if self.kind.follows_parent() {
                    tracing::debug!(
                        message = "tracker.reparent",
                        node = ?self.node,
                        attribute = A::NAME,
                        parent = ?parent
                    );
                    self.link_parent(*parent);
                }
                self.recompute();
            }
            NodeChange::ChildrenChanged => {
                self.rediscover_modifier();
                self.recompute();
            }
            // The node's own scale is not an input; only the modifier's is.
            NodeChange::Scale(_) => {}
            _ => {
                A::observe(&mut self.state.borrow_mut(), &*self.host, self.node, change);
                self.recompute();
            }
        }
    }

    fn on_modifier_change(&self, change: &NodeChange<H::Node>) {
        if self.destroyed.get() {
            return;
        }
        if let NodeChange::Scale(_) = change {
            A::observe(&mut self.state.borrow_mut(), &*self.host, self.node, change);
            self.recompute();
        }
    }

    /// Track the first child of class `A::MODIFIER`, feeding its scale into
    /// the local state. Losing the modifier feeds a factor of 1.
    fn rediscover_modifier(self: &Rc<Self>) {
        let Some(class) = A::MODIFIER else {
            return;
        };
        let host = &*self.host;
        let found = host
            .children(self.node)
            .into_iter()
            .find(|&child| host.classify(child) == Some(class));
        let current = self.modifier.get();
        if current.map(|(node, _)| node) == found {
            return;
        }

        if let Some((old, watch)) = self.modifier.take() {
            host.unwatch(old, watch);
        }
        let factor = match found {
            Some(modifier) => {
                let weak = Rc::downgrade(self);
                let watch = host.watch(
                    modifier,
                    Rc::new(move |change: &NodeChange<H::Node>| {
                        if let Some(tracker) = weak.upgrade() {
                            tracker.on_modifier_change(change);
                        }
                    }),
                );
                self.modifier.set(Some((modifier, watch)));
                host.scale(modifier)
            }
            None => 1.0,
        };
        A::observe(
            &mut self.state.borrow_mut(),
            host,
            self.node,
            &NodeChange::Scale(factor),
        );
    }

    /// Move the parent subscription to the tracker of `parent_node`.
    ///
    /// The old link is dropped first; the new parent tracker is looked up (or
    /// created) through the registry afterwards.
    fn link_parent(self: &Rc<Self>, parent_node: Option<H::Node>) {
        let old = self.parent.borrow_mut().take();
        if let Some(link) = old {
            if let Some(parent) = link.tracker.upgrade() {
                parent.unsubscribe(link.connection);
            }
        }

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        // A host reporting a node as its own parent gets no link.
        let Some(parent) = parent_node
            .filter(|&node| node != self.node)
            .and_then(|node| RegistryInner::lookup(&registry, node))
        else {
            return;
        };

        let connection = parent.hub.connect(ChildLink {
            child: Rc::downgrade(self),
        });
        *self.parent.borrow_mut() = Some(ParentLink {
            tracker: Rc::downgrade(&parent),
            connection,
        });
    }

    fn parent_value(&self) -> Option<A::Value> {
        self.parent
            .borrow()
            .as_ref()
            .and_then(|link| link.tracker.upgrade())
            .filter(|parent| !parent.destroyed.get())
            .map(|parent| parent.value.get())
    }

    /// Recompute from local state and the parent's value; publish on change.
    pub(crate) fn recompute(&self) {
        if self.destroyed.get() {
            return;
        }
        let parent = self.parent_value();
        let next = A::compute(&self.state.borrow(), parent);
        let previous = self.value.get();
        if next == previous {
            return;
        }
        self.value.set(next);
        tracing::trace!(
            message = "tracker.publish",
            node = ?self.node,
            attribute = A::NAME,
            from = ?previous,
            to = ?next
        );
        self.hub.publish(&next);
    }

    /// Remove a subscriber; the tracker destroys itself once none remain.
    pub(crate) fn unsubscribe(&self, id: ConnectionId) {
        if self.destroyed.get() {
            return;
        }
        if self.hub.disconnect(id).is_some() && self.hub.is_empty() {
            self.destroy(Teardown::LastSubscriber);
        }
    }

    /// Drop every host watch. Returns `false` if already torn down.
    pub(crate) fn release(&self) -> bool {
        if self.destroyed.replace(true) {
            return false;
        }
        if let Some(watch) = self.watch.take() {
            self.host.unwatch(self.node, watch);
        }
        if let Some((modifier, watch)) = self.modifier.take() {
            self.host.unwatch(modifier, watch);
        }
        true
    }

    pub(crate) fn destroy(&self, reason: Teardown) {
        if !self.release() {
            return;
        }
        let link = self.parent.borrow_mut().take();
        if let Some(link) = link {
            if let Some(parent) = link.tracker.upgrade() {
                parent.unsubscribe(link.connection);
            }
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.node, self);
        }
        tracing::debug!(
            message = "tracker.destroy",
            node = ?self.node,
            attribute = A::NAME,
            reason = ?reason
        );
        // Children still linked here now see no parent.
        self.hub.orphan_all();
    }

    /// No subscribers, so nothing downstream depends on this tracker.
    pub(crate) fn is_unobserved(&self) -> bool {
        self.hub.is_empty()
    }

    pub(crate) fn node(&self) -> H::Node {
        self.node
    }

    pub(crate) fn kind(&self) -> Kind {
        self.kind
    }
}

impl<A: Attribute, H: TreeHost> Disconnect for TrackerInner<A, H> {
    fn disconnect(&self, id: ConnectionId) {
        self.unsubscribe(id);
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Handle to the tracker of one node, obtained from
/// [`Registry::get_tracker`](super::Registry::get_tracker).
///
/// A live handle only shields a tracker that never had subscribers from lazy
/// eviction. Once its last subscriber disconnects or its node is destroyed,
/// the tracker is torn down regardless, and a later `get_tracker` builds a
/// fresh one. Handles compare by identity through
/// [`ptr_eq`](Tracker::ptr_eq).
pub struct Tracker<A: Attribute, H: TreeHost> {
    inner: Rc<TrackerInner<A, H>>,
}

impl<A: Attribute, H: TreeHost> Clone for Tracker<A, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: Attribute, H: TreeHost> Tracker<A, H> {
    pub(crate) fn from_inner(inner: Rc<TrackerInner<A, H>>) -> Self {
        Self { inner }
    }

    /// The current attribute value.
    pub fn value(&self) -> A::Value {
        self.inner.value.get()
    }

    /// The observed node.
    pub fn node(&self) -> H::Node {
        self.inner.node()
    }

    /// The node's kind.
    pub fn kind(&self) -> Kind {
        self.inner.kind()
    }

    /// Subscribe to value changes. The callback receives every new value; it
    /// is not called with the current one.
    ///
    /// Subscribing to a destroyed tracker keeps nothing alive and never
    /// delivers; fetch a fresh tracker from the registry instead.
    pub fn connect(&self, listener: impl Fn(&A::Value) + 'static) -> Connection {
        let id = self.inner.hub.connect(listener);
        let weak = Rc::downgrade(&self.inner);
        let source: Weak<dyn Disconnect> = weak;
        Connection::new(id, source)
    }

    /// Remove a subscriber. Removing the last one destroys the tracker.
    pub fn disconnect(&self, id: ConnectionId) {
        self.inner.unsubscribe(id);
    }

    /// Number of subscribers, child trackers included.
    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.len()
    }

    /// Whether the tracker has been torn down.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Whether both handles refer to the same tracker.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<A: Attribute, H: TreeHost> fmt::Debug for Tracker<A, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("attribute", &A::NAME)
            .field("node", &self.inner.node)
            .field("kind", &self.inner.kind)
            .field("value", &self.inner.value.get())
            .field("state", &self.inner.state.borrow())
            .field("subscribers", &self.inner.hub.len())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
