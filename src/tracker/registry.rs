//! Registry: identity-keyed cache of live trackers.
//!
//! The registry is the only owner of trackers. It creates them on first
//! lookup and forgets them when they tear themselves down. Each attribute
//! family uses its own registry over the same host.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ptr;
use std::rc::Rc;

use super::attribute::Attribute;
use super::handle::{Teardown, Tracker, TrackerInner};
use crate::host::TreeHost;

pub(crate) struct RegistryInner<A: Attribute, H: TreeHost> {
    host: Rc<H>,
    trackers: RefCell<HashMap<H::Node, Rc<TrackerInner<A, H>>>>,
}

impl<A: Attribute, H: TreeHost> RegistryInner<A, H> {
    /// Existing tracker for `node`, or a new one. `None` for unsupported
    /// nodes.
    ///
    /// A new tracker is inserted before it resolves its parent chain, so a
    /// chain that revisits a node under construction finds it instead of
    /// recursing.
    pub(crate) fn lookup(this: &Rc<Self>, node: H::Node) -> Option<Rc<TrackerInner<A, H>>> {
        if let Some(existing) = this.trackers.borrow().get(&node) {
            return Some(Rc::clone(existing));
        }

        let state = A::classify(&*this.host, node)?;
        let tracker = Rc::new(TrackerInner::new(
            node,
            state,
            Rc::clone(&this.host),
            Rc::downgrade(this),
        ));
        this.trackers.borrow_mut().insert(node, Rc::clone(&tracker));
        tracing::debug!(
            message = "tracker.create",
            node = ?node,
            attribute = A::NAME,
            kind = ?tracker.kind()
        );

        tracker.attach();
        Some(tracker)
    }

    /// Tear down trackers with no subscribers that only the registry still
    /// holds. Their parents go too once they lose their last child link.
    fn evict_unobserved(&self) {
        let idle: Vec<_> = self
            .trackers
            .borrow()
            .values()
            .filter(|&tracker| Rc::strong_count(tracker) == 1 && tracker.is_unobserved())
            .cloned()
            .collect();
        for tracker in idle {
            tracker.destroy(Teardown::Unobserved);
        }
    }

    /// Forget `tracker` if it is still the one registered for `node`.
    pub(crate) fn remove(&self, node: H::Node, tracker: &TrackerInner<A, H>) {
        let removed = {
            let mut trackers = self.trackers.borrow_mut();
            match trackers.get(&node) {
                Some(current) if ptr::eq(Rc::as_ptr(current), tracker) => trackers.remove(&node),
                _ => None,
            }
        };
        drop(removed);
    }
}

impl<A: Attribute, H: TreeHost> Drop for RegistryInner<A, H> {
    fn drop(&mut self) {
        for (node, tracker) in self.trackers.get_mut().drain() {
            if tracker.release() {
                tracing::debug!(
                    message = "tracker.destroy",
                    node = ?node,
                    attribute = A::NAME,
                    reason = ?Teardown::RegistryDropped
                );
            }
        }
    }
}

/// Cache mapping each node to its tracker for one attribute family `A`.
///
/// Cloning a `Registry` yields another handle to the same cache. Build one
/// per host and family and pass it wherever trackers are needed:
///
/// ```ignore
/// let dom = Rc::new(Dom::new());
/// let visibility = Registry::<Visibility, Dom>::new(Rc::clone(&dom));
/// let scale = Registry::<Scale, Dom>::new(dom);
/// ```
pub struct Registry<A: Attribute, H: TreeHost> {
    inner: Rc<RegistryInner<A, H>>,
}

impl<A: Attribute, H: TreeHost> Clone for Registry<A, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: Attribute, H: TreeHost> Registry<A, H> {
    /// Create an empty registry over `host`.
    pub fn new(host: Rc<H>) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                host,
                trackers: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The tracker for `node`, creating it (and any missing ancestors'
    /// trackers) on demand. `None` if the node's class is unsupported by `A`.
    ///
    /// **Unobserved trackers are evicted lazily.** A tracker with no
    /// subscribers stays cached while any [`Tracker`] handle to it is alive.
    /// Once every handle is dropped, the next lookup that misses the cache
    /// tears it down, so a read-only `get_tracker(n).value()` does not grow
    /// the registry.
    pub fn get_tracker(&self, node: H::Node) -> Option<Tracker<A, H>> {
        if !self.contains(node) {
            self.inner.evict_unobserved();
        }
        RegistryInner::lookup(&self.inner, node).map(Tracker::from_inner)
    }

    /// Whether a tracker for `node` is currently cached.
    pub fn contains(&self, node: H::Node) -> bool {
        self.inner.trackers.borrow().contains_key(&node)
    }

    /// Number of cached trackers.
    pub fn len(&self) -> usize {
        self.inner.trackers.borrow().len()
    }

    /// Whether no tracker is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.trackers.borrow().is_empty()
    }
}

impl<A: Attribute, H: TreeHost> fmt::Debug for Registry<A, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("attribute", &A::NAME)
            .field("trackers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Dom, NodeData};
    use crate::host::stub::StubHost;
    use crate::host::NodeClass;
    use crate::tracker::Visibility;
    use pretty_assertions::assert_eq;

    #[test]
    fn cyclic_parent_chain_terminates() {
        let host = Rc::new(StubHost::new());
        host.add(1, NodeClass::Element, Some(2));
        host.add(2, NodeClass::Element, Some(1));
        let registry = Registry::<Visibility, StubHost>::new(host.clone());

        let t1 = registry.get_tracker(1).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(!t1.value());
        assert_eq!(t1.subscriber_count(), 1);
        assert_eq!(registry.get_tracker(2).unwrap().subscriber_count(), 1);
        assert_eq!(host.watcher_count(1), 1);
        assert_eq!(host.watcher_count(2), 1);
    }

    #[test]
    fn unobserved_tracker_is_evicted_on_next_miss() {
        let dom = Rc::new(Dom::new());
        let r = dom.insert(NodeData::layer());
        let a = dom.insert_child(r, NodeData::element()).unwrap();
        let b = dom.insert_child(r, NodeData::element()).unwrap();
        let registry = Registry::<Visibility, Dom>::new(dom.clone());

        assert!(registry.get_tracker(a).unwrap().value());
        assert_eq!(registry.len(), 2);

        let held = registry.get_tracker(b).unwrap();
        assert!(!registry.contains(a));
        assert_eq!(dom.watcher_count(a), 0);
        assert_eq!(registry.len(), 2);

        // A live handle keeps an unobserved tracker cached.
        let _a = registry.get_tracker(a).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(held.ptr_eq(&registry.get_tracker(b).unwrap()));
    }

    #[test]
    fn hit_does_not_evict() {
        let dom = Rc::new(Dom::new());
        let r = dom.insert(NodeData::layer());
        let a = dom.insert_child(r, NodeData::element()).unwrap();
        let registry = Registry::<Visibility, Dom>::new(dom);

        registry.get_tracker(a).unwrap();
        registry.get_tracker(a).unwrap();
        assert!(registry.contains(a));
        assert!(registry.contains(r));
    }
}
