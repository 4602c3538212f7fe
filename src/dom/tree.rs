//! Tree operations: insert, remove, reparent, property edits, watchers.
//!
//! [`Dom`] is a reference [`TreeHost`]. Every mutator updates the arena first,
//! releases its borrows, and only then notifies watchers, so watcher callbacks
//! may freely query or watch the tree again.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use slotmap::{SecondaryMap, SlotMap};

use super::node::{NodeData, NodeId};
use crate::host::{HostCallback, NodeChange, NodeClass, TreeHost, WatchId};

/// Errors from structural and property edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node does not exist: {0:?}")]
    NodeNotFound(NodeId),
    #[error("cannot move {node:?} under its own descendant {parent:?}")]
    Cycle { node: NodeId, parent: NodeId },
}

struct Watcher {
    id: WatchId,
    callback: HostCallback<NodeId>,
}

/// Arena state, borrowed only inside `Dom` methods and never across a
/// watcher callback.
struct Arena {
    nodes: SlotMap<NodeId, NodeData>,
    children: SecondaryMap<NodeId, Vec<NodeId>>,
    parent: SecondaryMap<NodeId, NodeId>,
    root: Option<NodeId>,
}

impl Arena {
    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = id;
        while let Some(p) = self.parent.get(current).copied() {
            result.push(p);
            current = p;
        }
        result
    }

    /// `start` and all its descendants, breadth-first.
    fn subtree(&self, start: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            if !self.nodes.contains_key(current) {
                continue;
            }
            result.push(current);
            if let Some(kids) = self.children.get(current) {
                queue.extend(kids.iter().copied());
            }
        }
        result
    }

    fn unlink(&mut self, id: NodeId) -> Option<NodeId> {
        let parent_id = self.parent.remove(id)?;
        if let Some(siblings) = self.children.get_mut(parent_id) {
            siblings.retain(|&child| child != id);
        }
        Some(parent_id)
    }

    fn link(&mut self, id: NodeId, parent_id: NodeId) {
        self.parent.insert(id, parent_id);
        if let Some(siblings) = self.children.get_mut(parent_id) {
            siblings.push(id);
        }
    }
}

/// The reference host tree, backed by a slotmap arena.
///
/// All nodes live in a single `SlotMap`. Parent/child relationships are stored
/// in secondary maps. The first node inserted with [`insert`](Dom::insert)
/// becomes the root; a node's ancestry is valid when it is the root or a
/// descendant of it.
pub struct Dom {
    arena: RefCell<Arena>,
    watchers: RefCell<SecondaryMap<NodeId, Vec<Watcher>>>,
    next_watch: Cell<u64>,
}

impl Dom {
    /// Create an empty DOM.
    pub fn new() -> Self {
        Self {
            arena: RefCell::new(Arena {
                nodes: SlotMap::with_key(),
                children: SecondaryMap::new(),
                parent: SecondaryMap::new(),
                root: None,
            }),
            watchers: RefCell::new(SecondaryMap::new()),
            next_watch: Cell::new(0),
        }
    }

    /// Insert a root-level node (no parent).
    ///
    /// If no root has been set yet, this node becomes the root.
    pub fn insert(&self, data: NodeData) -> NodeId {
        let mut arena = self.arena.borrow_mut();
        let id = arena.nodes.insert(data);
        arena.children.insert(id, Vec::new());
        if arena.root.is_none() {
            arena.root = Some(id);
        }
        id
    }

    /// Insert a node as the last child of `parent`.
    pub fn insert_child(&self, parent: NodeId, data: NodeData) -> Result<NodeId, DomError> {
        let id = {
            let mut arena = self.arena.borrow_mut();
            if !arena.nodes.contains_key(parent) {
                return Err(DomError::NodeNotFound(parent));
            }
            let id = arena.nodes.insert(data);
            arena.children.insert(id, Vec::new());
            arena.link(id, parent);
            id
        };
        self.emit(parent, NodeChange::ChildrenChanged);
        Ok(id)
    }

    /// Remove a node and all its descendants.
    ///
    /// Watchers receive [`NodeChange::Destroyed`] deepest node first, after
    /// the whole subtree has left the arena. The former parent then receives
    /// [`NodeChange::ChildrenChanged`]. Returns the removed node's data, or
    /// `None` if it didn't exist.
    pub fn remove(&self, id: NodeId) -> Option<NodeData> {
        let (data, doomed, former_parent) = {
            let mut arena = self.arena.borrow_mut();
            if !arena.nodes.contains_key(id) {
                return None;
            }
            let former_parent = arena.unlink(id);
            if arena.root == Some(id) {
                arena.root = None;
            }

            let doomed = arena.subtree(id);
            let mut data = None;
            for &current in &doomed {
                arena.children.remove(current);
                arena.parent.remove(current);
                let removed = arena.nodes.remove(current);
                if current == id {
                    data = removed;
                }
            }
            (data, doomed, former_parent)
        };

        for &node in doomed.iter().rev() {
            self.emit(node, NodeChange::Destroyed);
            self.watchers.borrow_mut().remove(node);
        }
        if let Some(parent) = former_parent {
            self.emit(parent, NodeChange::ChildrenChanged);
        }
        data
    }

    /// Move `node` under `new_parent`, or detach it with `None`.
    ///
    /// The node keeps its subtree. Notifications, in order: `ParentChanged` on
    /// the node, `AncestryChanged` on the node and every descendant, then
    /// `ChildrenChanged` on the old and the new parent.
    pub fn reparent(&self, node: NodeId, new_parent: Option<NodeId>) -> Result<(), DomError> {
        let (old_parent, moved) = {
            let mut arena = self.arena.borrow_mut();
            if !arena.nodes.contains_key(node) {
                return Err(DomError::NodeNotFound(node));
            }
            if let Some(parent) = new_parent {
                if !arena.nodes.contains_key(parent) {
                    return Err(DomError::NodeNotFound(parent));
                }
                if parent == node || arena.ancestors(parent).contains(&node) {
                    return Err(DomError::Cycle { node, parent });
                }
            }
            if arena.parent.get(node).copied() == new_parent {
                return Ok(());
            }

            let old_parent = arena.unlink(node);
            if let Some(parent) = new_parent {
                arena.link(node, parent);
            }
            (old_parent, arena.subtree(node))
        };

        self.emit(node, NodeChange::ParentChanged(new_parent));
        for &descendant in &moved {
            self.emit(descendant, NodeChange::AncestryChanged);
        }
        if let Some(parent) = old_parent {
            self.emit(parent, NodeChange::ChildrenChanged);
        }
        if let Some(parent) = new_parent {
            self.emit(parent, NodeChange::ChildrenChanged);
        }
        Ok(())
    }

    /// Detach `node` from its parent. Same as `reparent(node, None)`.
    pub fn detach(&self, node: NodeId) -> Result<(), DomError> {
        self.reparent(node, None)
    }

    /// Set the `visible` flag. Notifies only on an actual change.
    pub fn set_visible(&self, id: NodeId, visible: bool) -> Result<(), DomError> {
        if self.update(id, |data| std::mem::replace(&mut data.visible, visible) != visible)? {
            self.emit(id, NodeChange::Visible(visible));
        }
        Ok(())
    }

    /// Set the `enabled` flag. Notifies only on an actual change.
    pub fn set_enabled(&self, id: NodeId, enabled: bool) -> Result<(), DomError> {
        if self.update(id, |data| std::mem::replace(&mut data.enabled, enabled) != enabled)? {
            self.emit(id, NodeChange::Enabled(enabled));
        }
        Ok(())
    }

    /// Set the scale factor. Notifies only on an actual change.
    pub fn set_scale(&self, id: NodeId, scale: f64) -> Result<(), DomError> {
        if self.update(id, |data| std::mem::replace(&mut data.scale, scale) != scale)? {
            self.emit(id, NodeChange::Scale(scale));
        }
        Ok(())
    }

    /// Explicitly set the root node. Every node is told its ancestry changed.
    pub fn set_root(&self, id: NodeId) -> Result<(), DomError> {
        let everyone: Vec<NodeId> = {
            let mut arena = self.arena.borrow_mut();
            if !arena.nodes.contains_key(id) {
                return Err(DomError::NodeNotFound(id));
            }
            if arena.root == Some(id) {
                return Ok(());
            }
            arena.root = Some(id);
            arena.nodes.keys().collect()
        };
        for node in everyone {
            self.emit(node, NodeChange::AncestryChanged);
        }
        Ok(())
    }

    fn update(&self, id: NodeId, f: impl FnOnce(&mut NodeData) -> bool) -> Result<bool, DomError> {
        let mut arena = self.arena.borrow_mut();
        let data = arena.nodes.get_mut(id).ok_or(DomError::NodeNotFound(id))?;
        Ok(f(data))
    }

    /// Deliver `change` to the watchers of `node`.
    ///
    /// Iterates over a snapshot; a watcher removed by an earlier callback in
    /// the same dispatch is skipped.
    fn emit(&self, node: NodeId, change: NodeChange<NodeId>) {
        let snapshot: Vec<(WatchId, HostCallback<NodeId>)> = match self.watchers.borrow().get(node) {
            Some(list) => list.iter().map(|w| (w.id, w.callback.clone())).collect(),
            None => return,
        };
        for (id, callback) in snapshot {
            let live = self
                .watchers
                .borrow()
                .get(node)
                .is_some_and(|list| list.iter().any(|w| w.id == id));
            if live {
                callback(&change);
            }
        }
    }

    /// Get the parent of a node, if it has one.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.borrow().parent.get(id).copied()
    }

    /// Get the children of a node. Empty if the node has no children or does
    /// not exist.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.arena.borrow().children.get(id).cloned().unwrap_or_default()
    }

    /// Walk from `id` up to the root, collecting ancestor node ids.
    ///
    /// The returned vec does **not** include `id` itself; it starts with the
    /// immediate parent.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        self.arena.borrow().ancestors(id)
    }

    /// Whether `id` is the root or a descendant of it.
    pub fn is_mounted(&self, id: NodeId) -> bool {
        let arena = self.arena.borrow();
        match arena.root {
            Some(root) => id == root || arena.ancestors(id).last() == Some(&root),
            None => false,
        }
    }

    /// Snapshot of a node's data.
    pub fn get(&self, id: NodeId) -> Option<NodeData> {
        self.arena.borrow().nodes.get(id).cloned()
    }

    /// The current root node, if set.
    pub fn root(&self) -> Option<NodeId> {
        self.arena.borrow().root
    }

    /// Number of nodes in the DOM.
    pub fn len(&self) -> usize {
        self.arena.borrow().nodes.len()
    }

    /// Whether the DOM is empty.
    pub fn is_empty(&self) -> bool {
        self.arena.borrow().nodes.is_empty()
    }

    /// Whether the DOM contains a node with the given id.
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.borrow().nodes.contains_key(id)
    }

    /// Number of live watches on `id`.
    pub fn watcher_count(&self, id: NodeId) -> usize {
        self.watchers.borrow().get(id).map_or(0, Vec::len)
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dom")
            .field("nodes", &self.len())
            .field("root", &self.root())
            .finish()
    }
}

impl TreeHost for Dom {
    type Node = NodeId;

    fn classify(&self, node: NodeId) -> Option<NodeClass> {
        self.arena.borrow().nodes.get(node).map(|data| data.class)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        Dom::parent(self, node)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        Dom::children(self, node)
    }

    fn visible(&self, node: NodeId) -> bool {
        self.arena.borrow().nodes.get(node).is_some_and(|data| data.visible)
    }

    fn enabled(&self, node: NodeId) -> bool {
        self.arena.borrow().nodes.get(node).is_some_and(|data| data.enabled)
    }

    fn scale(&self, node: NodeId) -> f64 {
        self.arena.borrow().nodes.get(node).map_or(1.0, |data| data.scale)
    }

    fn ancestry_valid(&self, node: NodeId) -> bool {
        self.is_mounted(node)
    }

    fn watch(&self, node: NodeId, callback: HostCallback<NodeId>) -> WatchId {
        let id = WatchId::new(self.next_watch.get());
        self.next_watch.set(id.raw() + 1);
        if !self.contains(node) {
            return id;
        }
        let mut watchers = self.watchers.borrow_mut();
        match watchers.get_mut(node) {
            Some(list) => list.push(Watcher { id, callback }),
            None => {
                watchers.insert(node, vec![Watcher { id, callback }]);
            }
        }
        id
    }

    fn unwatch(&self, node: NodeId, watch: WatchId) {
        if let Some(list) = self.watchers.borrow_mut().get_mut(node) {
            list.retain(|w| w.id != watch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    /// Build a small test tree:
    /// ```text
    ///       root (Layer)
    ///      /    \
    ///    a        b
    ///   / \
    ///  c   d
    /// ```
    fn build_tree() -> (Dom, NodeId, NodeId, NodeId, NodeId, NodeId) {
        let dom = Dom::new();
        let root = dom.insert(NodeData::layer().with_name("root"));
        let a = dom.insert_child(root, NodeData::group().with_name("a")).unwrap();
        let b = dom.insert_child(root, NodeData::element().with_name("b")).unwrap();
        let c = dom.insert_child(a, NodeData::element().with_name("c")).unwrap();
        let d = dom.insert_child(a, NodeData::element().with_name("d")).unwrap();
        (dom, root, a, b, c, d)
    }

    fn record(dom: &Dom, node: NodeId) -> Rc<RefCell<Vec<NodeChange<NodeId>>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_c = log.clone();
        dom.watch(node, Rc::new(move |change: &NodeChange<NodeId>| {
            log_c.borrow_mut().push(change.clone())
        }));
        log
    }

    #[test]
    fn insert_sets_root() {
        let dom = Dom::new();
        let id = dom.insert(NodeData::layer());
        assert_eq!(dom.root(), Some(id));
        let _second = dom.insert(NodeData::layer());
        assert_eq!(dom.root(), Some(id));
    }

    #[test]
    fn parent_children_ancestors() {
        let (dom, root, a, b, c, d) = build_tree();
        assert_eq!(dom.parent(c), Some(a));
        assert_eq!(dom.parent(root), None);
        assert_eq!(dom.children(root), vec![a, b]);
        assert_eq!(dom.children(a), vec![c, d]);
        assert_eq!(dom.ancestors(c), vec![a, root]);
        assert_eq!(dom.len(), 5);
    }

    #[test]
    fn insert_child_missing_parent() {
        let (dom, _root, a, ..) = build_tree();
        dom.remove(a);
        assert_eq!(
            dom.insert_child(a, NodeData::element()),
            Err(DomError::NodeNotFound(a))
        );
    }

    #[test]
    fn insert_child_notifies_parent() {
        let (dom, _root, a, ..) = build_tree();
        let log = record(&dom, a);
        dom.insert_child(a, NodeData::element()).unwrap();
        assert_eq!(*log.borrow(), vec![NodeChange::ChildrenChanged]);
    }

    #[test]
    fn mounted_follows_root() {
        let (dom, root, _a, _b, c, _d) = build_tree();
        let stray = dom.insert(NodeData::layer());
        assert!(dom.is_mounted(root));
        assert!(dom.is_mounted(c));
        assert!(!dom.is_mounted(stray));

        dom.reparent(stray, Some(c)).unwrap();
        assert!(dom.is_mounted(stray));
    }

    #[test]
    fn property_edits_notify_on_change_only() {
        let (dom, _root, _a, b, ..) = build_tree();
        let log = record(&dom, b);
        dom.set_visible(b, true).unwrap();
        dom.set_visible(b, false).unwrap();
        dom.set_enabled(b, false).unwrap();
        dom.set_scale(b, 2.0).unwrap();
        dom.set_scale(b, 2.0).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                NodeChange::Visible(false),
                NodeChange::Enabled(false),
                NodeChange::Scale(2.0),
            ]
        );
        assert!(!dom.get(b).unwrap().visible);
    }

    #[test]
    fn property_edit_missing_node() {
        let (dom, _root, _a, b, ..) = build_tree();
        dom.remove(b);
        assert_eq!(dom.set_visible(b, false), Err(DomError::NodeNotFound(b)));
    }

    #[test]
    fn reparent_notifications() {
        let (dom, root, a, b, c, _d) = build_tree();
        let c_log = record(&dom, c);
        let a_log = record(&dom, a);
        let b_log = record(&dom, b);

        dom.reparent(c, Some(b)).unwrap();
        assert_eq!(dom.parent(c), Some(b));
        assert_eq!(dom.ancestors(c), vec![b, root]);
        assert_eq!(
            *c_log.borrow(),
            vec![NodeChange::ParentChanged(Some(b)), NodeChange::AncestryChanged]
        );
        assert_eq!(*a_log.borrow(), vec![NodeChange::ChildrenChanged]);
        assert_eq!(*b_log.borrow(), vec![NodeChange::ChildrenChanged]);
    }

    #[test]
    fn reparent_moves_subtree_ancestry() {
        let (dom, _root, a, b, _c, d) = build_tree();
        let d_log = record(&dom, d);
        dom.reparent(a, Some(b)).unwrap();
        assert_eq!(*d_log.borrow(), vec![NodeChange::AncestryChanged]);
    }

    #[test]
    fn reparent_same_parent_is_silent() {
        let (dom, root, a, ..) = build_tree();
        let log = record(&dom, a);
        dom.reparent(a, Some(root)).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn reparent_rejects_cycle() {
        let (dom, _root, a, _b, c, _d) = build_tree();
        assert_eq!(
            dom.reparent(a, Some(c)),
            Err(DomError::Cycle { node: a, parent: c })
        );
        assert_eq!(dom.reparent(a, Some(a)), Err(DomError::Cycle { node: a, parent: a }));
    }

    #[test]
    fn detach_unmounts() {
        let (dom, root, a, _b, c, _d) = build_tree();
        dom.detach(a).unwrap();
        assert_eq!(dom.parent(a), None);
        assert!(!dom.children(root).contains(&a));
        assert!(!dom.is_mounted(c));
    }

    #[test]
    fn remove_subtree_notifies_deepest_first() {
        let (dom, root, a, _b, c, d) = build_tree();
        let order = Rc::new(RefCell::new(Vec::new()));
        for node in [a, c, d] {
            let order_c = order.clone();
            dom.watch(node, Rc::new(move |change: &NodeChange<NodeId>| {
                if *change == NodeChange::Destroyed {
                    order_c.borrow_mut().push(node);
                }
            }));
        }
        let root_log = record(&dom, root);

        let removed = dom.remove(a).unwrap();
        assert_eq!(removed.name.as_deref(), Some("a"));
        assert_eq!(*order.borrow(), vec![d, c, a]);
        assert_eq!(*root_log.borrow(), vec![NodeChange::ChildrenChanged]);
        assert_eq!(dom.len(), 2);
        assert!(!dom.contains(c));
        assert_eq!(dom.watcher_count(a), 0);
    }

    #[test]
    fn remove_root_clears_root() {
        let (dom, root, ..) = build_tree();
        dom.remove(root);
        assert_eq!(dom.root(), None);
        assert!(dom.is_empty());
        assert!(dom.remove(root).is_none());
    }

    #[test]
    fn unwatch_during_dispatch_skips_peer() {
        let (dom, _root, _a, b, ..) = build_tree();
        let hits = Rc::new(Cell::new(0));
        let second: Rc<Cell<Option<WatchId>>> = Rc::default();

        let dom = Rc::new(dom);
        let dom_c = dom.clone();
        let second_c = second.clone();
        dom.watch(b, Rc::new(move |_: &NodeChange<NodeId>| {
            if let Some(id) = second_c.take() {
                dom_c.unwatch(b, id);
            }
        }));
        let hits_c = hits.clone();
        second.set(Some(dom.watch(b, Rc::new(move |_: &NodeChange<NodeId>| {
            hits_c.set(hits_c.get() + 1)
        }))));

        dom.set_visible(b, false).unwrap();
        assert_eq!(hits.get(), 0);
        assert_eq!(dom.watcher_count(b), 1);
    }

    #[test]
    fn set_root_notifies_everyone() {
        let (dom, _root, _a, b, ..) = build_tree();
        let stray = dom.insert(NodeData::layer());
        let log = record(&dom, b);
        dom.set_root(stray).unwrap();
        assert_eq!(*log.borrow(), vec![NodeChange::AncestryChanged]);
        assert!(!dom.is_mounted(b));
        assert!(dom.is_mounted(stray));
    }

    #[test]
    fn host_queries() {
        let (dom, root, a, b, ..) = build_tree();
        let m = dom.insert_child(b, NodeData::scale_modifier(3.0)).unwrap();
        assert_eq!(dom.classify(root), Some(NodeClass::Layer));
        assert_eq!(dom.classify(a), Some(NodeClass::Group));
        assert_eq!(TreeHost::scale(&dom, m), 3.0);
        assert!(TreeHost::visible(&dom, b));
        assert!(dom.ancestry_valid(b));
        dom.remove(m);
        assert_eq!(dom.classify(m), None);
        assert_eq!(TreeHost::scale(&dom, m), 1.0);
    }

    #[test]
    fn error_display() {
        let (_dom, _root, a, ..) = build_tree();
        let msg = DomError::Cycle { node: a, parent: a }.to_string();
        assert!(msg.contains("descendant"));
    }
}
