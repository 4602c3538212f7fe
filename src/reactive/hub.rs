//! NotificationHub: ordered, reentrancy-safe fan-out.
//!
//! A hub keeps its listeners in insertion order and delivers a value to each
//! of them in turn. Two rules keep delivery correct while listeners run
//! arbitrary code:
//!
//! - **Generation abort.** Every fan-out bumps a generation counter and
//!   remembers it. If a listener publishes again before returning, the nested
//!   fan-out runs to completion over the current list and the outer one stops
//!   as soon as control comes back to it. A synchronous burst therefore reaches
//!   each listener once, with the last value only.
//! - **Index adjustment.** Removing a listener while a fan-out is running
//!   shifts the live cursor and bound, so the remaining listeners are visited
//!   exactly once and the loop stops at the right place.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

// ---------------------------------------------------------------------------
// ConnectionId / Listener
// ---------------------------------------------------------------------------

/// Identifies one subscription on a hub, an [`Event`](super::Event) or a
/// tracker. Ids are never reused by the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Receiver of published values.
///
/// Implemented for every `Fn(&T)` closure. Trackers implement it with a link
/// that pulls the new value through their own recompute.
pub trait Listener<T> {
    /// Deliver one published value.
    fn deliver(&self, value: &T);

    /// The publisher is gone and will never deliver again. Plain callbacks
    /// ignore this.
    fn orphaned(&self) {}
}

impl<T, F> Listener<T> for F
where
    F: Fn(&T),
{
    fn deliver(&self, value: &T) {
        self(value)
    }
}

struct Slot<T> {
    id: ConnectionId,
    listener: Rc<dyn Listener<T>>,
}

// ---------------------------------------------------------------------------
// NotificationHub
// ---------------------------------------------------------------------------

/// Ordered listener list with generation-stamped, mutation-safe fan-out.
pub struct NotificationHub<T: 'static> {
    slots: RefCell<Vec<Slot<T>>>,
    next_id: Cell<u64>,
    /// Bumped once per fan-out; a mismatch after a delivery means a nested
    /// fan-out superseded the running one.
    generation: Cell<u64>,
    /// Index of the next listener to visit in the innermost fan-out.
    cursor: Cell<usize>,
    /// Exclusive end of the innermost fan-out.
    bound: Cell<usize>,
    /// Number of fan-outs currently on the stack.
    depth: Cell<usize>,
}

impl<T: 'static> NotificationHub<T> {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            generation: Cell::new(0),
            cursor: Cell::new(0),
            bound: Cell::new(0),
            depth: Cell::new(0),
        }
    }

    /// Append a listener. It takes part in every fan-out that starts after
    /// this call.
    pub fn connect(&self, listener: impl Listener<T> + 'static) -> ConnectionId {
        self.connect_rc(Rc::new(listener))
    }

    pub(crate) fn connect_rc(&self, listener: Rc<dyn Listener<T>>) -> ConnectionId {
        let id = ConnectionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push(Slot { id, listener });
        id
    }

    /// Remove a listener by id.
    ///
    /// Returns the position it occupied, or `None` if it was not connected.
    /// Removing an unknown id is a no-op.
    pub fn disconnect(&self, id: ConnectionId) -> Option<usize> {
        let position = {
            let mut slots = self.slots.borrow_mut();
            let position = slots.iter().position(|slot| slot.id == id)?;
            slots.remove(position);
            position
        };

        if self.is_active() {
            if position < self.cursor.get() {
                self.cursor.set(self.cursor.get() - 1);
            }
            if position < self.bound.get() {
                self.bound.set(self.bound.get() - 1);
            }
        }
        Some(position)
    }

    /// Deliver `value` to every current listener, superseding any fan-out
    /// already running on this hub.
    pub fn publish(&self, value: &T) {
        let bound = self.len();
        self.fan_out(value, bound);
    }

    /// Run one fan-out over the first `bound` listeners.
    ///
    /// Returns `false` if a nested fan-out superseded this one.
    pub(crate) fn fan_out(&self, value: &T, bound: usize) -> bool {
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        self.cursor.set(0);
        self.bound.set(bound);
        self.depth.set(self.depth.get() + 1);

        let mut completed = true;
        loop {
            let index = self.cursor.get();
            if index >= self.bound.get() {
                break;
            }
            self.cursor.set(index + 1);

            let listener = match self.slots.borrow().get(index) {
                Some(slot) => Rc::clone(&slot.listener),
                None => break,
            };
            listener.deliver(value);

            if self.generation.get() != generation {
                tracing::trace!(message = "hub.superseded", generation, index);
                completed = false;
                break;
            }
        }

        self.depth.set(self.depth.get() - 1);
        completed
    }

    /// Tell every connected listener its publisher is gone.
    pub(crate) fn orphan_all(&self) {
        let listeners: Vec<Rc<dyn Listener<T>>> = self
            .slots
            .borrow()
            .iter()
            .map(|slot| Rc::clone(&slot.listener))
            .collect();
        for listener in listeners {
            listener.orphaned();
        }
    }

    /// Whether a fan-out is currently running.
    pub fn is_active(&self) -> bool {
        self.depth.get() > 0
    }

    /// Number of connected listeners.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Whether no listener is connected.
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl<T: 'static> Default for NotificationHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for NotificationHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("listeners", &self.len())
            .field("generation", &self.generation.get())
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Something a [`Connection`] can detach itself from.
pub(crate) trait Disconnect {
    fn disconnect(&self, id: ConnectionId);
}

/// Handle to one subscription.
///
/// Dropping a `Connection` does **not** disconnect; call
/// [`disconnect`](Connection::disconnect) or pass [`id`](Connection::id) to
/// the source's own `disconnect`.
pub struct Connection {
    id: ConnectionId,
    source: Weak<dyn Disconnect>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, source: Weak<dyn Disconnect>) -> Self {
        Self { id, source }
    }

    /// The subscription id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Detach the listener from its source. No-op if the source is gone or
    /// the listener was already removed.
    pub fn disconnect(self) {
        if let Some(source) = self.source.upgrade() {
            source.disconnect(self.id);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("live_source", &(self.source.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
