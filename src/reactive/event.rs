//! Event<T>: a standalone signal with deferred or immediate firing.
//!
//! Both disciplines share the [`NotificationHub`] fan-out. They differ in what
//! a fire does while another fan-out of the same event is running:
//!
//! - [`Firing::Deferred`] queues the arguments together with a snapshot of the
//!   listener count, and the queue is drained in order once the running round
//!   finishes. Every occurrence is delivered exactly once.
//! - [`Firing::Immediate`] starts a nested fan-out right away, which
//!   supersedes the running one. A burst collapses to its last arguments.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use super::hub::{Connection, ConnectionId, Disconnect, NotificationHub};

/// Firing discipline of an [`Event`], fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Firing {
    /// Queue fires that happen during a fan-out; deliver all of them in order.
    #[default]
    Deferred,
    /// Deliver at once; a reentrant fire supersedes the running fan-out.
    Immediate,
}

/// A queued occurrence: the arguments and the listener count at fire time.
struct Pending<T> {
    args: T,
    bound: usize,
}

struct EventInner<T: 'static> {
    firing: Firing,
    hub: NotificationHub<T>,
    pending: RefCell<VecDeque<Pending<T>>>,
}

impl<T: 'static> Disconnect for EventInner<T> {
    fn disconnect(&self, id: ConnectionId) {
        let Some(position) = self.hub.disconnect(id) else {
            return;
        };
        for entry in self.pending.borrow_mut().iter_mut() {
            if position < entry.bound {
                entry.bound -= 1;
            }
        }
    }
}

/// A signal carrying arguments of type `T` to its listeners.
///
/// Cloning an `Event` yields another handle to the same listener list.
pub struct Event<T: 'static> {
    inner: Rc<EventInner<T>>,
}

impl<T: 'static> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Event<T> {
    /// Create an event with the given firing discipline.
    pub fn new(firing: Firing) -> Self {
        Self {
            inner: Rc::new(EventInner {
                firing,
                hub: NotificationHub::new(),
                pending: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Shorthand for `Event::new(Firing::Deferred)`.
    pub fn deferred() -> Self {
        Self::new(Firing::Deferred)
    }

    /// Shorthand for `Event::new(Firing::Immediate)`.
    pub fn immediate() -> Self {
        Self::new(Firing::Immediate)
    }

    /// The discipline chosen at construction.
    pub fn firing(&self) -> Firing {
        self.inner.firing
    }

    /// Append a listener.
    pub fn connect(&self, listener: impl Fn(&T) + 'static) -> Connection {
        let id = self.inner.hub.connect(listener);
        let weak = Rc::downgrade(&self.inner);
        let source: Weak<dyn Disconnect> = weak;
        Connection::new(id, source)
    }

    /// Remove a listener. Unknown ids are ignored.
    ///
    /// Queued occurrences that would have reached the listener no longer do.
    pub fn disconnect(&self, id: ConnectionId) {
        self.inner.disconnect(id);
    }

    /// Fire the event.
    ///
    /// Runs synchronously: by the time the outermost `fire` returns, every
    /// occurrence queued during its fan-out has been delivered too.
    pub fn fire(&self, args: T) {
        let inner = &self.inner;
        match inner.firing {
            Firing::Immediate => inner.hub.publish(&args),
            Firing::Deferred => {
                let bound = inner.hub.len();
                if inner.hub.is_active() || !inner.pending.borrow().is_empty() {
                    let mut pending = inner.pending.borrow_mut();
                    pending.push_back(Pending { args, bound });
                    tracing::trace!(message = "event.queued", bound, queued = pending.len());
                    return;
                }

                inner.hub.fan_out(&args, bound);
                loop {
                    let next = inner.pending.borrow_mut().pop_front();
                    let Some(entry) = next else {
                        break;
                    };
                    inner.hub.fan_out(&entry.args, entry.bound);
                }
            }
        }
    }

    /// Number of connected listeners.
    pub fn len(&self) -> usize {
        self.inner.hub.len()
    }

    /// Whether no listener is connected.
    pub fn is_empty(&self) -> bool {
        self.inner.hub.is_empty()
    }

    /// Number of occurrences waiting for the running fan-out to finish.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new(Firing::default())
    }
}

impl<T: 'static> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("firing", &self.inner.firing)
            .field("listeners", &self.len())
            .field("pending", &self.pending_len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
