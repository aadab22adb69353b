//! Best-effort reclamation of unreachable closures and resources.
//!
//! The host has no garbage collector to notify the bridge, so the last
//! `Drop` of a closure cell or resource token stands in for finalization.
//! A dropped object whose `Registration` is still active enqueues its
//! pending destructor here. The bridge drains the queue only at
//! host-initiated entry points, so module code is never re-entered from
//! inside a boundary call. Timing is not guaranteed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::closure::Destructor;

/// Module-side cleanup owed for an object that was dropped without
/// explicit release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalizer {
    /// Run a closure destructor.
    Closure(Destructor),
    /// Call the free routine of resource class `class` on `ptr`.
    Resource { class: u32, ptr: u32 },
}

type Pending = RefCell<Vec<Finalizer>>;

/// Queue of finalizers awaiting the next host-initiated entry point.
#[derive(Debug, Clone)]
pub struct FinalizationQueue {
    pending: Rc<Pending>,
    enabled: bool,
}

impl Default for FinalizationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FinalizationQueue {
    pub fn new() -> Self {
        Self {
            pending: Rc::new(RefCell::new(Vec::new())),
            enabled: true,
        }
    }

    /// A queue whose registrations never fire; explicit disposal only.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register a new object with this queue.
    pub fn register(&self) -> Registration {
        if !self.enabled {
            return Registration::detached();
        }
        Registration {
            queue: Some(Rc::downgrade(&self.pending)),
            active: Cell::new(true),
        }
    }

    /// Take every pending finalizer, oldest first.
    pub fn drain(&self) -> Vec<Finalizer> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

/// An object's link to the finalization queue. Fires at most once.
#[derive(Debug)]
pub struct Registration {
    queue: Option<Weak<Pending>>,
    active: Cell<bool>,
}

impl Registration {
    /// A registration that never fires.
    pub fn detached() -> Self {
        Self {
            queue: None,
            active: Cell::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Explicit release happened; the finalizer must not run.
    pub fn unregister(&self) {
        self.active.set(false);
    }

    /// Enqueue `finalizer` if still registered. Returns whether it was queued.
    pub fn fire(&self, finalizer: Finalizer) -> bool {
        if !self.active.replace(false) {
            return false;
        }
        match self.queue.as_ref().and_then(Weak::upgrade) {
            Some(pending) => {
                tracing::trace!(?finalizer, "unreachable object queued for finalization");
                pending.borrow_mut().push(finalizer);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(ptr: u32) -> Finalizer {
        Finalizer::Resource { class: 0, ptr }
    }

    #[test]
    fn test_fire_once() {
        let queue = FinalizationQueue::new();
        let reg = queue.register();
        assert!(reg.fire(resource(8)));
        assert!(!reg.fire(resource(8)));
        assert_eq!(queue.drain(), vec![resource(8)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unregister_prevents_fire() {
        let queue = FinalizationQueue::new();
        let reg = queue.register();
        reg.unregister();
        assert!(!reg.fire(resource(8)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_disabled_queue() {
        let queue = FinalizationQueue::disabled();
        let reg = queue.register();
        assert!(!reg.is_active());
        assert!(!reg.fire(resource(1)));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_fire_after_queue_dropped() {
        let queue = FinalizationQueue::new();
        let reg = queue.register();
        drop(queue);
        assert!(!reg.fire(resource(1)));
    }
}
