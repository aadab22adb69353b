//! Closure bridge state: the refcount and environment snapshot protocol.
//!
//! A module closure is a pair of environment words `(a, b)` plus the index
//! of a module-side destructor. The host sees it as a function value. Every
//! invocation runs:
//!
//! 1. `enter`: bump `cnt`, snapshot `a` and zero it
//! 2. dispatch to the module trampoline with the snapshot
//! 3. `exit`: drop `cnt`; at zero the destructor is owed, otherwise `a` is restored
//!
//! The host's own reference is the initial `cnt = 1`, given back by `release`
//! exactly once; later releases are no-ops. While a call is in flight `cnt`
//! stays above zero, so only `exit` can destroy the state then. The
//! destructor is handed out at most once per state.

use std::cell::RefCell;
use std::fmt;

use crate::finalize::{Finalizer, Registration};

/// Why a closure call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClosureError {
    /// An outer invocation of the same closure is still on the stack.
    #[error("closure invoked recursively")]
    Reentrant,
    /// The closure has been destroyed.
    #[error("closure invoked after being dropped")]
    Dropped,
}

/// A module destructor call owed for a closure environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destructor {
    /// Index into the module's function table.
    pub index: u32,
    pub a: u32,
    pub b: u32,
}

/// Mutable state shared by every host reference to one module closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureState {
    a: u32,
    b: u32,
    cnt: u32,
    dtor: u32,
    host_ref_released: bool,
    destroyed: bool,
}

impl ClosureState {
    pub fn new(a: u32, b: u32, dtor: u32) -> Self {
        Self {
            a,
            b,
            cnt: 1,
            dtor,
            host_ref_released: false,
            destroyed: false,
        }
    }

    /// Start an invocation. Returns the `(a, b)` pair to dispatch with.
    pub fn enter(&mut self) -> Result<(u32, u32), ClosureError> {
        if self.destroyed {
            return Err(ClosureError::Dropped);
        }
        if self.a == 0 {
            return Err(ClosureError::Reentrant);
        }
        self.cnt += 1;
        let snapshot = self.a;
        self.a = 0;
        Ok((snapshot, self.b))
    }

    /// Finish an invocation started with `enter`, whether it succeeded or not.
    pub fn exit(&mut self, snapshot: u32) -> Option<Destructor> {
        if self.destroyed || self.cnt == 0 {
            return None;
        }
        self.cnt -= 1;
        if self.cnt == 0 {
            self.destroyed = true;
            return Some(Destructor {
                index: self.dtor,
                a: snapshot,
                b: self.b,
            });
        }
        self.a = snapshot;
        None
    }

    /// Give back the host reference. Returns the destructor if this was the
    /// last one and no invocation is in flight.
    ///
    /// The host reference is given back once; repeated releases, including
    /// ones made from inside a running invocation, do nothing.
    pub fn release(&mut self) -> Option<Destructor> {
        if self.destroyed || self.host_ref_released {
            return None;
        }
        self.host_ref_released = true;
        self.cnt -= 1;
        // An in-flight call still holds a count; `exit` owns the teardown.
        if self.cnt > 0 {
            return None;
        }
        let a = std::mem::replace(&mut self.a, 0);
        self.destroyed = true;
        Some(Destructor {
            index: self.dtor,
            a,
            b: self.b,
        })
    }

    /// Destroy unconditionally (the host value became unreachable).
    fn abandon(&mut self) -> Option<Destructor> {
        if self.destroyed {
            return None;
        }
        self.destroyed = true;
        self.cnt = 0;
        let a = std::mem::replace(&mut self.a, 0);
        Some(Destructor {
            index: self.dtor,
            a,
            b: self.b,
        })
    }

    pub fn refcount(&self) -> u32 {
        self.cnt
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Current `(a, b)`; `a` reads 0 while a call is in flight or after destruction.
    pub fn env(&self) -> (u32, u32) {
        (self.a, self.b)
    }
}

/// A module closure as held by host function values.
pub struct ClosureCell {
    state: RefCell<ClosureState>,
    adapter: u32,
    registration: Registration,
}

impl ClosureCell {
    /// `adapter` selects the trampoline signature the bridge dispatches through.
    pub fn new(a: u32, b: u32, dtor: u32, adapter: u32, registration: Registration) -> Self {
        Self {
            state: RefCell::new(ClosureState::new(a, b, dtor)),
            adapter,
            registration,
        }
    }

    pub fn adapter(&self) -> u32 {
        self.adapter
    }

    pub fn enter(&self) -> Result<(u32, u32), ClosureError> {
        self.state.borrow_mut().enter()
    }

    pub fn exit(&self, snapshot: u32) -> Option<Destructor> {
        let dtor = self.state.borrow_mut().exit(snapshot);
        if dtor.is_some() {
            self.registration.unregister();
        }
        dtor
    }

    pub fn release(&self) -> Option<Destructor> {
        let dtor = self.state.borrow_mut().release();
        if dtor.is_some() {
            self.registration.unregister();
        }
        dtor
    }

    pub fn refcount(&self) -> u32 {
        self.state.borrow().refcount()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().is_destroyed()
    }
}

impl Drop for ClosureCell {
    fn drop(&mut self) {
        if let Some(dtor) = self.state.get_mut().abandon() {
            self.registration.fire(Finalizer::Closure(dtor));
        }
    }
}

impl fmt::Debug for ClosureCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ClosureCell")
            .field("env", &state.env())
            .field("cnt", &state.refcount())
            .field("destroyed", &state.is_destroyed())
            .field("adapter", &self.adapter)
            .finish()
    }
}
