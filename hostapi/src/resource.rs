//! Opaque resource tokens: host proxies for module-owned resources.
//!
//! The module surfaces a resource (a parsed structure, a session) as a raw
//! pointer wrapped in a `ResourceToken`. The host can pass the token around
//! and dispose of it, but never look inside. Disposal is idempotent: the
//! pointer is handed out for freeing exactly once.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::HostError;
use crate::finalize::{Finalizer, Registration};

/// A kind of module resource and the module export that frees it.
///
/// The free export has signature `(ptr: i32, from_finalizer: i32)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceClass {
    pub name: String,
    pub free_export: String,
}

impl ResourceClass {
    pub fn new(name: impl Into<String>, free_export: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            free_export: free_export.into(),
        }
    }
}

/// Host-visible token for one module-owned resource.
#[derive(Clone)]
pub struct ResourceToken(Rc<ResourceCell>);

struct ResourceCell {
    class: u32,
    class_name: Rc<str>,
    ptr: Cell<u32>,
    disposed: Cell<bool>,
    registration: Registration,
}

impl ResourceToken {
    /// Wrap a module pointer. Only the bridge's wrapping factory calls this.
    pub fn wrap(class: u32, class_name: impl Into<Rc<str>>, ptr: u32, registration: Registration) -> Self {
        Self(Rc::new(ResourceCell {
            class,
            class_name: class_name.into(),
            ptr: Cell::new(ptr),
            disposed: Cell::new(false),
            registration,
        }))
    }

    /// Direct construction from the host side. Always rejected: tokens
    /// must originate from the module.
    pub fn construct(class_name: &str) -> Result<Self, HostError> {
        Err(HostError::Construction(class_name.to_owned()))
    }

    /// Mark disposed and hand out the pointer for freeing.
    ///
    /// Returns `None` if the token was already disposed.
    pub fn destroy_into_raw(&self) -> Option<u32> {
        if self.0.disposed.replace(true) {
            return None;
        }
        self.0.registration.unregister();
        Some(self.0.ptr.replace(0))
    }

    pub fn class(&self) -> u32 {
        self.0.class
    }

    pub fn class_name(&self) -> &str {
        &self.0.class_name
    }

    /// The module pointer; 0 once disposed.
    pub fn raw_ptr(&self) -> u32 {
        self.0.ptr.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn same(&self, other: &ResourceToken) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Drop for ResourceCell {
    fn drop(&mut self) {
        if !self.disposed.replace(true) {
            let ptr = self.ptr.replace(0);
            self.registration.fire(Finalizer::Resource {
                class: self.class,
                ptr,
            });
        }
    }
}

impl fmt::Debug for ResourceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceToken")
            .field("class", &self.class_name())
            .field("ptr", &self.raw_ptr())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
