//! Callable host values.
//!
//! A function value is either implemented by the host (`Native`) or is a
//! module closure surfaced through the closure bridge (`Closure`). Native
//! functions run without touching the module; closures need a live module
//! instance and are invoked by the bridge runtime.

use std::fmt;
use std::rc::Rc;

use crate::closure::ClosureCell;
use crate::error::HostError;
use crate::value::HostValue;

/// Signature of a host-implemented function: `(this, args) -> result`.
pub type NativeFn = dyn Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostError>;

/// A host function value.
#[derive(Clone)]
pub enum HostFunction {
    Native(Rc<NativeFunction>),
    Closure(Rc<ClosureCell>),
}

impl HostFunction {
    /// Wrap a host closure as a function value.
    pub fn native<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        Self::Native(Rc::new(NativeFunction {
            name: name.into(),
            body: Box::new(body),
        }))
    }

    /// Stand-in for a capability the host environment does not provide.
    ///
    /// Binding never fails; the first invocation does.
    pub fn not_defined(name: impl Into<String>) -> Self {
        let name = name.into();
        let missing = name.clone();
        Self::native(name, move |_, _| Err(HostError::NotDefined(missing.clone())))
    }

    /// Function name; module closures are anonymous.
    pub fn name(&self) -> &str {
        match self {
            Self::Native(f) => &f.name,
            Self::Closure(_) => "",
        }
    }

    /// Identity comparison.
    pub fn same(&self, other: &HostFunction) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_closure(&self) -> Option<&Rc<ClosureCell>> {
        match self {
            Self::Closure(cell) => Some(cell),
            Self::Native(_) => None,
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(native) => write!(f, "Native({})", native.name),
            Self::Closure(cell) => write!(f, "Closure({:?})", cell),
        }
    }
}

/// A function implemented by the host.
pub struct NativeFunction {
    name: String,
    body: Box<NativeFn>,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, this: &HostValue, args: &[HostValue]) -> Result<HostValue, HostError> {
        (self.body)(this, args)
    }
}
