//! In-memory host environment.
//!
//! `Globals` implements `HostEnvironment` with a `BTreeMap`. Embedders
//! register the host functions and objects the module is allowed to reach;
//! tests use it to stand in for a browser-like host.

use std::collections::BTreeMap;

use crate::error::HostError;
use crate::function::HostFunction;
use crate::traits::HostEnvironment;
use crate::value::HostValue;

#[derive(Debug, Clone, Default)]
pub struct Globals {
    data: BTreeMap<String, HostValue>,
}

impl Globals {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    /// Register a global value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<HostValue>) {
        self.data.insert(name.into(), value.into());
    }

    /// Builder-style registration of a host function.
    pub fn with_function<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        self.insert(name, HostFunction::native(name, body));
        self
    }

    /// Builder-style registration of any value.
    pub fn with_value(mut self, name: &str, value: impl Into<HostValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Remove a global.
    pub fn remove(&mut self, name: &str) {
        self.data.remove(name);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl HostEnvironment for Globals {
    fn global(&self, name: &str) -> Option<HostValue> {
        self.data.get(name).cloned()
    }

    fn has_global(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }
}
