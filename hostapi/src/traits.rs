//! Host environment trait: the capabilities the module may reach.
//!
//! The bridge does not implement DOM, fetch, timers or telemetry. It asks
//! the environment for a named global when the module first needs it. An
//! environment that lacks a capability is still usable; only calls to the
//! missing capability fail.

use crate::value::HostValue;

/// Source of host globals (functions, objects, constants).
pub trait HostEnvironment {
    /// Look up a global by name. `None` means the capability is absent.
    fn global(&self, name: &str) -> Option<HostValue>;

    /// Whether the environment provides `name`.
    ///
    /// Default implementation uses `global()`.
    fn has_global(&self, name: &str) -> bool {
        self.global(name).is_some()
    }
}
