//! Shared configuration and marshalling types.

/// Handle table sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Slots reserved up front (reserved constants included).
    pub initial_capacity: usize,
    /// Maximum number of slots the table may grow to.
    pub max_handles: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 128,
            max_handles: 1 << 20,
        }
    }
}

/// How a host value is lowered into a trampoline argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Any value, passed as a freshly allocated (or reserved) handle.
    Handle,
    /// `f64`.
    Number,
    /// `i32` 0/1.
    Bool,
    /// `i64`.
    BigInt,
}

/// How a trampoline result is lifted back into a host value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    /// An owned handle; the bridge takes it out of the table.
    Handle,
    Number,
    Bool,
}
