//! Bridge error types.

use std::str::Utf8Error;

use hostlink_hostapi::{ClosureError, HostError};

/// Top-level error type for the bridge crate.
///
/// Every variant is `Send + Sync`, so a bridge error raised inside an import
/// can travel through wasmtime as a trap and be recovered intact at the
/// outer boundary with [`BridgeError::from_trap`].
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Wasmtime engine, compilation, or instantiation error.
    #[error("wasmtime error: {0}")]
    Wasmtime(#[from] anyhow::Error),

    /// Reading a module source failed.
    #[error("module source error: {0}")]
    Io(#[from] std::io::Error),

    /// Module validation failed (missing exports, bad imports, etc.).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A bridge operation ran before the module was instantiated.
    #[error("module is not instantiated")]
    NotInitialized,

    /// `init` was re-entered while instantiation was in progress.
    #[error("module instantiation is already in progress")]
    Instantiating,

    /// An earlier instantiation attempt failed; the bridge is unusable.
    #[error("module instantiation failed: {0}")]
    InitFailed(String),

    /// The module does not export something the bridge needs.
    #[error("missing module export: {0}")]
    MissingExport(String),

    /// Function table slot is empty or out of range.
    #[error("no function at table index {0}")]
    BadTableIndex(u32),

    /// Memory access outside linear memory. Fatal boundary violation.
    #[error("memory access out of bounds: offset {offset}, length {len}, memory size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    /// Module memory held malformed UTF-8 where text was expected.
    #[error("invalid utf-8 in module memory: {0}")]
    Decode(#[from] Utf8Error),

    /// The encoder produced more bytes than the region reserved for it.
    #[error("failed to pass whole string: needed {needed} bytes, reserved {reserved}")]
    EncodeOverflow { needed: usize, reserved: usize },

    /// Debug-mode argument assertion failed.
    #[error("expected a {expected} argument, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("closure invoked recursively")]
    ClosureReentrant,

    #[error("closure invoked after being dropped")]
    ClosureDropped,

    #[error("unknown closure adapter {0}")]
    UnknownAdapter(u32),

    #[error("unknown resource class {0}")]
    UnknownResourceClass(u32),

    #[error("unknown string enum entry {index} in table {table}")]
    UnknownEnum { table: u32, index: u32 },

    /// An import not marked fallible failed: a contract violation between
    /// the module and its host bindings.
    #[error("imported host function `{import}` that was not marked as fallible threw: {message}")]
    HostDefect { import: String, message: String },

    /// The module raised an error (`__wbindgen_throw`).
    #[error("{0}")]
    Thrown(String),

    /// Any other host failure that reached a host-initiated call.
    #[error("host error: {0}")]
    Host(String),

    /// Fuel exhausted during execution.
    #[error("fuel exhausted (instruction limit)")]
    FuelExhausted,

    /// The module trapped.
    #[error("guest trapped: {0}")]
    GuestTrapped(String),
}

impl BridgeError {
    /// Convert the error of a call into the module back into a bridge error.
    ///
    /// Bridge errors raised by imports further down the stack are unwrapped;
    /// out-of-fuel traps become `FuelExhausted`, any other trap `GuestTrapped`.
    pub fn from_trap(err: anyhow::Error) -> Self {
        match err.downcast::<BridgeError>() {
            Ok(bridge) => bridge,
            Err(err) => match err.downcast_ref::<wasmtime::Trap>() {
                Some(wasmtime::Trap::OutOfFuel) => Self::FuelExhausted,
                _ => Self::GuestTrapped(format!("{:#}", err)),
            },
        }
    }
}

impl From<HostError> for BridgeError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::TypeMismatch { expected, found } => Self::TypeMismatch { expected, found },
            HostError::Thrown(value) => Self::Thrown(value.debug_string()),
            other => Self::Host(other.to_string()),
        }
    }
}

impl From<ClosureError> for BridgeError {
    fn from(err: ClosureError) -> Self {
        match err {
            ClosureError::Reentrant => Self::ClosureReentrant,
            ClosureError::Dropped => Self::ClosureDropped,
        }
    }
}
