//! `hostlink-hostapi`: host object model and pure bridge bookkeeping.
//!
//! This crate holds everything the module bridge tracks on the host side that
//! does not need a running module instance:
//!
//! - `HostValue`: the host object graph values that cross the boundary by handle
//! - `HandleTable`: integer handles standing in for host values, with reserved slots
//! - `ClosureState` / `ClosureCell`: refcount and snapshot protocol for module closures
//! - `ResourceToken`: opaque proxy for a module-owned resource
//! - `FinalizationQueue`: best-effort reclamation of unreachable closures and resources
//! - `HostEnvironment` trait: host capabilities, with an in-memory `Globals`
//! - `HostError`: host-side failures, convertible into host error values
//!
//! Everything here is single-threaded (`Rc`/`RefCell`): the module and all
//! host callbacks run on one logical thread.

pub mod error;
pub mod types;
pub mod value;
pub mod function;
pub mod handle_table;
pub mod finalize;
pub mod closure;
pub mod resource;
pub mod assert;
pub mod enums;
pub mod globals;
pub mod traits;

// Re-export commonly used types at the crate root.
pub use error::HostError;
pub use types::{ArgKind, HeapConfig, ReturnKind};
pub use value::{ErrorValue, HostObject, HostValue};
pub use function::{HostFunction, NativeFunction};
pub use handle_table::{Handle, HandleTable};
pub use finalize::{FinalizationQueue, Finalizer, Registration};
pub use closure::{ClosureCell, ClosureError, ClosureState, Destructor};
pub use resource::{ResourceClass, ResourceToken};
pub use enums::StringEnum;
pub use globals::Globals;
pub use traits::HostEnvironment;
