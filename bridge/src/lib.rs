//! `hostlink-bridge`: Wasmtime-based call bridge between a linear-memory
//! module and a host object graph.
//!
//! This crate instantiates a module against a fixed `wbg` import surface and
//! marshals every crossing of the boundary. It provides:
//!
//! - **Memory views:** cached byte/structured views, rebuilt after growth
//! - **String codec:** UTF-8 with allocate-then-shrink passing and strict decoding
//! - **Handles:** host values referenced by index, arrays of handles in memory
//! - **Closures:** refcounted module closures with reentrancy protection
//! - **Resources:** opaque module-owned objects with idempotent disposal
//! - **Error channel:** fallible imports store failures, others trap
//! - **ABI validation:** required exports checked before instantiation
//!
//! The primary entry point is [`Bridge`].

pub mod error;
pub mod config;
pub mod memory;
pub mod strings;
pub mod host_impl;
pub mod boundary;
pub mod handles;
pub mod closures;
pub mod resources;
pub mod validation;
pub mod linker;
pub mod runtime;

pub use error::BridgeError;
pub use config::{BridgeConfig, ClosureAdapter, ImportDecl};
pub use host_impl::BridgeState;
pub use runtime::{Bridge, InitState, ModuleSource, WasmResponse};
