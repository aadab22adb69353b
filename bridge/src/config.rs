//! Bridge configuration.

use hostlink_hostapi::{ArgKind, HeapConfig, ResourceClass, ReturnKind};

/// Bytes per linear memory page.
pub const WASM_PAGE_SIZE: usize = 65536;

/// One closure signature: the module export dispatched to and how arguments
/// and the result cross the boundary.
///
/// The trampoline export has signature `(a: i32, b: i32, params...) -> ret`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureAdapter {
    pub trampoline: String,
    pub params: Vec<ArgKind>,
    pub ret: ReturnKind,
}

impl ClosureAdapter {
    pub fn new(trampoline: impl Into<String>, params: &[ArgKind], ret: ReturnKind) -> Self {
        Self {
            trampoline: trampoline.into(),
            params: params.to_vec(),
            ret,
        }
    }
}

/// An application host function the module imports by name.
///
/// Bound as `wbg::<name>(args_ptr: i32, args_len: i32) -> i32` and forwarded
/// to the host global of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub name: String,
    /// Failures are stored for the module instead of aborting the call.
    pub fallible: bool,
}

impl ImportDecl {
    pub fn fallible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallible: true,
        }
    }

    pub fn infallible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallible: false,
        }
    }
}

/// Configuration for the module bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum linear memory pages (1 page = 64 KiB).
    /// Default: 1024 pages = 64 MiB.
    pub max_memory_pages: u32,

    /// Wasmtime fuel limit. `None` disables metering.
    pub fuel_limit: Option<u64>,

    /// Handle table sizing.
    pub heap: HeapConfig,

    /// Validate argument types before they are lowered into the module.
    pub debug_assertions: bool,

    /// Queue destructors for closures and resources dropped without
    /// explicit release. When off, explicit disposal is required.
    pub enable_finalizers: bool,

    /// Closure signatures, indexed by the adapter id the module passes.
    pub closure_adapters: Vec<ClosureAdapter>,

    /// Resource classes, indexed by the class id the module passes.
    pub resource_classes: Vec<ResourceClass>,

    /// Application imports forwarded to host globals.
    pub imports: Vec<ImportDecl>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: 1024, // 64 MiB
            fuel_limit: None,
            heap: HeapConfig::default(),
            debug_assertions: cfg!(debug_assertions),
            enable_finalizers: true,
            closure_adapters: Vec::new(),
            resource_classes: Vec::new(),
            imports: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn with_adapter(mut self, adapter: ClosureAdapter) -> Self {
        self.closure_adapters.push(adapter);
        self
    }

    pub fn with_resource_class(mut self, class: ResourceClass) -> Self {
        self.resource_classes.push(class);
        self
    }

    pub fn with_import(mut self, import: ImportDecl) -> Self {
        self.imports.push(import);
        self
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_pages as usize * WASM_PAGE_SIZE
    }
}
