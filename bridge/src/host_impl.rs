//! Mutable bridge state held in the Wasmtime Store.
//!
//! `BridgeState` combines the handle table, the memory view cache, the
//! finalization queue, the host environment and the resolved module exports
//! into the single struct that lives inside `Store<BridgeState>` for the
//! lifetime of a `Bridge`.

use std::rc::Rc;

use hostlink_hostapi::{
    ClosureCell, FinalizationQueue, Handle, HandleTable, HostEnvironment, HostFunction,
    HostValue, ResourceClass, ResourceToken,
};
use wasmtime::{AsContextMut, Instance, Memory, StoreLimits, StoreLimitsBuilder, Table, TypedFunc};

use crate::config::{BridgeConfig, ClosureAdapter};
use crate::error::BridgeError;
use crate::memory::ViewCache;

pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_MALLOC: &str = "__wbindgen_malloc";
pub const EXPORT_REALLOC: &str = "__wbindgen_realloc";
pub const EXPORT_FREE: &str = "__wbindgen_free";
pub const EXPORT_EXN_STORE: &str = "__wbindgen_exn_store";
pub const EXPORT_START: &str = "__wbindgen_start";
pub const EXPORT_FUNCTION_TABLE: &str = "__indirect_function_table";

/// Module exports the bridge calls back into, resolved once after
/// instantiation.
#[derive(Clone)]
pub struct ModuleExports {
    pub instance: Instance,
    pub memory: Memory,
    /// `(size, align) -> ptr`
    pub malloc: TypedFunc<(u32, u32), u32>,
    /// `(ptr, old_size, new_size, align) -> ptr`
    pub realloc: Option<TypedFunc<(u32, u32, u32, u32), u32>>,
    /// `(ptr, size, align)`
    pub free: TypedFunc<(u32, u32, u32), ()>,
    /// `(handle)`: record a host exception for the module to pick up.
    pub exn_store: TypedFunc<u32, ()>,
    pub start: Option<TypedFunc<(), ()>>,
    pub table: Option<Table>,
}

impl ModuleExports {
    pub fn resolve(mut store: impl AsContextMut, instance: Instance) -> Result<Self, BridgeError> {
        let mut store = store.as_context_mut();
        let missing = |name: &str| BridgeError::MissingExport(name.to_owned());

        let memory = instance
            .get_memory(&mut store, EXPORT_MEMORY)
            .ok_or_else(|| missing(EXPORT_MEMORY))?;
        let malloc = instance.get_typed_func(&mut store, EXPORT_MALLOC)?;
        let free = instance.get_typed_func(&mut store, EXPORT_FREE)?;
        let exn_store = instance.get_typed_func(&mut store, EXPORT_EXN_STORE)?;

        let realloc = match instance.get_func(&mut store, EXPORT_REALLOC) {
            Some(func) => Some(func.typed(&store)?),
            None => None,
        };
        let start = match instance.get_func(&mut store, EXPORT_START) {
            Some(func) => Some(func.typed(&store)?),
            None => None,
        };
        let table = instance.get_table(&mut store, EXPORT_FUNCTION_TABLE);

        Ok(Self {
            instance,
            memory,
            malloc,
            realloc,
            free,
            exn_store,
            start,
            table,
        })
    }
}

/// Mutable state held in the Wasmtime `Store`.
pub struct BridgeState {
    /// Host values the module refers to by handle.
    pub heap: HandleTable,
    /// Identity of the last materialised memory views.
    pub views: ViewCache,
    /// Pending destructors of unreachable closures and resources.
    pub finalizers: FinalizationQueue,
    /// Memory growth limits enforced by the store limiter.
    pub limits: StoreLimits,
    env: Rc<dyn HostEnvironment>,
    adapters: Vec<ClosureAdapter>,
    classes: Vec<ResourceClass>,
    debug_assertions: bool,
    exports: Option<ModuleExports>,
}

impl BridgeState {
    pub fn new(config: &BridgeConfig, env: Rc<dyn HostEnvironment>) -> Self {
        let finalizers = if config.enable_finalizers {
            FinalizationQueue::new()
        } else {
            FinalizationQueue::disabled()
        };
        Self {
            heap: HandleTable::new(&config.heap),
            views: ViewCache::new(),
            finalizers,
            limits: StoreLimitsBuilder::new()
                .memory_size(config.max_memory_bytes())
                .build(),
            env,
            adapters: config.closure_adapters.clone(),
            classes: config.resource_classes.clone(),
            debug_assertions: config.debug_assertions,
            exports: None,
        }
    }

    /// Resolved exports; fails until instantiation has completed.
    pub fn exports(&self) -> Result<&ModuleExports, BridgeError> {
        self.exports.as_ref().ok_or(BridgeError::NotInitialized)
    }

    pub(crate) fn set_exports(&mut self, exports: ModuleExports) {
        self.exports = Some(exports);
    }

    pub fn debug_assertions(&self) -> bool {
        self.debug_assertions
    }

    /// Host global `name`, or a stub that fails when called if the
    /// environment does not provide it.
    pub fn global(&self, name: &str) -> HostValue {
        self.env.global(name).unwrap_or_else(|| {
            tracing::debug!(name, "host capability missing; binding not-defined stub");
            HostFunction::not_defined(name).into()
        })
    }

    pub fn adapter(&self, index: u32) -> Result<&ClosureAdapter, BridgeError> {
        self.adapters
            .get(index as usize)
            .ok_or(BridgeError::UnknownAdapter(index))
    }

    pub fn resource_class(&self, index: u32) -> Result<&ResourceClass, BridgeError> {
        self.classes
            .get(index as usize)
            .ok_or(BridgeError::UnknownResourceClass(index))
    }

    /// Wrap a module closure `(a, b)` as a host function and hand out a handle.
    pub fn wrap_closure(&mut self, a: u32, b: u32, dtor: u32, adapter: u32) -> Result<Handle, BridgeError> {
        self.adapter(adapter)?;
        if a == 0 {
            return Err(BridgeError::HostDefect {
                import: "__wbindgen_closure_wrapper".into(),
                message: "closure environment pointer is null".into(),
            });
        }
        let cell = ClosureCell::new(a, b, dtor, adapter, self.finalizers.register());
        let function = HostFunction::Closure(Rc::new(cell));
        tracing::trace!(a, b, dtor, adapter, "module closure wrapped");
        Ok(self.heap.alloc(function.into())?)
    }

    /// Wrap a module-owned pointer as an opaque resource token.
    pub fn wrap_resource(&mut self, class: u32, ptr: u32) -> Result<Handle, BridgeError> {
        let name = self.resource_class(class)?.name.clone();
        let token = ResourceToken::wrap(class, name, ptr, self.finalizers.register());
        Ok(self.heap.alloc(token.into())?)
    }
}
