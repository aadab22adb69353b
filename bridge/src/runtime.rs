//! Bridge runtime: engine, instantiation sequencing, and host entry points.
//!
//! The `Bridge` struct is the main entry point. It owns the Wasmtime store
//! holding [`BridgeState`], instantiates the module exactly once, and
//! exposes the host-initiated operations (string passing, handle traffic,
//! closure calls, resource disposal, export calls).
//!
//! Instantiation states:
//!
//! ```text
//! Uninitialized -> Instantiating -> Ready
//!                              \-> Failed (terminal)
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::rc::Rc;

use hostlink_hostapi::{Handle, HostEnvironment, HostFunction, HostValue, ResourceToken};
use wasmtime::{Config, Engine, Instance, Linker, Module, Store, Val};

use crate::config::{BridgeConfig, ImportDecl};
use crate::error::BridgeError;
use crate::host_impl::{BridgeState, ModuleExports};
use crate::linker::register_bridge_functions;
use crate::validation::validate_module;
use crate::{closures, handles, resources, strings};

/// Content type that selects the strict streaming compile path.
pub const WASM_MIME_TYPE: &str = "application/wasm";

/// Where the module comes from.
pub enum ModuleSource {
    /// Raw module bytes (binary or text format).
    Bytes(Vec<u8>),
    File(PathBuf),
    /// An already compiled module. Must belong to the bridge's engine.
    Compiled(Module),
    /// A fetched response: body plus the content type it was served with.
    Response(WasmResponse),
}

pub struct WasmResponse {
    pub content_type: Option<String>,
    pub body: Box<dyn Read>,
}

impl WasmResponse {
    pub fn new(content_type: Option<&str>, body: impl Read + 'static) -> Self {
        Self {
            content_type: content_type.map(str::to_owned),
            body: Box::new(body),
        }
    }

    /// Whether the response was served as `application/wasm`
    /// (parameters such as `; charset=` are ignored).
    pub fn is_wasm(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(WASM_MIME_TYPE))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Instantiating,
    Ready,
    /// Terminal; carries the first failure message.
    Failed(String),
}

/// The host side of a module bridge.
pub struct Bridge {
    engine: Engine,
    store: Store<BridgeState>,
    imports: Vec<ImportDecl>,
    instance: Option<Instance>,
    init_state: InitState,
}

impl Bridge {
    /// Create an uninitialized bridge over `env`.
    pub fn new(config: BridgeConfig, env: Rc<dyn HostEnvironment>) -> Result<Self, BridgeError> {
        let engine = create_engine(&config)?;
        let mut store = Store::new(&engine, BridgeState::new(&config, env));
        store.limiter(|state| &mut state.limits);
        if let Some(fuel) = config.fuel_limit {
            store.set_fuel(fuel)?;
        }
        Ok(Self {
            engine,
            store,
            imports: config.imports,
            instance: None,
            init_state: InitState::Uninitialized,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn init_state(&self) -> &InitState {
        &self.init_state
    }

    /// Instantiate the module. Idempotent once `Ready`.
    ///
    /// On success the memory views are reset, the reserved handles primed
    /// and `__wbindgen_start` (if exported) run exactly once.
    pub fn init(&mut self, source: ModuleSource) -> Result<Instance, BridgeError> {
        match &self.init_state {
            InitState::Ready => return self.instance.ok_or(BridgeError::NotInitialized),
            InitState::Instantiating => return Err(BridgeError::Instantiating),
            InitState::Failed(message) => return Err(BridgeError::InitFailed(message.clone())),
            InitState::Uninitialized => {}
        }

        self.init_state = InitState::Instantiating;
        match self.instantiate(source) {
            Ok(instance) => {
                self.instance = Some(instance);
                self.init_state = InitState::Ready;
                tracing::debug!("module bridge ready");
                Ok(instance)
            }
            Err(err) => {
                tracing::error!(error = %err, "module instantiation failed");
                self.init_state = InitState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn instantiate(&mut self, source: ModuleSource) -> Result<Instance, BridgeError> {
        // 1. Bind the fixed import surface
        let mut linker = Linker::new(&self.engine);
        register_bridge_functions(&mut linker, &self.imports)?;

        // 2. Compile and validate
        let module = load_module(&self.engine, source)?;
        validate_module(&module)?;

        // 3. Instantiate and resolve the exports the bridge calls back into
        let instance = linker.instantiate(&mut self.store, &module)?;
        let exports = ModuleExports::resolve(&mut self.store, instance)?;
        let start = exports.start.clone();

        // 4. Finalize: drop stale views, prime the reserved handles
        let state = self.store.data_mut();
        state.set_exports(exports);
        state.views.clear();
        state.heap.prime();

        // 5. Run the module's start routine
        if let Some(start) = start {
            tracing::debug!("running module start routine");
            start
                .call(&mut self.store, ())
                .map_err(BridgeError::from_trap)?;
        }
        Ok(instance)
    }

    pub fn instance(&self) -> Option<Instance> {
        self.instance
    }

    pub fn state(&self) -> &BridgeState {
        self.store.data()
    }

    pub fn store_mut(&mut self) -> &mut Store<BridgeState> {
        &mut self.store
    }

    fn ready(&self) -> Result<(), BridgeError> {
        match &self.init_state {
            InitState::Ready => Ok(()),
            InitState::Failed(message) => Err(BridgeError::InitFailed(message.clone())),
            _ => Err(BridgeError::NotInitialized),
        }
    }

    // ── Strings ──

    /// Copy `text` into module memory; the module owns the buffer.
    pub fn write_string(&mut self, text: &str) -> Result<(u32, u32), BridgeError> {
        self.ready()?;
        strings::pass_string(&mut self.store, text)
    }

    pub fn read_string(&mut self, ptr: u32, len: u32) -> Result<String, BridgeError> {
        self.ready()?;
        strings::get_string(&mut self.store, ptr, len)
    }

    // ── Handles ──

    pub fn alloc(&mut self, value: HostValue) -> Result<Handle, BridgeError> {
        Ok(self.store.data_mut().heap.alloc(value)?)
    }

    pub fn get(&self, handle: Handle) -> HostValue {
        self.store.data().heap.get(handle)
    }

    /// Take ownership of a module-returned handle.
    pub fn take(&mut self, handle: Handle) -> HostValue {
        self.store.data_mut().heap.take(handle)
    }

    pub fn release(&mut self, handle: Handle) -> bool {
        self.store.data_mut().heap.release(handle)
    }

    pub fn pass_array(&mut self, values: &[HostValue]) -> Result<(u32, u32), BridgeError> {
        self.ready()?;
        handles::pass_array_handles(&mut self.store, values)
    }

    pub fn take_array(&mut self, ptr: u32, len: u32) -> Result<Vec<HostValue>, BridgeError> {
        self.ready()?;
        handles::take_array_handles(&mut self.store, ptr, len)
    }

    // ── Calls ──

    /// Call a function value (a module closure or a host function).
    pub fn call(&mut self, callee: &HostValue, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        self.ready()?;
        self.run_finalizers();
        match callee {
            HostValue::Function(HostFunction::Closure(cell)) => closures::invoke(&mut self.store, cell, args),
            other => {
                let outcome = closures::call_function(&mut self.store, other, &HostValue::Undefined, args)?;
                Ok(outcome?)
            }
        }
    }

    /// Release the host's reference to a module closure. Returns `true` if
    /// the closure was finalized.
    pub fn drop_closure(&mut self, callee: &HostValue) -> Result<bool, BridgeError> {
        self.ready()?;
        match callee.as_function().and_then(HostFunction::as_closure) {
            Some(cell) => closures::drop_closure(&mut self.store, cell),
            None => Err(BridgeError::Host(format!(
                "{} is not a module closure",
                callee.debug_string()
            ))),
        }
    }

    /// Explicitly dispose of a resource. Returns `false` if already disposed.
    pub fn dispose(&mut self, token: &ResourceToken) -> Result<bool, BridgeError> {
        self.ready()?;
        self.run_finalizers();
        resources::dispose(&mut self.store, token)
    }

    /// Run pending finalizers now. Returns how many were drained.
    pub fn run_finalizers(&mut self) -> usize {
        if self.ready().is_err() {
            return 0;
        }
        resources::run_finalizers(&mut self.store)
    }

    /// Call a module export by name.
    pub fn call_export(&mut self, name: &str, params: &[Val]) -> Result<Vec<Val>, BridgeError> {
        self.ready()?;
        self.run_finalizers();
        let instance = self.instance.ok_or(BridgeError::NotInitialized)?;
        let func = instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| BridgeError::MissingExport(name.to_owned()))?;
        let mut results = vec![Val::I32(0); func.ty(&self.store).results().len()];
        func.call(&mut self.store, params, &mut results)
            .map_err(BridgeError::from_trap)?;
        Ok(results)
    }

    /// Number of memory view rebuilds so far.
    pub fn views_rebuilt(&self) -> u64 {
        self.store.data().views.rebuilds()
    }
}

/// Create a Wasmtime engine for the bridge.
pub fn create_engine(config: &BridgeConfig) -> Result<Engine, BridgeError> {
    let mut wasm_config = Config::new();

    // Fuel metering: only when a limit is configured
    wasm_config.consume_fuel(config.fuel_limit.is_some());

    // One linear memory, one thread
    wasm_config.wasm_threads(false);
    wasm_config.wasm_multi_memory(false);

    Ok(Engine::new(&wasm_config)?)
}

fn load_module(engine: &Engine, source: ModuleSource) -> Result<Module, BridgeError> {
    match source {
        ModuleSource::Bytes(bytes) => Ok(Module::new(engine, &bytes)?),
        ModuleSource::File(path) => Ok(Module::from_file(engine, &path)?),
        ModuleSource::Compiled(module) => {
            if !Engine::same(module.engine(), engine) {
                return Err(BridgeError::ValidationError(
                    "module was compiled for a different engine".into(),
                ));
            }
            Ok(module)
        }
        ModuleSource::Response(mut response) => {
            let mut bytes = Vec::new();
            response.body.read_to_end(&mut bytes)?;
            if response.is_wasm() {
                return Ok(Module::from_binary(engine, &bytes)?);
            }
            tracing::warn!(
                content_type = ?response.content_type,
                "module response is not served as `application/wasm`; falling back to raw byte compilation"
            );
            Ok(Module::new(engine, &bytes)?)
        }
    }
}
