//! Shared test helpers for integration tests.
//!
//! Provides a guest module written in WAT that follows the bridge ABI, the
//! bridge configuration matching it, and helpers for calling exports and
//! inspecting guest memory.

#![allow(dead_code)]

use std::rc::Rc;

use hostlink_bridge::{Bridge, BridgeConfig, BridgeError, ClosureAdapter, ImportDecl, ModuleSource};
use hostlink_hostapi::{ArgKind, Globals, HostValue, ResourceClass, ReturnKind};
use wasmtime::Val;

/// Guest module used by every integration test.
///
/// - bump allocator with memory growth; `realloc` copies, `free` records calls
/// - `__wbindgen_start` counts runs and primes the handle table
/// - function table slot 1 holds the closure destructor, which records `(a, b)`
/// - one trampoline per closure adapter (see the `*_ADAPTER` constants)
/// - thin exports forwarding to bridge imports, for module-initiated calls
pub const GUEST_WAT: &str = r#"
(module
  (import "wbg" "__wbindgen_init_externref_table" (func $init_table))
  (import "wbg" "__wbindgen_object_clone_ref" (func $clone_ref (param i32) (result i32)))
  (import "wbg" "__wbindgen_object_drop_ref" (func $drop_ref (param i32)))
  (import "wbg" "__wbindgen_drop_slice" (func $drop_slice (param i32 i32)))
  (import "wbg" "__wbindgen_string_new" (func $string_new (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_string_get" (func $string_get (param i32 i32)))
  (import "wbg" "__wbindgen_error_new" (func $error_new (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_number_new" (func $number_new (param f64) (result i32)))
  (import "wbg" "__wbindgen_number_get" (func $number_get (param i32 i32)))
  (import "wbg" "__wbindgen_bigint_from_u64" (func $bigint_from_u64 (param i64) (result i32)))
  (import "wbg" "__wbindgen_boolean_get" (func $boolean_get (param i32) (result i32)))
  (import "wbg" "__wbindgen_is_object" (func $is_object (param i32) (result i32)))
  (import "wbg" "__wbindgen_is_undefined" (func $is_undefined (param i32) (result i32)))
  (import "wbg" "__wbindgen_jsval_eq" (func $jsval_eq (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_debug_string" (func $debug_string (param i32 i32)))
  (import "wbg" "__wbindgen_throw" (func $throw (param i32 i32)))
  (import "wbg" "__wbindgen_closure_wrapper" (func $closure_wrapper (param i32 i32 i32 i32) (result i32)))
  (import "wbg" "__wbindgen_cb_drop" (func $cb_drop (param i32) (result i32)))
  (import "wbg" "__wbindgen_call" (func $call (param i32 i32 i32 i32) (result i32)))
  (import "wbg" "__wbindgen_resource_wrap" (func $resource_wrap (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_enum_string" (func $enum_string (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_enum_index" (func $enum_index (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_object_new" (func $object_new (result i32)))
  (import "wbg" "__wbindgen_global" (func $global (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_get" (func $get (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_set" (func $set (param i32 i32 i32)))
  (import "wbg" "fetch_data" (func $fetch_data (param i32 i32) (result i32)))
  (import "wbg" "log_event" (func $log_event (param i32 i32) (result i32)))

  (memory (export "memory") 1)
  (table (export "__indirect_function_table") 2 funcref)
  (elem (i32.const 1) $dtor)

  (data (i32.const 16) "closure failed")
  (data (i32.const 32) "module panicked")
  (data (i32.const 48) "\ff\fe")

  (global $heap_top (mut i32) (i32.const 1024))
  (global $exn (mut i32) (i32.const 0))
  (global $starts (mut i32) (i32.const 0))
  (global $reallocs (mut i32) (i32.const 0))
  (global $free_calls (mut i32) (i32.const 0))
  (global $last_free_ptr (mut i32) (i32.const 0))
  (global $last_free_size (mut i32) (i32.const 0))
  (global $dtor_calls (mut i32) (i32.const 0))
  (global $last_dtor_a (mut i32) (i32.const 0))
  (global $last_dtor_b (mut i32) (i32.const 0))
  (global $counter (mut i32) (i32.const 0))
  (global $last_env_a (mut i32) (i32.const 0))
  (global $last_cb_drop (mut i32) (i32.const -1))
  (global $second_cb_drop (mut i32) (i32.const -1))
  (global $resource_frees (mut i32) (i32.const 0))
  (global $last_resource_ptr (mut i32) (i32.const 0))
  (global $last_resource_flag (mut i32) (i32.const -1))

  ;; ── Allocator ──

  (func $malloc (export "__wbindgen_malloc") (param $size i32) (param $align i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local.set $ptr
      (i32.and
        (i32.add (global.get $heap_top) (i32.sub (local.get $align) (i32.const 1)))
        (i32.sub (i32.const 0) (local.get $align))))
    (local.set $end (i32.add (local.get $ptr) (local.get $size)))
    (block $done
      (loop $grow
        (br_if $done (i32.le_u (local.get $end) (i32.mul (memory.size) (i32.const 65536))))
        (if (i32.eq (memory.grow (i32.const 1)) (i32.const -1)) (then unreachable))
        (br $grow)))
    (global.set $heap_top (local.get $end))
    (local.get $ptr))

  (func (export "__wbindgen_realloc") (param $ptr i32) (param $old i32) (param $new i32) (param $align i32) (result i32)
    (local $dst i32)
    (global.set $reallocs (i32.add (global.get $reallocs) (i32.const 1)))
    (if (i32.le_u (local.get $new) (local.get $old)) (then (return (local.get $ptr))))
    (local.set $dst (call $malloc (local.get $new) (local.get $align)))
    (memory.copy (local.get $dst) (local.get $ptr) (local.get $old))
    (local.get $dst))

  (func (export "__wbindgen_free") (param $ptr i32) (param $size i32) (param $align i32)
    (global.set $free_calls (i32.add (global.get $free_calls) (i32.const 1)))
    (global.set $last_free_ptr (local.get $ptr))
    (global.set $last_free_size (local.get $size)))

  (func (export "__wbindgen_exn_store") (param $idx i32)
    (global.set $exn (local.get $idx)))

  (func (export "__wbindgen_start")
    (global.set $starts (i32.add (global.get $starts) (i32.const 1)))
    (call $init_table))

  ;; ── Closures ──

  (func $dtor (param $a i32) (param $b i32)
    (global.set $dtor_calls (i32.add (global.get $dtor_calls) (i32.const 1)))
    (global.set $last_dtor_a (local.get $a))
    (global.set $last_dtor_b (local.get $b)))

  (func (export "invoke_counter") (param $a i32) (param $b i32) (result f64)
    (global.set $last_env_a (local.get $a))
    (global.set $counter (i32.add (global.get $counter) (i32.const 1)))
    (f64.convert_i32_u (global.get $counter)))

  (func (export "invoke_double") (param $a i32) (param $b i32) (param $x f64) (result f64)
    (f64.mul (local.get $x) (f64.const 2)))

  (func (export "invoke_throw") (param $a i32) (param $b i32)
    (call $throw (i32.const 16) (i32.const 14)))

  (func (export "invoke_reenter") (param $a i32) (param $b i32) (param $self i32)
    (drop (call $call (local.get $self) (i32.const 1) (i32.const 0) (i32.const 0)))
    (call $drop_ref (local.get $self)))

  (func (export "invoke_drop_self") (param $a i32) (param $b i32) (param $self i32)
    (global.set $last_cb_drop (call $cb_drop (local.get $self))))

  (func (export "invoke_drop_twice") (param $a i32) (param $b i32) (param $self i32)
    (local $alias i32)
    (local.set $alias (call $clone_ref (local.get $self)))
    (global.set $last_cb_drop (call $cb_drop (local.get $self)))
    (global.set $second_cb_drop (call $cb_drop (local.get $alias))))

  (func (export "invoke_echo") (param $a i32) (param $b i32) (param $h i32) (result i32)
    (local.get $h))

  (func (export "make_closure") (param $a i32) (param $b i32) (param $adapter i32) (result i32)
    (call $closure_wrapper (local.get $a) (local.get $b) (i32.const 1) (local.get $adapter)))

  (func (export "drop_closure") (param $h i32) (result i32)
    (call $cb_drop (local.get $h)))

  (func (export "call_fn") (param $h i32) (param $args i32) (param $len i32) (result i32)
    (call $call (local.get $h) (i32.const 1) (local.get $args) (local.get $len)))

  ;; ── Resources ──

  (func (export "parser_free") (param $ptr i32) (param $from_finalizer i32)
    (global.set $resource_frees (i32.add (global.get $resource_frees) (i32.const 1)))
    (global.set $last_resource_ptr (local.get $ptr))
    (global.set $last_resource_flag (local.get $from_finalizer)))

  (func (export "new_resource") (param $class i32) (param $ptr i32) (result i32)
    (call $resource_wrap (local.get $class) (local.get $ptr)))

  ;; ── Forwarders ──

  (func (export "clone_ref") (param i32) (result i32) (call $clone_ref (local.get 0)))
  (func (export "drop_ref") (param i32) (call $drop_ref (local.get 0)))
  (func (export "drop_slice") (param i32 i32) (call $drop_slice (local.get 0) (local.get 1)))
  (func (export "make_string") (param i32 i32) (result i32) (call $string_new (local.get 0) (local.get 1)))
  (func (export "string_get") (param i32 i32) (call $string_get (local.get 0) (local.get 1)))
  (func (export "make_error") (param i32 i32) (result i32) (call $error_new (local.get 0) (local.get 1)))
  (func (export "number_new") (param f64) (result i32) (call $number_new (local.get 0)))
  (func (export "number_get") (param i32 i32) (call $number_get (local.get 0) (local.get 1)))
  (func (export "bigint_from_u64") (param i64) (result i32) (call $bigint_from_u64 (local.get 0)))
  (func (export "boolean_get") (param i32) (result i32) (call $boolean_get (local.get 0)))
  (func (export "is_object") (param i32) (result i32) (call $is_object (local.get 0)))
  (func (export "is_undefined") (param i32) (result i32) (call $is_undefined (local.get 0)))
  (func (export "jsval_eq") (param i32 i32) (result i32) (call $jsval_eq (local.get 0) (local.get 1)))
  (func (export "debug_string") (param i32 i32) (call $debug_string (local.get 0) (local.get 1)))
  (func (export "enum_string") (param i32 i32) (result i32) (call $enum_string (local.get 0) (local.get 1)))
  (func (export "enum_index") (param i32 i32) (result i32) (call $enum_index (local.get 0) (local.get 1)))
  (func (export "new_object") (result i32) (call $object_new))
  (func (export "lookup_global") (param i32 i32) (result i32) (call $global (local.get 0) (local.get 1)))
  (func (export "get_prop") (param i32 i32) (result i32) (call $get (local.get 0) (local.get 1)))
  (func (export "set_prop") (param i32 i32 i32) (call $set (local.get 0) (local.get 1) (local.get 2)))
  (func (export "do_fetch") (param i32 i32) (result i32) (call $fetch_data (local.get 0) (local.get 1)))
  (func (export "do_log") (param i32 i32) (result i32) (call $log_event (local.get 0) (local.get 1)))

  (func (export "throw_now") (call $throw (i32.const 32) (i32.const 15)))
  (func (export "spin") (loop $forever (br $forever)))
  (func (export "grow") (param i32) (result i32) (memory.grow (local.get 0)))

  ;; ── Counters ──

  (func (export "take_exception") (result i32)
    (local $e i32)
    (local.set $e (global.get $exn))
    (global.set $exn (i32.const 0))
    (local.get $e))
  (func (export "starts") (result i32) (global.get $starts))
  (func (export "reallocs") (result i32) (global.get $reallocs))
  (func (export "free_calls") (result i32) (global.get $free_calls))
  (func (export "last_free_ptr") (result i32) (global.get $last_free_ptr))
  (func (export "last_free_size") (result i32) (global.get $last_free_size))
  (func (export "dtor_calls") (result i32) (global.get $dtor_calls))
  (func (export "last_dtor_a") (result i32) (global.get $last_dtor_a))
  (func (export "last_dtor_b") (result i32) (global.get $last_dtor_b))
  (func (export "counter") (result i32) (global.get $counter))
  (func (export "last_env_a") (result i32) (global.get $last_env_a))
  (func (export "last_cb_drop") (result i32) (global.get $last_cb_drop))
  (func (export "second_cb_drop") (result i32) (global.get $second_cb_drop))
  (func (export "resource_frees") (result i32) (global.get $resource_frees))
  (func (export "last_resource_ptr") (result i32) (global.get $last_resource_ptr))
  (func (export "last_resource_flag") (result i32) (global.get $last_resource_flag))
)
"#;

// ── Closure Adapters ──

pub const COUNTER_ADAPTER: u32 = 0;
pub const DOUBLE_ADAPTER: u32 = 1;
pub const THROW_ADAPTER: u32 = 2;
pub const REENTER_ADAPTER: u32 = 3;
pub const DROP_SELF_ADAPTER: u32 = 4;
pub const ECHO_ADAPTER: u32 = 5;
pub const DROP_TWICE_ADAPTER: u32 = 6;

/// Offset of a deliberately malformed UTF-8 sequence in guest memory.
pub const INVALID_UTF8_PTR: u32 = 48;

pub const PARSER_CLASS: u32 = 0;

/// Bridge configuration matching [`GUEST_WAT`].
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        debug_assertions: true,
        ..BridgeConfig::default()
    }
    .with_adapter(ClosureAdapter::new("invoke_counter", &[], ReturnKind::Number))
    .with_adapter(ClosureAdapter::new("invoke_double", &[ArgKind::Number], ReturnKind::Number))
    .with_adapter(ClosureAdapter::new("invoke_throw", &[], ReturnKind::Void))
    .with_adapter(ClosureAdapter::new("invoke_reenter", &[ArgKind::Handle], ReturnKind::Void))
    .with_adapter(ClosureAdapter::new("invoke_drop_self", &[ArgKind::Handle], ReturnKind::Void))
    .with_adapter(ClosureAdapter::new("invoke_echo", &[ArgKind::Handle], ReturnKind::Handle))
    .with_adapter(ClosureAdapter::new("invoke_drop_twice", &[ArgKind::Handle], ReturnKind::Void))
    .with_resource_class(ResourceClass::new("Parser", "parser_free"))
    .with_import(ImportDecl::fallible("fetch_data"))
    .with_import(ImportDecl::infallible("log_event"))
}

// ── Bridge Factories ──

/// Create and initialize a bridge over the guest module.
pub fn init_bridge(config: BridgeConfig, env: Globals) -> Bridge {
    let mut bridge = Bridge::new(config, Rc::new(env)).expect("bridge creation should succeed");
    bridge
        .init(ModuleSource::Bytes(GUEST_WAT.into()))
        .expect("guest module should instantiate");
    bridge
}

/// Guest bridge with the default test configuration and no host globals.
pub fn guest_bridge() -> Bridge {
    init_bridge(test_config(), Globals::new())
}

// ── Export Calls ──

/// Call an export taking i32 params; returns its first i32 result (0 if none).
pub fn call_i32(bridge: &mut Bridge, name: &str, args: &[i32]) -> Result<i32, BridgeError> {
    let params: Vec<Val> = args.iter().map(|&a| Val::I32(a)).collect();
    let results = bridge.call_export(name, &params)?;
    Ok(results.first().and_then(Val::i32).unwrap_or(0))
}

/// Read one of the guest's counter exports.
pub fn guest_counter(bridge: &mut Bridge, name: &str) -> i32 {
    call_i32(bridge, name, &[]).expect("counter export should succeed")
}

/// Let the module wrap a closure and take the host side of it.
pub fn make_closure(bridge: &mut Bridge, a: u32, adapter: u32) -> HostValue {
    let handle = call_i32(bridge, "make_closure", &[a as i32, 7, adapter as i32])
        .expect("closure creation should succeed");
    bridge.take(handle as u32)
}

/// Pending exception stored by the last fallible import, if any.
pub fn take_exception(bridge: &mut Bridge) -> Option<HostValue> {
    match guest_counter(bridge, "take_exception") {
        0 => None,
        handle => Some(bridge.take(handle as u32)),
    }
}

/// Allocate an out slot in guest memory.
pub fn alloc_out(bridge: &mut Bridge, size: i32) -> u32 {
    call_i32(bridge, "__wbindgen_malloc", &[size, 8]).expect("malloc should succeed") as u32
}

// ── Guest Memory ──

/// Snapshot of guest linear memory.
pub fn memory(bridge: &mut Bridge) -> Vec<u8> {
    let instance = bridge.instance().expect("bridge should be initialized");
    let store = bridge.store_mut();
    let memory = instance
        .get_memory(&mut *store, "memory")
        .expect("guest exports memory");
    memory.data(&*store).to_vec()
}

pub fn read_u32(bridge: &mut Bridge, addr: u32) -> u32 {
    let mem = memory(bridge);
    let at = addr as usize;
    u32::from_le_bytes([mem[at], mem[at + 1], mem[at + 2], mem[at + 3]])
}

pub fn read_f64(bridge: &mut Bridge, addr: u32) -> f64 {
    let mem = memory(bridge);
    let at = addr as usize;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&mem[at..at + 8]);
    f64::from_le_bytes(bytes)
}

/// Read the `(ptr, len)` string written into an out slot.
pub fn read_string_out(bridge: &mut Bridge, out: u32) -> Option<String> {
    let ptr = read_u32(bridge, out);
    let len = read_u32(bridge, out + 4);
    if ptr == 0 {
        return None;
    }
    Some(bridge.read_string(ptr, len).expect("out slot holds valid text"))
}
