//! Closure invocation and destruction.
//!
//! A host call to a module closure runs the refcount protocol of
//! [`ClosureCell`] around a dispatch to the adapter's trampoline export:
//!
//! 1. debug mode: assert argument types (before any state changes)
//! 2. `enter`: refuse dropped or already-running closures, snapshot `a`
//! 3. lower arguments and call the trampoline with `(a, b, args...)`
//! 4. `exit`, success or failure alike; run the destructor if it is owed
//!
//! Destructors are looked up in the module's exported function table.

use std::rc::Rc;

use hostlink_hostapi::{
    assert, ArgKind, ClosureCell, Destructor, HostError, HostFunction, HostValue, ReturnKind,
};
use wasmtime::{AsContextMut, Func, Ref, Val};

use crate::boundary;
use crate::config::ClosureAdapter;
use crate::error::BridgeError;
use crate::host_impl::{BridgeState, EXPORT_FUNCTION_TABLE};

/// Invoke a module closure with host arguments.
pub fn invoke<T>(ctx: &mut T, cell: &Rc<ClosureCell>, args: &[HostValue]) -> Result<HostValue, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let (adapter, debug) = {
        let store = ctx.as_context();
        let state = store.data();
        (state.adapter(cell.adapter())?.clone(), state.debug_assertions())
    };
    if debug {
        check_args(&adapter.params, args)?;
    }

    let (a, b) = cell.enter()?;
    let outcome = dispatch(ctx, &adapter, a, b, args);
    match cell.exit(a) {
        Some(dtor) => {
            let destroyed = run_destructor(ctx, dtor);
            outcome.and_then(|value| destroyed.map(|()| value))
        }
        None => outcome,
    }
}

/// Call any function value. The outer error is fatal; the inner one is a
/// host-level failure a fallible import may store for the module.
pub fn call_function<T>(
    ctx: &mut T,
    callee: &HostValue,
    this: &HostValue,
    args: &[HostValue],
) -> Result<Result<HostValue, HostError>, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    match callee {
        HostValue::Function(HostFunction::Native(native)) => Ok(native.call(this, args)),
        HostValue::Function(HostFunction::Closure(cell)) => match invoke(ctx, cell, args) {
            Ok(value) => Ok(Ok(value)),
            Err(err) => boundary::catchable(err).map(Err),
        },
        other => Ok(Err(HostError::NotCallable(other.debug_string()))),
    }
}

/// Drop the host reference to a closure. Returns `true` if this finalized
/// it (the destructor has run).
pub fn drop_closure<T>(ctx: &mut T, cell: &ClosureCell) -> Result<bool, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    match cell.release() {
        Some(dtor) => {
            run_destructor(ctx, dtor)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Call the module destructor for a closure environment.
pub fn run_destructor<T>(ctx: &mut T, dtor: Destructor) -> Result<(), BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let func = table_func(ctx, dtor.index)?;
    tracing::debug!(index = dtor.index, a = dtor.a, b = dtor.b, "running closure destructor");
    func.call(
        &mut *ctx,
        &[Val::I32(dtor.a as i32), Val::I32(dtor.b as i32)],
        &mut [],
    )
    .map_err(BridgeError::from_trap)
}

fn table_func<T>(ctx: &mut T, index: u32) -> Result<Func, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let table = ctx
        .as_context()
        .data()
        .exports()?
        .table
        .ok_or_else(|| BridgeError::MissingExport(EXPORT_FUNCTION_TABLE.into()))?;
    match table.get(&mut *ctx, index.into()) {
        Some(Ref::Func(Some(func))) => Ok(func),
        _ => Err(BridgeError::BadTableIndex(index)),
    }
}

fn check_args(params: &[ArgKind], args: &[HostValue]) -> Result<(), HostError> {
    for (i, kind) in params.iter().enumerate() {
        let arg = args.get(i).cloned().unwrap_or_default();
        match kind {
            ArgKind::Handle => {}
            ArgKind::Number => {
                assert::assert_number(&arg)?;
            }
            ArgKind::Bool => {
                assert::assert_boolean(&arg)?;
            }
            ArgKind::BigInt => {
                assert::assert_bigint(&arg)?;
            }
        }
    }
    Ok(())
}

fn dispatch<T>(
    ctx: &mut T,
    adapter: &ClosureAdapter,
    a: u32,
    b: u32,
    args: &[HostValue],
) -> Result<HostValue, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let mut params = Vec::with_capacity(adapter.params.len() + 2);
    params.push(Val::I32(a as i32));
    params.push(Val::I32(b as i32));
    for (i, kind) in adapter.params.iter().enumerate() {
        let arg = args.get(i).cloned().unwrap_or_default();
        params.push(lower(ctx, *kind, arg)?);
    }

    let instance = ctx.as_context().data().exports()?.instance;
    let func = instance
        .get_func(&mut *ctx, &adapter.trampoline)
        .ok_or_else(|| BridgeError::MissingExport(adapter.trampoline.clone()))?;
    let mut results = vec![Val::I32(0); func.ty(&*ctx).results().len()];
    func.call(&mut *ctx, &params, &mut results)
        .map_err(BridgeError::from_trap)?;
    lift(ctx, adapter.ret, results.first())
}

/// Host value to trampoline argument. Handles passed this way are owned by
/// the module.
fn lower<T>(ctx: &mut T, kind: ArgKind, value: HostValue) -> Result<Val, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    Ok(match kind {
        ArgKind::Handle => {
            let handle = ctx.as_context_mut().data_mut().heap.intern(value)?;
            Val::I32(handle as i32)
        }
        ArgKind::Number => Val::F64(to_number(&value).to_bits()),
        ArgKind::Bool => Val::I32(truthy(&value) as i32),
        ArgKind::BigInt => Val::I64(match value {
            HostValue::BigInt(n) => n as i64,
            other => to_number(&other) as i64,
        }),
    })
}

fn lift<T>(ctx: &mut T, kind: ReturnKind, result: Option<&Val>) -> Result<HostValue, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let mismatch = || BridgeError::GuestTrapped(format!("trampoline result does not match {:?}", kind));
    Ok(match kind {
        ReturnKind::Void => HostValue::Undefined,
        ReturnKind::Handle => {
            let handle = result.and_then(Val::i32).ok_or_else(mismatch)?;
            ctx.as_context_mut().data_mut().heap.take(handle as u32)
        }
        ReturnKind::Number => HostValue::Number(result.and_then(Val::f64).ok_or_else(mismatch)?),
        ReturnKind::Bool => HostValue::Bool(result.and_then(Val::i32).ok_or_else(mismatch)? != 0),
    })
}

/// Loose numeric coercion used when debug assertions are off.
fn to_number(value: &HostValue) -> f64 {
    match value {
        HostValue::Number(n) => *n,
        HostValue::Bool(b) => *b as u8 as f64,
        HostValue::Null => 0.0,
        HostValue::BigInt(n) => *n as f64,
        HostValue::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn truthy(value: &HostValue) -> bool {
    match value {
        HostValue::Undefined | HostValue::Null => false,
        HostValue::Bool(b) => *b,
        HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
        HostValue::BigInt(n) => *n != 0,
        HostValue::String(s) => !s.is_empty(),
        _ => true,
    }
}
