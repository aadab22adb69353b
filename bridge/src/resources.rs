//! Opaque resource disposal and best-effort finalization.

use hostlink_hostapi::{Finalizer, ResourceToken};
use wasmtime::AsContextMut;

use crate::closures;
use crate::error::BridgeError;
use crate::host_impl::BridgeState;

/// Explicitly dispose of a resource. Idempotent: returns `false` (and does
/// nothing) if the token was already disposed.
pub fn dispose<T>(ctx: &mut T, token: &ResourceToken) -> Result<bool, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let Some(ptr) = token.destroy_into_raw() else {
        return Ok(false);
    };
    free_resource(ctx, token.class(), ptr, false)?;
    Ok(true)
}

/// Call the class free routine as `free_export(ptr, from_finalizer)`.
pub fn free_resource<T>(ctx: &mut T, class: u32, ptr: u32, from_finalizer: bool) -> Result<(), BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let (instance, export) = {
        let store = ctx.as_context();
        let state = store.data();
        (state.exports()?.instance, state.resource_class(class)?.free_export.clone())
    };
    let free = instance
        .get_typed_func::<(u32, u32), ()>(&mut *ctx, &export)
        .map_err(|_| BridgeError::MissingExport(export.clone()))?;
    tracing::debug!(class, ptr, from_finalizer, "freeing module resource");
    free.call(&mut *ctx, (ptr, from_finalizer as u32))
        .map_err(BridgeError::from_trap)
}

/// Drain the finalization queue and run every pending destructor.
///
/// Best effort: a failing finalizer is logged and the rest still run.
/// Returns how many finalizers were drained.
pub fn run_finalizers<T>(ctx: &mut T) -> usize
where
    T: AsContextMut<Data = BridgeState>,
{
    let pending = ctx.as_context().data().finalizers.drain();
    let count = pending.len();
    for finalizer in pending {
        let outcome = match finalizer {
            Finalizer::Closure(dtor) => closures::run_destructor(ctx, dtor),
            Finalizer::Resource { class, ptr } => free_resource(ctx, class, ptr, true),
        };
        if let Err(err) = outcome {
            tracing::warn!(?finalizer, error = %err, "finalizer failed");
        }
    }
    if count > 0 {
        tracing::debug!(count, "finalizers run");
    }
    count
}
