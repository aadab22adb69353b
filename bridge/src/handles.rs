//! Handle arrays in module memory.
//!
//! Arrays of handles are laid out as consecutive little-endian u32 slots,
//! allocated with 4-byte alignment.

use hostlink_hostapi::{Handle, HostValue};
use wasmtime::AsContextMut;

use crate::error::BridgeError;
use crate::host_impl::BridgeState;
use crate::memory::structured_view;

const HANDLE_SIZE: u32 = 4;

fn byte_len(count: u32) -> Result<u32, BridgeError> {
    count
        .checked_mul(HANDLE_SIZE)
        .ok_or(BridgeError::OutOfBounds {
            offset: 0,
            len: count as usize * HANDLE_SIZE as usize,
            size: u32::MAX as usize,
        })
}

/// Read `count` handles at `ptr`.
pub fn read_handles<T>(ctx: &mut T, ptr: u32, count: u32) -> Result<Vec<Handle>, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    structured_view(ctx)?.get_u32_array(ptr as usize, count as usize)
}

/// Read `count` handles at `ptr` and resolve them to values.
/// The handles stay owned by the module.
pub fn read_handle_args<T>(ctx: &mut T, ptr: u32, count: u32) -> Result<Vec<HostValue>, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let handles = read_handles(ctx, ptr, count)?;
    let store = ctx.as_context();
    let heap = &store.data().heap;
    Ok(handles.into_iter().map(|h| heap.get(h)).collect())
}

/// Release `count` handles stored at `ptr`, then free the buffer itself.
/// Returns how many handles were live.
pub fn release_range<T>(ctx: &mut T, ptr: u32, count: u32) -> Result<usize, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let handles = read_handles(ctx, ptr, count)?;
    let released = ctx.as_context_mut().data_mut().heap.release_all(&handles);
    let free = ctx.as_context().data().exports()?.free.clone();
    free.call(&mut *ctx, (ptr, byte_len(count)?, HANDLE_SIZE))
        .map_err(BridgeError::from_trap)?;
    tracing::trace!(ptr, count, released, "handle range released");
    Ok(released)
}

/// Allocate a handle per value and a module buffer holding them.
/// Returns `(ptr, len)`; the module owns both the buffer and the handles.
pub fn pass_array_handles<T>(ctx: &mut T, values: &[HostValue]) -> Result<(u32, u32), BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let count = u32::try_from(values.len()).map_err(|_| BridgeError::OutOfBounds {
        offset: 0,
        len: values.len(),
        size: u32::MAX as usize,
    })?;
    let malloc = ctx.as_context().data().exports()?.malloc.clone();
    let ptr = malloc
        .call(&mut *ctx, (byte_len(count)?, HANDLE_SIZE))
        .map_err(BridgeError::from_trap)?;

    let mut handles = Vec::with_capacity(values.len());
    {
        let mut store = ctx.as_context_mut();
        let heap = &mut store.data_mut().heap;
        for value in values {
            handles.push(heap.alloc(value.clone())?);
        }
    }
    structured_view(ctx)?.set_u32_array(ptr as usize, &handles)?;
    Ok((ptr, count))
}

/// Take ownership of a module-returned handle array: read the values, then
/// release every handle and free the buffer.
pub fn take_array_handles<T>(ctx: &mut T, ptr: u32, count: u32) -> Result<Vec<HostValue>, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let values = read_handle_args(ctx, ptr, count)?;
    release_range(ctx, ptr, count)?;
    Ok(values)
}
