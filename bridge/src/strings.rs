//! String codec between host text and UTF-8 bytes in module memory.
//!
//! Host → module uses the allocate-then-shrink protocol:
//!
//! 1. allocate one byte per character and copy the leading ASCII run
//! 2. if non-ASCII text remains, grow the buffer to fit the worst-case
//!    encoding of the remainder (4 bytes per character) and encode into it
//! 3. shrink the buffer to the exact byte length written
//!
//! Without a `__wbindgen_realloc` export the whole string is encoded up
//! front and allocated once. Module → host decoding is strict: malformed
//! UTF-8 is a fatal error, never replaced.

use wasmtime::AsContextMut;

use crate::error::BridgeError;
use crate::host_impl::BridgeState;
use crate::memory::{byte_view, check_range, structured_view};

/// Worst-case UTF-8 bytes per character.
pub const MAX_UTF8_LEN: usize = 4;

/// Byte alignment requested for string buffers.
const STRING_ALIGN: u32 = 1;

/// Length of the leading run of single-byte characters.
pub fn ascii_prefix_len(text: &str) -> usize {
    text.bytes().take_while(u8::is_ascii).count()
}

/// Encode `text` into `dst`. Returns the number of bytes written.
///
/// Fails if `dst` cannot hold the whole encoding.
pub fn encode_into(dst: &mut [u8], text: &str) -> Result<usize, BridgeError> {
    let encoded = text.as_bytes();
    if encoded.len() > dst.len() {
        return Err(BridgeError::EncodeOverflow {
            needed: encoded.len(),
            reserved: dst.len(),
        });
    }
    dst[..encoded.len()].copy_from_slice(encoded);
    Ok(encoded.len())
}

/// Strict UTF-8 decode.
pub fn decode_utf8(bytes: &[u8]) -> Result<&str, BridgeError> {
    Ok(std::str::from_utf8(bytes)?)
}

fn to_u32(len: usize) -> Result<u32, BridgeError> {
    u32::try_from(len).map_err(|_| BridgeError::EncodeOverflow {
        needed: len,
        reserved: u32::MAX as usize,
    })
}

/// Copy `text` into freshly allocated module memory.
///
/// Returns `(ptr, len)` with `len` the exact UTF-8 byte length. Ownership of
/// the buffer passes to the module.
pub fn pass_string<T>(ctx: &mut T, text: &str) -> Result<(u32, u32), BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let exports = ctx.as_context().data().exports()?.clone();

    let Some(realloc) = exports.realloc else {
        let len = to_u32(text.len())?;
        let ptr = exports
            .malloc
            .call(&mut *ctx, (len, STRING_ALIGN))
            .map_err(BridgeError::from_trap)?;
        let bytes = byte_view(ctx)?;
        let range = check_range(bytes.len(), ptr as usize, text.len())?;
        bytes[range].copy_from_slice(text.as_bytes());
        return Ok((ptr, len));
    };

    let mut len = to_u32(text.chars().count())?;
    let mut ptr = exports
        .malloc
        .call(&mut *ctx, (len, STRING_ALIGN))
        .map_err(BridgeError::from_trap)?;

    let mut offset = ascii_prefix_len(text);
    {
        let bytes = byte_view(ctx)?;
        let range = check_range(bytes.len(), ptr as usize, offset)?;
        bytes[range].copy_from_slice(&text.as_bytes()[..offset]);
    }

    if offset != text.len() {
        let rest = &text[offset..];
        let capacity = offset + rest.chars().count() * MAX_UTF8_LEN;
        ptr = realloc
            .call(&mut *ctx, (ptr, len, to_u32(capacity)?, STRING_ALIGN))
            .map_err(BridgeError::from_trap)?;
        len = to_u32(capacity)?;

        // Memory may have grown during realloc; take a fresh view.
        let bytes = byte_view(ctx)?;
        let range = check_range(bytes.len(), ptr as usize + offset, capacity - offset)?;
        offset += encode_into(&mut bytes[range], rest)?;

        ptr = realloc
            .call(&mut *ctx, (ptr, len, to_u32(offset)?, STRING_ALIGN))
            .map_err(BridgeError::from_trap)?;
    }

    tracing::trace!(ptr, len = offset, "string passed to module");
    Ok((ptr, to_u32(offset)?))
}

/// Decode `len` bytes at `ptr` as UTF-8.
pub fn get_string<T>(ctx: &mut T, ptr: u32, len: u32) -> Result<String, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let bytes = byte_view(ctx)?;
    let range = check_range(bytes.len(), ptr as usize, len as usize)?;
    Ok(decode_utf8(&bytes[range])?.to_owned())
}

/// Write an optional string into the 8-byte out slot at `out`:
/// `(ptr, len)` of a freshly passed copy, or `(0, 0)` when absent.
pub fn write_string_out<T>(ctx: &mut T, out: u32, text: Option<&str>) -> Result<(), BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let (ptr, len) = match text {
        Some(text) => pass_string(ctx, text)?,
        None => (0, 0),
    };
    let mut view = structured_view(ctx)?;
    view.set_u32(out as usize, ptr)?;
    view.set_u32(out as usize + 4, len)?;
    Ok(())
}
