//! Cached views over module linear memory, with bounds checking.
//!
//! Linear memory can grow during any call into the module. Growth may move
//! the buffer or change its length, so a view taken before the call is stale
//! afterwards. No slice is ever stored: every accessor re-derives it from the
//! store for the duration of one borrow.
//!
//! [`ViewCache`] holds no view either. It only records the identity (base
//! address and length) of the last byte and structured view, and from that
//! decides whether the current access counts as a rebuild: the identity
//! changed, or the buffer reads as detached (zero length).
//!
//! Out-of-bounds access is a fatal boundary violation and surfaces as
//! [`BridgeError::OutOfBounds`].

use std::ops::Range;

use wasmtime::AsContextMut;

use crate::error::BridgeError;
use crate::host_impl::BridgeState;

/// Buffer identity of a materialised view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewKey {
    base: usize,
    len: usize,
}

impl ViewKey {
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            base: bytes.as_ptr() as usize,
            len: bytes.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A zero-length buffer is treated as detached and always rebuilt.
    pub fn is_detached(&self) -> bool {
        self.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Byte-level view (strings, raw copies).
    Bytes,
    /// Little-endian structured view (i32/u32/f64 fields, handle arrays).
    Structured,
}

/// Bookkeeping for view rebuilds.
///
/// Stores the [`ViewKey`] of the last byte and structured views, never the
/// views themselves. [`refresh`](Self::refresh) compares the current buffer
/// against that identity to decide whether a rebuild happened.
#[derive(Debug, Default)]
pub struct ViewCache {
    bytes: Option<ViewKey>,
    structured: Option<ViewKey>,
    rebuilds: u64,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a view of `kind` is about to be used over `current`.
    ///
    /// Returns `true` if the cached view was stale and had to be rebuilt.
    pub fn refresh(&mut self, kind: ViewKind, current: ViewKey) -> bool {
        let slot = match kind {
            ViewKind::Bytes => &mut self.bytes,
            ViewKind::Structured => &mut self.structured,
        };
        if *slot == Some(current) && !current.is_detached() {
            return false;
        }
        tracing::trace!(?kind, base = current.base, len = current.len, "rebuilding memory view");
        *slot = Some(current);
        self.rebuilds += 1;
        true
    }

    pub fn cached(&self, kind: ViewKind) -> Option<ViewKey> {
        match kind {
            ViewKind::Bytes => self.bytes,
            ViewKind::Structured => self.structured,
        }
    }

    /// Drop both views; the next access rebuilds them.
    pub fn clear(&mut self) {
        self.bytes = None;
        self.structured = None;
    }

    /// Total number of view rebuilds since creation.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}

/// Validate that `[offset, offset+len)` lies within `size` bytes.
pub fn check_range(size: usize, offset: usize, len: usize) -> Result<Range<usize>, BridgeError> {
    let out_of_bounds = || BridgeError::OutOfBounds { offset, len, size };
    let end = offset.checked_add(len).ok_or_else(out_of_bounds)?;
    if end > size {
        return Err(out_of_bounds());
    }
    Ok(offset..end)
}

/// Current byte view of the module's memory.
pub fn byte_view<'a, T>(ctx: &'a mut T) -> Result<&'a mut [u8], BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let memory = ctx.as_context().data().exports()?.memory;
    let (bytes, state) = memory.data_and_store_mut(ctx.as_context_mut());
    state.views.refresh(ViewKind::Bytes, ViewKey::of(bytes));
    Ok(bytes)
}

/// Current structured view of the module's memory.
pub fn structured_view<'a, T>(ctx: &'a mut T) -> Result<DataView<'a>, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let memory = ctx.as_context().data().exports()?.memory;
    let (bytes, state) = memory.data_and_store_mut(ctx.as_context_mut());
    state.views.refresh(ViewKind::Structured, ViewKey::of(bytes));
    Ok(DataView::new(bytes))
}

/// Little-endian typed access to a memory slice.
pub struct DataView<'a> {
    bytes: &'a mut [u8],
}

impl<'a> DataView<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], BridgeError> {
        let range = check_range(self.bytes.len(), offset, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), BridgeError> {
        let range = check_range(self.bytes.len(), offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn read<const N: usize>(&self, offset: usize) -> Result<[u8; N], BridgeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }

    pub fn get_i32(&self, offset: usize) -> Result<i32, BridgeError> {
        self.read(offset).map(i32::from_le_bytes)
    }

    pub fn set_i32(&mut self, offset: usize, value: i32) -> Result<(), BridgeError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn get_u32(&self, offset: usize) -> Result<u32, BridgeError> {
        self.read(offset).map(u32::from_le_bytes)
    }

    pub fn set_u32(&mut self, offset: usize, value: u32) -> Result<(), BridgeError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn get_i64(&self, offset: usize) -> Result<i64, BridgeError> {
        self.read(offset).map(i64::from_le_bytes)
    }

    pub fn set_i64(&mut self, offset: usize, value: i64) -> Result<(), BridgeError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn get_f64(&self, offset: usize) -> Result<f64, BridgeError> {
        self.read(offset).map(f64::from_le_bytes)
    }

    pub fn set_f64(&mut self, offset: usize, value: f64) -> Result<(), BridgeError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Read `count` consecutive u32 values starting at `offset`.
    pub fn get_u32_array(&self, offset: usize, count: usize) -> Result<Vec<u32>, BridgeError> {
        let len = count.checked_mul(4).ok_or(BridgeError::OutOfBounds {
            offset,
            len: usize::MAX,
            size: self.bytes.len(),
        })?;
        Ok(self
            .bytes(offset, len)?
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    pub fn set_u32_array(&mut self, offset: usize, values: &[u32]) -> Result<(), BridgeError> {
        let encoded: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_bytes(offset, &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert_eq!(check_range(100, 10, 20).unwrap(), 10..30);
        assert!(check_range(100, 90, 10).is_ok());
        assert!(check_range(100, 0, 0).is_ok());
        assert!(matches!(
            check_range(100, 91, 10),
            Err(BridgeError::OutOfBounds { offset: 91, len: 10, size: 100 })
        ));
        assert!(check_range(100, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_data_view_round_trip() {
        let mut mem = vec![0u8; 64];
        let mut view = DataView::new(&mut mem);
        view.set_i32(0, -7).unwrap();
        view.set_u32(4, 0xdead_beef).unwrap();
        view.set_i64(8, i64::MIN).unwrap();
        view.set_f64(16, 2.5).unwrap();
        assert_eq!(view.get_i32(0).unwrap(), -7);
        assert_eq!(view.get_u32(4).unwrap(), 0xdead_beef);
        assert_eq!(view.get_i64(8).unwrap(), i64::MIN);
        assert_eq!(view.get_f64(16).unwrap(), 2.5);
        assert_eq!(&mem[0..4], &(-7i32).to_le_bytes());
    }

    #[test]
    fn test_data_view_out_of_bounds() {
        let mut mem = vec![0u8; 8];
        let mut view = DataView::new(&mut mem);
        assert!(view.get_f64(1).is_err());
        assert!(view.set_i32(6, 1).is_err());
        assert!(view.get_u32_array(0, 3).is_err());
        assert!(view.get_u32_array(0, usize::MAX).is_err());
    }

    #[test]
    fn test_u32_array() {
        let mut mem = vec![0u8; 32];
        let mut view = DataView::new(&mut mem);
        view.set_u32_array(4, &[5, 6, 7]).unwrap();
        assert_eq!(view.get_u32_array(4, 3).unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_view_cache_rebuilds_on_identity_change() {
        let mut cache = ViewCache::new();
        let small = vec![0u8; 16];
        let large = vec![0u8; 32];

        assert!(cache.refresh(ViewKind::Bytes, ViewKey::of(&small)));
        assert!(!cache.refresh(ViewKind::Bytes, ViewKey::of(&small)));
        assert!(cache.refresh(ViewKind::Bytes, ViewKey::of(&large)));
        // Structured view is tracked independently.
        assert!(cache.refresh(ViewKind::Structured, ViewKey::of(&large)));
        assert_eq!(cache.rebuilds(), 3);
    }

    #[test]
    fn test_view_cache_same_length_moved_buffer_rebuilds() {
        let mut cache = ViewCache::new();
        let first = vec![0u8; 16];
        let moved = vec![0u8; 16];

        cache.refresh(ViewKind::Bytes, ViewKey::of(&first));
        assert!(cache.refresh(ViewKind::Bytes, ViewKey::of(&moved)));
        assert_eq!(cache.rebuilds(), 2);
    }

    #[test]
    fn test_view_cache_detached_always_rebuilds() {
        let mut cache = ViewCache::new();
        let empty: Vec<u8> = Vec::new();
        assert!(cache.refresh(ViewKind::Bytes, ViewKey::of(&empty)));
        assert!(cache.refresh(ViewKind::Bytes, ViewKey::of(&empty)));
    }

    #[test]
    fn test_view_cache_clear() {
        let mut cache = ViewCache::new();
        let mem = vec![0u8; 16];
        cache.refresh(ViewKind::Structured, ViewKey::of(&mem));
        cache.clear();
        assert!(cache.cached(ViewKind::Structured).is_none());
        assert!(cache.refresh(ViewKind::Structured, ViewKey::of(&mem)));
    }
}
