//! Handle table: integer handles standing in for host values.
//!
//! The module never holds a host value directly. It holds a `Handle`, an
//! index into this table. Slots are either occupied or free; freed slots are
//! reset to `undefined` and recycled lowest-first before the table grows.
//!
//! Layout of the reserved region, fixed once at startup by [`HandleTable::prime`]:
//!
//! | handle | value       |
//! |--------|-------------|
//! | 0      | "no value"  |
//! | 1      | `undefined` |
//! | 2      | `null`      |
//! | 3      | `true`      |
//! | 4      | `false`     |

use std::collections::BTreeSet;

use crate::error::HostError;
use crate::types::HeapConfig;
use crate::value::HostValue;

/// Index into the handle table.
pub type Handle = u32;

/// "No value" sentinel.
pub const HANDLE_NONE: Handle = 0;
pub const HANDLE_UNDEFINED: Handle = 1;
pub const HANDLE_NULL: Handle = 2;
pub const HANDLE_TRUE: Handle = 3;
pub const HANDLE_FALSE: Handle = 4;

/// Number of slots (including the sentinel) never handed out by `alloc`.
pub const RESERVED_HANDLES: usize = 5;

/// Growable table of host values addressed by `Handle`.
#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<HostValue>,
    free: BTreeSet<Handle>,
    max_handles: usize,
    primed: bool,
}

impl HandleTable {
    /// Create a table. The reserved region exists but holds `undefined`
    /// until [`prime`](Self::prime) runs.
    pub fn new(config: &HeapConfig) -> Self {
        let mut slots = Vec::with_capacity(config.initial_capacity.max(RESERVED_HANDLES));
        slots.resize(RESERVED_HANDLES, HostValue::Undefined);
        Self {
            slots,
            free: BTreeSet::new(),
            max_handles: config.max_handles.max(RESERVED_HANDLES),
            primed: false,
        }
    }

    /// Write the reserved constants. Idempotent.
    pub fn prime(&mut self) {
        self.slots[HANDLE_NONE as usize] = HostValue::Undefined;
        self.slots[HANDLE_UNDEFINED as usize] = HostValue::Undefined;
        self.slots[HANDLE_NULL as usize] = HostValue::Null;
        self.slots[HANDLE_TRUE as usize] = HostValue::Bool(true);
        self.slots[HANDLE_FALSE as usize] = HostValue::Bool(false);
        self.primed = true;
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Store `value` in the lowest free slot, growing the table if none is free.
    pub fn alloc(&mut self, value: HostValue) -> Result<Handle, HostError> {
        if let Some(handle) = self.free.pop_first() {
            self.slots[handle as usize] = value;
            return Ok(handle);
        }
        if self.slots.len() >= self.max_handles {
            return Err(HostError::HandleTableFull(self.max_handles));
        }
        let handle = self.slots.len() as Handle;
        self.slots.push(value);
        Ok(handle)
    }

    /// Like [`alloc`](Self::alloc), but maps the reserved constants onto
    /// their fixed handles instead of allocating.
    pub fn intern(&mut self, value: HostValue) -> Result<Handle, HostError> {
        match value {
            HostValue::Undefined => Ok(HANDLE_UNDEFINED),
            HostValue::Null => Ok(HANDLE_NULL),
            HostValue::Bool(true) => Ok(HANDLE_TRUE),
            HostValue::Bool(false) => Ok(HANDLE_FALSE),
            other => self.alloc(other),
        }
    }

    /// Value stored at `handle`; `undefined` for the sentinel, free, or
    /// never-allocated slots.
    pub fn get(&self, handle: Handle) -> HostValue {
        if handle == HANDLE_NONE || !self.is_live(handle) {
            return HostValue::Undefined;
        }
        self.slots[handle as usize].clone()
    }

    /// Whether `handle` currently maps to a value (reserved slots included).
    pub fn is_live(&self, handle: Handle) -> bool {
        (handle as usize) < self.slots.len() && !self.free.contains(&handle)
    }

    /// New handle aliasing the value behind `handle`.
    pub fn clone_ref(&mut self, handle: Handle) -> Result<Handle, HostError> {
        let value = self.get(handle);
        self.alloc(value)
    }

    /// Reset `handle` to `undefined` and return it to the free list.
    ///
    /// Returns `false` for reserved, free, or out-of-range handles, which
    /// are left untouched.
    pub fn release(&mut self, handle: Handle) -> bool {
        let index = handle as usize;
        if index < RESERVED_HANDLES || index >= self.slots.len() || self.free.contains(&handle) {
            return false;
        }
        // The old value is dropped here, after the slot is consistent again.
        let _old = std::mem::take(&mut self.slots[index]);
        self.free.insert(handle);
        true
    }

    /// Get and release in one step (ownership transfer out of the table).
    pub fn take(&mut self, handle: Handle) -> HostValue {
        let value = self.get(handle);
        self.release(handle);
        value
    }

    /// Release every handle in `handles`; returns how many were live.
    pub fn release_all(&mut self, handles: &[Handle]) -> usize {
        handles.iter().filter(|&&h| self.release(h)).count()
    }

    /// Occupied, non-reserved slots.
    pub fn live_count(&self) -> usize {
        self.slots.len() - RESERVED_HANDLES - self.free.len()
    }

    /// Total slots ever created (the table never shrinks).
    pub fn high_water(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HostObject;

    fn primed_table() -> HandleTable {
        let mut table = HandleTable::new(&HeapConfig::default());
        table.prime();
        table
    }

    #[test]
    fn test_reserved_constants() {
        let table = primed_table();
        assert!(table.get(HANDLE_NONE).strict_eq(&HostValue::Undefined));
        assert!(table.get(HANDLE_UNDEFINED).strict_eq(&HostValue::Undefined));
        assert!(table.get(HANDLE_NULL).strict_eq(&HostValue::Null));
        assert!(table.get(HANDLE_TRUE).strict_eq(&HostValue::Bool(true)));
        assert!(table.get(HANDLE_FALSE).strict_eq(&HostValue::Bool(false)));
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn test_alloc_unique_without_release() {
        let mut table = primed_table();
        let handles: Vec<Handle> = (0..100)
            .map(|i| table.alloc(HostValue::from(i)).unwrap())
            .collect();
        let unique: BTreeSet<Handle> = handles.iter().copied().collect();
        assert_eq!(unique.len(), handles.len());
        assert!(handles.iter().all(|&h| h as usize >= RESERVED_HANDLES));
    }

    #[test]
    fn test_release_middle_then_reuse() {
        let mut table = primed_table();
        let a = table.alloc(HostObject::plain().into()).unwrap();
        let b = table.alloc(HostObject::plain().into()).unwrap();
        let c = table.alloc(HostObject::plain().into()).unwrap();
        assert_eq!((a, b, c), (5, 6, 7));

        assert!(table.release(b));
        assert!(table.get(b).strict_eq(&HostValue::Undefined));
        assert!(!table.is_live(b));

        let d = table.alloc(HostObject::plain().into()).unwrap();
        assert_eq!(d, b);
        assert_eq!(table.live_count(), 3);
    }

    #[test]
    fn test_lowest_free_slot_first() {
        let mut table = primed_table();
        let handles: Vec<Handle> = (0..5).map(|i| table.alloc(i.into()).unwrap()).collect();
        table.release(handles[3]);
        table.release(handles[1]);
        assert_eq!(table.alloc("x".into()).unwrap(), handles[1]);
        assert_eq!(table.alloc("y".into()).unwrap(), handles[3]);
        assert_eq!(table.alloc("z".into()).unwrap() as usize, RESERVED_HANDLES + 5);
    }

    #[test]
    fn test_release_is_idempotent_and_skips_reserved() {
        let mut table = primed_table();
        let h = table.alloc("v".into()).unwrap();
        assert!(table.release(h));
        assert!(!table.release(h));
        assert!(!table.release(HANDLE_NULL));
        assert!(table.get(HANDLE_NULL).strict_eq(&HostValue::Null));
        assert!(!table.release(9999));
    }

    #[test]
    fn test_growth_keeps_handles_stable() {
        let config = HeapConfig {
            initial_capacity: 8,
            max_handles: 10_000,
        };
        let mut table = HandleTable::new(&config);
        table.prime();
        let first = table.alloc("first".into()).unwrap();
        for i in 0..1000 {
            table.alloc(i.into()).unwrap();
        }
        assert_eq!(table.get(first).as_str(), Some("first"));
    }

    #[test]
    fn test_table_full() {
        let config = HeapConfig {
            initial_capacity: 8,
            max_handles: RESERVED_HANDLES + 2,
        };
        let mut table = HandleTable::new(&config);
        table.alloc(1.into()).unwrap();
        table.alloc(2.into()).unwrap();
        let err = table.alloc(3.into()).unwrap_err();
        assert!(matches!(err, HostError::HandleTableFull(_)));
    }

    #[test]
    fn test_intern_constants() {
        let mut table = primed_table();
        assert_eq!(table.intern(HostValue::Undefined).unwrap(), HANDLE_UNDEFINED);
        assert_eq!(table.intern(HostValue::Null).unwrap(), HANDLE_NULL);
        assert_eq!(table.intern(true.into()).unwrap(), HANDLE_TRUE);
        assert_eq!(table.intern(false.into()).unwrap(), HANDLE_FALSE);
        assert_eq!(table.live_count(), 0);
        assert_eq!(table.intern("s".into()).unwrap() as usize, RESERVED_HANDLES);
    }

    #[test]
    fn test_clone_ref_and_take() {
        let mut table = primed_table();
        let obj: HostValue = HostObject::plain().into();
        let h = table.alloc(obj.clone()).unwrap();
        let alias = table.clone_ref(h).unwrap();
        assert_ne!(h, alias);
        assert!(table.get(alias).strict_eq(&obj));

        let taken = table.take(h);
        assert!(taken.strict_eq(&obj));
        assert!(!table.is_live(h));
        assert!(table.is_live(alias));
    }

    #[test]
    fn test_release_all() {
        let mut table = primed_table();
        let handles: Vec<Handle> = (0..3).map(|i| table.alloc(i.into()).unwrap()).collect();
        assert_eq!(table.release_all(&handles), 3);
        assert_eq!(table.live_count(), 0);
        assert!(handles.iter().all(|&h| table.get(h).strict_eq(&HostValue::Undefined)));
    }
}
