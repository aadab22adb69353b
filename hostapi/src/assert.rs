//! Debug-mode argument assertions.
//!
//! Run before a host value is lowered into a module argument, so a type
//! confusion fails immediately with a descriptive error instead of reaching
//! module memory.

use crate::error::HostError;
use crate::value::HostValue;

fn mismatch(expected: &'static str, found: &HostValue) -> HostError {
    HostError::TypeMismatch {
        expected,
        found: found.type_of(),
    }
}

pub fn assert_number(value: &HostValue) -> Result<f64, HostError> {
    value.as_f64().ok_or_else(|| mismatch("number", value))
}

pub fn assert_boolean(value: &HostValue) -> Result<bool, HostError> {
    value.as_bool().ok_or_else(|| mismatch("boolean", value))
}

pub fn assert_bigint(value: &HostValue) -> Result<i128, HostError> {
    match value {
        HostValue::BigInt(n) => Ok(*n),
        other => Err(mismatch("bigint", other)),
    }
}
