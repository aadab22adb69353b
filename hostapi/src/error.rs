//! Host-side error types for the module bridge.
//!
//! `HostError` is what host operations fail with. Whether it reaches the
//! module as stored data or terminates the call chain is decided by the
//! boundary discipline of the import that ran the operation, not here.

use crate::value::HostValue;

/// Failure raised by a host operation.
///
/// [`into_value`](HostError::into_value) turns any variant into the host
/// value the module sees when the failure is captured by a fallible import.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// An arbitrary host value was thrown by a host function.
    #[error("{}", .0.debug_string())]
    Thrown(HostValue),

    /// Debug-mode argument assertion failed.
    #[error("expected a {expected} argument, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A host capability is absent from the current environment.
    #[error("{0} is not defined")]
    NotDefined(String),

    /// Call target is not a function.
    #[error("{0} is not a function")]
    NotCallable(String),

    /// Opaque resource classes can only be built by the module.
    #[error("cannot invoke `new` directly on {0}")]
    Construction(String),

    /// Assignment to a frozen host object.
    #[error("cannot assign to read only property `{key}` of {class}")]
    ReadOnly { class: String, key: String },

    /// Property access on a value that is not an object.
    #[error("cannot access properties of {0}")]
    NotAnObject(String),

    /// The handle table reached its configured limit.
    #[error("handle table exhausted ({0} handles)")]
    HandleTableFull(usize),
}

impl HostError {
    /// Wrap an arbitrary host value as a thrown error.
    pub fn thrown(value: impl Into<HostValue>) -> Self {
        Self::Thrown(value.into())
    }

    /// Host error class name used when the failure becomes a host value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Thrown(_) => "Error",
            Self::NotDefined(_) => "ReferenceError",
            Self::HandleTableFull(_) => "RangeError",
            Self::TypeMismatch { .. }
            | Self::NotCallable(_)
            | Self::Construction(_)
            | Self::ReadOnly { .. }
            | Self::NotAnObject(_) => "TypeError",
        }
    }

    /// Convert into the host value stored for the module.
    ///
    /// A thrown value is passed through untouched; every other variant
    /// becomes an error value carrying the variant's class name and message.
    pub fn into_value(self) -> HostValue {
        match self {
            Self::Thrown(value) => value,
            other => HostValue::error(other.name(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_value_passes_through() {
        let err = HostError::thrown(HostValue::from(42.0));
        match err.into_value() {
            HostValue::Number(n) => assert_eq!(n, 42.0),
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_not_defined_becomes_reference_error() {
        let value = HostError::NotDefined("fetch".into()).into_value();
        match value {
            HostValue::Error(e) => {
                assert_eq!(e.name(), "ReferenceError");
                assert_eq!(e.message(), "fetch is not defined");
            }
            other => panic!("expected error value, got {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = HostError::TypeMismatch {
            expected: "number",
            found: "string",
        };
        assert_eq!(err.to_string(), "expected a number argument, found string");
        assert_eq!(err.name(), "TypeError");
    }

    #[test]
    fn test_display_of_thrown_error_value() {
        let err = HostError::thrown(HostValue::error("Error", "boom"));
        assert_eq!(err.to_string(), "Error: boom");
    }
}
