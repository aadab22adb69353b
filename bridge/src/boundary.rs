//! Boundary error channel.
//!
//! Two disciplines for host failures raised while the module is calling
//! into the host:
//!
//! - **fallible** imports capture the failure as data: the error value is
//!   stored in the handle table, its handle passed to the module's
//!   `__wbindgen_exn_store`, and a zero/default result returned. The module
//!   decides what to do with it.
//! - every other import treats a host failure as a defect: it is logged and
//!   re-raised as a trap that unwinds to the outermost host-initiated call.

use std::fmt::Display;

use hostlink_hostapi::{Handle, HostError, HostValue};
use wasmtime::AsContextMut;

use crate::error::BridgeError;
use crate::host_impl::BridgeState;

/// Store `value` as the pending exception for the module.
pub fn store_exception<T>(ctx: &mut T, value: HostValue) -> Result<Handle, BridgeError>
where
    T: AsContextMut<Data = BridgeState>,
{
    let exn_store = ctx.as_context().data().exports()?.exn_store.clone();
    let handle = ctx.as_context_mut().data_mut().heap.alloc(value)?;
    tracing::debug!(handle, "host exception stored for module");
    exn_store
        .call(&mut *ctx, handle)
        .map_err(BridgeError::from_trap)?;
    Ok(handle)
}

/// Fallible discipline: a host failure becomes a stored exception and the
/// import returns `R::default()`.
pub fn handle_error<T, R>(ctx: &mut T, result: Result<R, HostError>) -> wasmtime::Result<R>
where
    T: AsContextMut<Data = BridgeState>,
    R: Default,
{
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            store_exception(ctx, err.into_value())?;
            Ok(R::default())
        }
    }
}

/// Non-fallible discipline: a failure is a defect in the module's bindings.
/// Logged, then re-raised.
pub fn log_error<R, E: Display>(import: &str, result: Result<R, E>) -> Result<R, BridgeError> {
    result.map_err(|err| {
        let message = err.to_string();
        tracing::error!(
            import,
            error = %message,
            "imported host function that was not marked as fallible threw an error"
        );
        BridgeError::HostDefect {
            import: import.to_owned(),
            message,
        }
    })
}

/// Split a failure of a nested call into the module into what a fallible
/// import may surface as data (`Ok`) and what must keep unwinding (`Err`).
///
/// Errors the module raised itself and closure protocol violations are
/// catchable; boundary violations and traps are not.
pub fn catchable(err: BridgeError) -> Result<HostError, BridgeError> {
    match err {
        BridgeError::Thrown(message) => Ok(HostError::thrown(HostValue::error("Error", message))),
        BridgeError::ClosureReentrant | BridgeError::ClosureDropped => {
            Ok(HostError::thrown(HostValue::error("Error", err.to_string())))
        }
        BridgeError::TypeMismatch { expected, found } => Ok(HostError::TypeMismatch { expected, found }),
        fatal => Err(fatal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_log_error_reports_defect() {
        let result: Result<u32, _> = log_error("__wbindgen_get", Err(HostError::NotDefined("x".into())));
        match result {
            Err(BridgeError::HostDefect { import, message }) => {
                assert_eq!(import, "__wbindgen_get");
                assert_eq!(message, "x is not defined");
            }
            other => panic!("expected HostDefect, got {:?}", other),
        }
        assert!(logs_contain("not marked as fallible"));
    }

    #[test]
    fn test_log_error_passes_success() {
        let result = log_error::<_, HostError>("__wbindgen_number_new", Ok(7u32));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_catchable() {
        match catchable(BridgeError::Thrown("bad input".into())) {
            Ok(HostError::Thrown(value)) => assert_eq!(value.debug_string(), "Error: bad input"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(catchable(BridgeError::ClosureReentrant).is_ok());
        assert!(matches!(
            catchable(BridgeError::FuelExhausted),
            Err(BridgeError::FuelExhausted)
        ));
        assert!(catchable(BridgeError::OutOfBounds { offset: 0, len: 1, size: 0 }).is_err());
    }
}
