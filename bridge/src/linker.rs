//! Import surface registration via the Wasmtime linker.
//!
//! Every import lives in the `wbg` namespace. Each import:
//! 1. Resolves handle arguments against the handle table
//! 2. Reads or writes module memory through a fresh view
//! 3. Performs the host operation
//! 4. Routes failures through the boundary error channel: fallible imports
//!    store the failure for the module, all others log and re-raise it

use hostlink_hostapi::{HostError, HostFunction, HostObject, HostValue, StringEnum};
use wasmtime::{Caller, Linker};

use crate::boundary::{handle_error, log_error};
use crate::config::ImportDecl;
use crate::error::BridgeError;
use crate::handles;
use crate::host_impl::BridgeState;
use crate::memory::structured_view;
use crate::{closures, strings};

/// Import namespace of the bridge.
pub const IMPORT_MODULE: &str = "wbg";

/// Register the fixed import surface plus the declared application imports.
pub fn register_bridge_functions(
    linker: &mut Linker<BridgeState>,
    imports: &[ImportDecl],
) -> Result<(), BridgeError> {
    register_heap_functions(linker)?;
    register_string_functions(linker)?;
    register_value_functions(linker)?;
    register_closure_functions(linker)?;
    register_resource_functions(linker)?;
    register_enum_functions(linker)?;
    register_object_functions(linker)?;
    for decl in imports {
        register_declared_import(linker, decl)?;
    }
    Ok(())
}

fn flag(value: bool) -> u32 {
    value as u32
}

// ── Handle Table ──

fn register_heap_functions(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_init_externref_table",
        |mut caller: Caller<'_, BridgeState>| {
            caller.data_mut().heap.prime();
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_object_clone_ref",
        |mut caller: Caller<'_, BridgeState>, handle: u32| -> wasmtime::Result<u32> {
            let result = caller.data_mut().heap.clone_ref(handle);
            Ok(log_error("__wbindgen_object_clone_ref", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_object_drop_ref",
        |mut caller: Caller<'_, BridgeState>, handle: u32| {
            let released = caller.data_mut().heap.release(handle);
            tracing::trace!(handle, released, "handle dropped by module");
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_drop_slice",
        |mut caller: Caller<'_, BridgeState>, ptr: u32, len: u32| -> wasmtime::Result<()> {
            handles::release_range(&mut caller, ptr, len)?;
            Ok(())
        },
    )?;

    Ok(())
}

// ── Strings ──

fn register_string_functions(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_string_new",
        |mut caller: Caller<'_, BridgeState>, ptr: u32, len: u32| -> wasmtime::Result<u32> {
            // Malformed text is fatal, not a host failure.
            let text = strings::get_string(&mut caller, ptr, len)?;
            let result = caller.data_mut().heap.alloc(text.into());
            Ok(log_error("__wbindgen_string_new", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_string_get",
        |mut caller: Caller<'_, BridgeState>, out: u32, handle: u32| -> wasmtime::Result<()> {
            let value = caller.data().heap.get(handle);
            strings::write_string_out(&mut caller, out, value.as_str())?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_error_new",
        |mut caller: Caller<'_, BridgeState>, ptr: u32, len: u32| -> wasmtime::Result<u32> {
            let message = strings::get_string(&mut caller, ptr, len)?;
            let result = caller.data_mut().heap.alloc(HostValue::error("Error", message));
            Ok(log_error("__wbindgen_error_new", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_debug_string",
        |mut caller: Caller<'_, BridgeState>, out: u32, handle: u32| -> wasmtime::Result<()> {
            let text = caller.data().heap.get(handle).debug_string();
            strings::write_string_out(&mut caller, out, Some(&text))?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_throw",
        |mut caller: Caller<'_, BridgeState>, ptr: u32, len: u32| -> wasmtime::Result<()> {
            let message = strings::get_string(&mut caller, ptr, len)?;
            tracing::debug!(%message, "module raised an error");
            Err(BridgeError::Thrown(message).into())
        },
    )?;

    Ok(())
}

// ── Primitive Values ──

fn register_value_functions(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_number_new",
        |mut caller: Caller<'_, BridgeState>, value: f64| -> wasmtime::Result<u32> {
            let result = caller.data_mut().heap.alloc(value.into());
            Ok(log_error("__wbindgen_number_new", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_number_get",
        |mut caller: Caller<'_, BridgeState>, out: u32, handle: u32| -> wasmtime::Result<()> {
            let number = caller.data().heap.get(handle).as_f64();
            let mut view = structured_view(&mut caller)?;
            view.set_f64(out as usize + 8, number.unwrap_or(0.0))?;
            view.set_i32(out as usize, number.is_some() as i32)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_bigint_from_i64",
        |mut caller: Caller<'_, BridgeState>, value: i64| -> wasmtime::Result<u32> {
            let result = caller.data_mut().heap.alloc(HostValue::BigInt(value.into()));
            Ok(log_error("__wbindgen_bigint_from_i64", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_bigint_from_u64",
        |mut caller: Caller<'_, BridgeState>, value: i64| -> wasmtime::Result<u32> {
            let result = caller
                .data_mut()
                .heap
                .alloc(HostValue::BigInt((value as u64).into()));
            Ok(log_error("__wbindgen_bigint_from_u64", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_boolean_get",
        |caller: Caller<'_, BridgeState>, handle: u32| -> u32 {
            match caller.data().heap.get(handle).as_bool() {
                Some(true) => 1,
                Some(false) => 0,
                None => 2,
            }
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_is_undefined",
        |caller: Caller<'_, BridgeState>, handle: u32| -> u32 {
            flag(matches!(caller.data().heap.get(handle), HostValue::Undefined))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_is_null",
        |caller: Caller<'_, BridgeState>, handle: u32| -> u32 {
            flag(matches!(caller.data().heap.get(handle), HostValue::Null))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_is_object",
        |caller: Caller<'_, BridgeState>, handle: u32| -> u32 {
            let value = caller.data().heap.get(handle);
            flag(value.type_of() == "object" && !matches!(value, HostValue::Null))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_is_function",
        |caller: Caller<'_, BridgeState>, handle: u32| -> u32 {
            flag(matches!(caller.data().heap.get(handle), HostValue::Function(_)))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_is_string",
        |caller: Caller<'_, BridgeState>, handle: u32| -> u32 {
            flag(matches!(caller.data().heap.get(handle), HostValue::String(_)))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_is_bigint",
        |caller: Caller<'_, BridgeState>, handle: u32| -> u32 {
            flag(matches!(caller.data().heap.get(handle), HostValue::BigInt(_)))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_jsval_eq",
        |caller: Caller<'_, BridgeState>, a: u32, b: u32| -> u32 {
            let heap = &caller.data().heap;
            flag(heap.get(a).strict_eq(&heap.get(b)))
        },
    )?;

    Ok(())
}

// ── Closures ──

fn register_closure_functions(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_closure_wrapper",
        |mut caller: Caller<'_, BridgeState>, a: u32, b: u32, dtor: u32, adapter: u32| -> wasmtime::Result<u32> {
            let result = caller.data_mut().wrap_closure(a, b, dtor, adapter);
            Ok(log_error("__wbindgen_closure_wrapper", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_cb_drop",
        |mut caller: Caller<'_, BridgeState>, handle: u32| -> wasmtime::Result<u32> {
            let value = caller.data_mut().heap.take(handle);
            let Some(cell) = value.as_function().and_then(HostFunction::as_closure).cloned() else {
                let err = HostError::NotCallable(value.debug_string());
                log_error::<(), _>("__wbindgen_cb_drop", Err(err))?;
                return Ok(0);
            };
            let finalized = closures::drop_closure(&mut caller, &cell)?;
            Ok(flag(finalized))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_call",
        |mut caller: Caller<'_, BridgeState>, callee: u32, this: u32, args_ptr: u32, args_len: u32| -> wasmtime::Result<u32> {
            let args = handles::read_handle_args(&mut caller, args_ptr, args_len)?;
            let callee = caller.data().heap.get(callee);
            let this = caller.data().heap.get(this);
            let outcome = closures::call_function(&mut caller, &callee, &this, &args)?;
            let result = outcome.and_then(|value| caller.data_mut().heap.alloc(value));
            handle_error(&mut caller, result)
        },
    )?;

    Ok(())
}

// ── Resources & Enums ──

fn register_resource_functions(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_resource_wrap",
        |mut caller: Caller<'_, BridgeState>, class: u32, ptr: u32| -> wasmtime::Result<u32> {
            let result = caller.data_mut().wrap_resource(class, ptr);
            Ok(log_error("__wbindgen_resource_wrap", result)?)
        },
    )?;

    Ok(())
}

fn string_enum(table: u32) -> Result<StringEnum, BridgeError> {
    StringEnum::from_id(table).ok_or(BridgeError::UnknownEnum { table, index: 0 })
}

fn register_enum_functions(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_enum_string",
        |mut caller: Caller<'_, BridgeState>, table: u32, index: u32| -> wasmtime::Result<u32> {
            let lookup = string_enum(table)
                .and_then(|e| e.text(index).ok_or(BridgeError::UnknownEnum { table, index }));
            let text = log_error("__wbindgen_enum_string", lookup)?;
            let result = caller.data_mut().heap.alloc(text.into());
            Ok(log_error("__wbindgen_enum_string", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_enum_index",
        |caller: Caller<'_, BridgeState>, table: u32, handle: u32| -> wasmtime::Result<u32> {
            let table = log_error("__wbindgen_enum_index", string_enum(table))?;
            let value = caller.data().heap.get(handle);
            // Unknown text maps to the variant count, the "invalid" sentinel.
            let index = value
                .as_str()
                .and_then(|text| table.index_of(text))
                .unwrap_or(table.variants().len() as u32);
            Ok(index)
        },
    )?;

    Ok(())
}

// ── Objects & Globals ──

fn property_key(key: &HostValue) -> String {
    match key.as_str() {
        Some(text) => text.to_owned(),
        None => key.debug_string(),
    }
}

/// Property read with the host's semantics for non-object receivers.
pub fn get_property(target: &HostValue, key: &HostValue) -> Result<HostValue, HostError> {
    let key = property_key(key);
    match target {
        HostValue::Object(obj) => Ok(obj.get(&key)),
        HostValue::Error(err) => Ok(match key.as_str() {
            "name" => err.name().into(),
            "message" => err.message().into(),
            _ => HostValue::Undefined,
        }),
        HostValue::Function(f) if key == "name" => Ok(f.name().into()),
        HostValue::String(s) if key == "length" => Ok(HostValue::Number(s.encode_utf16().count() as f64)),
        HostValue::Undefined | HostValue::Null => Err(HostError::NotAnObject(target.debug_string())),
        _ => Ok(HostValue::Undefined),
    }
}

pub fn set_property(target: &HostValue, key: &HostValue, value: HostValue) -> Result<(), HostError> {
    let key = property_key(key);
    match target {
        HostValue::Object(obj) => obj.set(&key, value),
        other => Err(HostError::NotAnObject(other.debug_string())),
    }
}

fn register_object_functions(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_object_new",
        |mut caller: Caller<'_, BridgeState>| -> wasmtime::Result<u32> {
            let result = caller.data_mut().heap.alloc(HostObject::plain().into());
            Ok(log_error("__wbindgen_object_new", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_global",
        |mut caller: Caller<'_, BridgeState>, ptr: u32, len: u32| -> wasmtime::Result<u32> {
            let name = strings::get_string(&mut caller, ptr, len)?;
            let value = caller.data().global(&name);
            let result = caller.data_mut().heap.alloc(value);
            Ok(log_error("__wbindgen_global", result)?)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_get",
        |mut caller: Caller<'_, BridgeState>, target: u32, key: u32| -> wasmtime::Result<u32> {
            let target = caller.data().heap.get(target);
            let key = caller.data().heap.get(key);
            let result = get_property(&target, &key).and_then(|value| caller.data_mut().heap.alloc(value));
            handle_error(&mut caller, result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        "__wbindgen_set",
        |mut caller: Caller<'_, BridgeState>, target: u32, key: u32, value: u32| -> wasmtime::Result<()> {
            let heap = &caller.data().heap;
            let result = set_property(&heap.get(target), &heap.get(key), heap.get(value));
            handle_error(&mut caller, result)
        },
    )?;

    Ok(())
}

// ── Application Imports ──

fn register_declared_import(linker: &mut Linker<BridgeState>, decl: &ImportDecl) -> Result<(), BridgeError> {
    let name = decl.name.clone();
    let fallible = decl.fallible;
    linker.func_wrap(
        IMPORT_MODULE,
        &decl.name,
        move |mut caller: Caller<'_, BridgeState>, args_ptr: u32, args_len: u32| -> wasmtime::Result<u32> {
            let args = handles::read_handle_args(&mut caller, args_ptr, args_len)?;
            // Resolved at each call: the environment may gain or lose it.
            let callee = caller.data().global(&name);
            let outcome = closures::call_function(&mut caller, &callee, &HostValue::Undefined, &args)?;
            let result = outcome.and_then(|value| caller.data_mut().heap.alloc(value));
            if fallible {
                handle_error(&mut caller, result)
            } else {
                Ok(log_error(&name, result)?)
            }
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_property() {
        let obj: HostValue = HostObject::plain().with("id", "root").into();
        assert_eq!(get_property(&obj, &"id".into()).unwrap().as_str(), Some("root"));
        assert!(get_property(&obj, &"missing".into()).unwrap().is_like_none());

        let err = HostValue::error("TypeError", "bad");
        assert_eq!(get_property(&err, &"message".into()).unwrap().as_str(), Some("bad"));

        let f: HostValue = HostFunction::native("now", |_, _| Ok(HostValue::Undefined)).into();
        assert_eq!(get_property(&f, &"name".into()).unwrap().as_str(), Some("now"));

        assert_eq!(get_property(&"héllo".into(), &"length".into()).unwrap().as_f64(), Some(5.0));
        assert!(get_property(&1.into(), &"x".into()).unwrap().is_like_none());
    }

    #[test]
    fn test_get_property_of_nothing_fails() {
        let err = get_property(&HostValue::Null, &"x".into()).unwrap_err();
        assert_eq!(err.name(), "TypeError");
    }

    #[test]
    fn test_set_property() {
        let obj: HostValue = HostObject::plain().into();
        set_property(&obj, &"a".into(), 1.into()).unwrap();
        assert_eq!(obj.as_object().unwrap().get("a").as_f64(), Some(1.0));

        obj.as_object().unwrap().freeze();
        assert!(matches!(
            set_property(&obj, &"a".into(), 2.into()),
            Err(HostError::ReadOnly { .. })
        ));
        assert!(set_property(&"s".into(), &"a".into(), 2.into()).is_err());
    }
}
