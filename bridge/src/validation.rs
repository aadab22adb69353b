//! Module ABI validation.
//!
//! Checks a compiled module against the bridge ABI before instantiation:
//!
//! 1. `memory` export present
//! 2. Required function exports present with i32 signatures
//! 3. Optional exports, when present, with the right signature or type
//! 4. All imports are functions from the `wbg` namespace; no WASI

use wasmtime::{ExternType, FuncType, Module, ValType};

use crate::error::BridgeError;
use crate::host_impl::{
    EXPORT_EXN_STORE, EXPORT_FREE, EXPORT_FUNCTION_TABLE, EXPORT_MALLOC, EXPORT_MEMORY,
    EXPORT_REALLOC, EXPORT_START,
};
use crate::linker::IMPORT_MODULE;

fn is_i32(vt: &ValType) -> bool {
    matches!(vt, ValType::I32)
}

/// Expected export: (name, param_count_of_i32, result_count_of_i32).
const REQUIRED_EXPORTS: &[(&str, usize, usize)] = &[
    (EXPORT_MALLOC, 2, 1),
    (EXPORT_FREE, 3, 0),
    (EXPORT_EXN_STORE, 1, 0),
];

const OPTIONAL_EXPORTS: &[(&str, usize, usize)] = &[
    (EXPORT_REALLOC, 4, 1),
    (EXPORT_START, 0, 0),
];

/// Validate that a module meets the bridge ABI.
pub fn validate_module(module: &Module) -> Result<(), BridgeError> {
    validate_exports(module)?;
    validate_imports(module)?;
    Ok(())
}

fn validate_exports(module: &Module) -> Result<(), BridgeError> {
    let has_memory = module
        .exports()
        .any(|e| e.name() == EXPORT_MEMORY && matches!(e.ty(), ExternType::Memory(_)));
    if !has_memory {
        return Err(BridgeError::ValidationError(format!(
            "module must export '{}'",
            EXPORT_MEMORY
        )));
    }

    for &(name, params, results) in REQUIRED_EXPORTS {
        let ty = module.get_export(name).ok_or_else(|| {
            BridgeError::ValidationError(format!("missing required export: {}", name))
        })?;
        check_function(name, ty, params, results)?;
    }

    for &(name, params, results) in OPTIONAL_EXPORTS {
        if let Some(ty) = module.get_export(name) {
            check_function(name, ty, params, results)?;
        }
    }

    if let Some(ty) = module.get_export(EXPORT_FUNCTION_TABLE) {
        if !matches!(ty, ExternType::Table(_)) {
            return Err(BridgeError::ValidationError(format!(
                "export '{}' must be a table",
                EXPORT_FUNCTION_TABLE
            )));
        }
    }

    Ok(())
}

fn check_function(name: &str, ty: ExternType, params: usize, results: usize) -> Result<(), BridgeError> {
    let func_ty: FuncType = match ty {
        ExternType::Func(ft) => ft,
        _ => {
            return Err(BridgeError::ValidationError(format!(
                "export '{}' must be a function",
                name
            )));
        }
    };

    let actual_params: Vec<ValType> = func_ty.params().collect();
    let actual_results: Vec<ValType> = func_ty.results().collect();

    if actual_params.len() != params || !actual_params.iter().all(is_i32) {
        return Err(BridgeError::ValidationError(format!(
            "export '{}' has wrong param signature: expected {} i32 params, got {} params",
            name,
            params,
            actual_params.len()
        )));
    }
    if actual_results.len() != results || !actual_results.iter().all(is_i32) {
        return Err(BridgeError::ValidationError(format!(
            "export '{}' has wrong result signature: expected {} i32 results, got {} results",
            name,
            results,
            actual_results.len()
        )));
    }
    Ok(())
}

fn validate_imports(module: &Module) -> Result<(), BridgeError> {
    for import in module.imports() {
        let module_name = import.module();

        if module_name.starts_with("wasi") {
            return Err(BridgeError::ValidationError(format!(
                "WASI import not allowed: {}::{}",
                module_name,
                import.name()
            )));
        }

        if module_name != IMPORT_MODULE {
            return Err(BridgeError::ValidationError(format!(
                "import from unknown module '{}' (only '{}' allowed): {}",
                module_name,
                IMPORT_MODULE,
                import.name()
            )));
        }

        if !matches!(import.ty(), ExternType::Func(_)) {
            return Err(BridgeError::ValidationError(format!(
                "non-function import not allowed: {}::{}",
                module_name,
                import.name()
            )));
        }
    }

    Ok(())
}
