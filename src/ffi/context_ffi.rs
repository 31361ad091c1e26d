//! Context lifecycle and registration FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::{
    ContextWrapper, JitexprContext, JitexprFunc, JitexprResult, get_context_mut, str_arg,
};
use crate::config::{JitMode, RuntimeConfig};
use crate::context::Context;
use std::ffi::{c_char, c_void};

/// Create a new context with the builtins registered.
///
/// `jit_mode`: 0 = interpreter only, 1 = JIT required, 2 = JIT when
/// available. Returns NULL if mode 1 is requested on a build without JIT.
/// The returned context must be freed with `jitexpr_context_free()`.
///
/// # Example (C)
/// ```c
/// JitexprContext *ctx = jitexpr_context_new(2);
/// double t = 0.0;
/// jitexpr_var(ctx, "t", &t);
/// // ... compile, link, eval ...
/// jitexpr_context_free(ctx);
/// ```
#[unsafe(no_mangle)]
pub extern "C" fn jitexpr_context_new(jit_mode: u32) -> *mut JitexprContext {
    let jit_mode = match jit_mode {
        0 => JitMode::Off,
        1 => JitMode::On,
        _ => JitMode::Auto,
    };
    let config = RuntimeConfig {
        jit_mode,
        ..Default::default()
    };
    match Context::with_config(config) {
        Ok(context) => Box::into_raw(Box::new(ContextWrapper::new(context))) as *mut JitexprContext,
        Err(err) => {
            log::error!("{}", err);
            std::ptr::null_mut()
        }
    }
}

/// Free a context.
///
/// # Safety
///
/// - `ctx` must be a valid pointer returned by `jitexpr_context_new()`
/// - Every program linked against it must be freed first
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_context_free(ctx: *mut JitexprContext) {
    if ctx.is_null() {
        return;
    }
    let _ = Box::from_raw(ctx as *mut ContextWrapper);
}

/// Register a caller-owned double as variable `name`.
///
/// # Safety
///
/// `value` must outlive the context and every program linked against it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_var(
    ctx: *mut JitexprContext,
    name: *const c_char,
    value: *mut f64,
) -> JitexprResult {
    let Some(wrapper) = get_context_mut(ctx) else {
        return JitexprResult::ErrorInvalidArg;
    };
    let Some(name) = str_arg(name) else {
        wrapper.set_error("name is NULL or not UTF-8");
        return JitexprResult::ErrorInvalidArg;
    };
    match wrapper.context.var_ptr(name, value) {
        Ok(_) => {
            wrapper.clear_error();
            JitexprResult::Ok
        }
        Err(err) => {
            wrapper.set_error(err.to_string());
            JitexprResult::from(&err)
        }
    }
}

/// Register a host function taking `arity` doubles.
///
/// # Safety
///
/// `userdata` is passed back to `func` on every call and must stay valid
/// for the lifetime of the context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_func(
    ctx: *mut JitexprContext,
    name: *const c_char,
    arity: usize,
    func: Option<JitexprFunc>,
    userdata: *mut c_void,
) -> JitexprResult {
    let Some(wrapper) = get_context_mut(ctx) else {
        return JitexprResult::ErrorInvalidArg;
    };
    let (Some(name), Some(func)) = (str_arg(name), func) else {
        wrapper.set_error("name or function is NULL");
        return JitexprResult::ErrorInvalidArg;
    };
    let body = move |args: &[f64]| unsafe { func(args.as_ptr(), args.len(), userdata) };
    match wrapper.context.func_closure(name, arity, body) {
        Ok(()) => {
            wrapper.clear_error();
            JitexprResult::Ok
        }
        Err(err) => {
            wrapper.set_error(err.to_string());
            JitexprResult::from(&err)
        }
    }
}

/// Compile `source` as a zero-argument function `name()`.
/// It is linked by `jitexpr_link_all()`.
///
/// # Safety
///
/// `ctx` must be valid; `name` and `source` NUL-terminated UTF-8.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_func_source(
    ctx: *mut JitexprContext,
    name: *const c_char,
    source: *const c_char,
) -> JitexprResult {
    let Some(wrapper) = get_context_mut(ctx) else {
        return JitexprResult::ErrorInvalidArg;
    };
    let (Some(name), Some(source)) = (str_arg(name), str_arg(source)) else {
        wrapper.set_error("name or source is NULL or not UTF-8");
        return JitexprResult::ErrorInvalidArg;
    };
    match wrapper.context.func_source(name, source) {
        Ok(()) => {
            wrapper.clear_error();
            JitexprResult::Ok
        }
        Err(err) => {
            wrapper.set_error(err.to_string());
            JitexprResult::from(&err)
        }
    }
}

/// Link every named sub-program.
///
/// # Safety
///
/// `ctx` must be a valid context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_link_all(ctx: *mut JitexprContext) -> JitexprResult {
    let Some(wrapper) = get_context_mut(ctx) else {
        return JitexprResult::ErrorInvalidArg;
    };
    match wrapper.context.link() {
        Ok(()) => {
            wrapper.clear_error();
            JitexprResult::Ok
        }
        Err(err) => {
            wrapper.set_error(err.to_string());
            JitexprResult::from(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe extern "C" fn weighted_sum(args: *const f64, argc: usize, userdata: *mut c_void) -> f64 {
        let weight = unsafe { *(userdata as *const f64) };
        let args = unsafe { std::slice::from_raw_parts(args, argc) };
        args.iter().sum::<f64>() * weight
    }

    #[test]
    fn test_context_lifecycle() {
        let ctx = jitexpr_context_new(0);
        assert!(!ctx.is_null());
        unsafe { jitexpr_context_free(ctx) };
        unsafe { jitexpr_context_free(std::ptr::null_mut()) };
    }

    #[test]
    fn test_registration() {
        let ctx = jitexpr_context_new(0);
        let name = CString::new("t").unwrap();
        let mut t = 1.0;
        let mut weight = 2.0;
        unsafe {
            assert_eq!(jitexpr_var(ctx, name.as_ptr(), &mut t), JitexprResult::Ok);
            assert_eq!(
                jitexpr_var(ctx, name.as_ptr(), &mut t),
                JitexprResult::ErrorAlreadyDefined
            );
            let fname = CString::new("wsum").unwrap();
            assert_eq!(
                jitexpr_func(
                    ctx,
                    fname.as_ptr(),
                    2,
                    Some(weighted_sum),
                    &mut weight as *mut f64 as *mut c_void
                ),
                JitexprResult::Ok
            );
            let sub = CString::new("w").unwrap();
            let source = CString::new("wsum(t, 3)").unwrap();
            assert_eq!(
                jitexpr_func_source(ctx, sub.as_ptr(), source.as_ptr()),
                JitexprResult::Ok
            );
            assert_eq!(jitexpr_link_all(ctx), JitexprResult::Ok);
            let wrapper = get_context_mut(ctx).unwrap();
            assert_eq!(wrapper.context.get_func("w").unwrap().eval(), Ok(8.0));
            jitexpr_context_free(ctx);
        }
    }

    #[test]
    fn test_null_arguments() {
        unsafe {
            assert_eq!(
                jitexpr_var(std::ptr::null_mut(), std::ptr::null(), std::ptr::null_mut()),
                JitexprResult::ErrorInvalidArg
            );
            let ctx = jitexpr_context_new(0);
            assert_eq!(
                jitexpr_func(ctx, std::ptr::null(), 1, None, std::ptr::null_mut()),
                JitexprResult::ErrorInvalidArg
            );
            jitexpr_context_free(ctx);
        }
    }
}
