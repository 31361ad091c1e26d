//! Compile, link and evaluate FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::{
    JitexprContext, JitexprProgram, JitexprResult, ProgramWrapper, get_context, get_context_mut,
    get_program_mut, str_arg,
};
use std::ffi::c_char;

/// Compile `source` for the context's backend.
///
/// Returns NULL on failure; the message is available through
/// `jitexpr_get_error(ctx)`. The program must be linked before evaluation
/// and freed with `jitexpr_program_free()`.
///
/// # Safety
///
/// `ctx` must be valid; `source` NUL-terminated UTF-8.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_compile(
    ctx: *mut JitexprContext,
    source: *const c_char,
) -> *mut JitexprProgram {
    let Some(wrapper) = get_context_mut(ctx) else {
        return std::ptr::null_mut();
    };
    let Some(source) = str_arg(source) else {
        wrapper.set_error("source is NULL or not UTF-8");
        return std::ptr::null_mut();
    };
    match wrapper.context.compile(source) {
        Ok(program) => {
            wrapper.clear_error();
            Box::into_raw(Box::new(ProgramWrapper { program })) as *mut JitexprProgram
        }
        Err(err) => {
            wrapper.set_error(err.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Free a program.
///
/// # Safety
///
/// `program` must come from `jitexpr_compile()` and not be freed already.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_program_free(program: *mut JitexprProgram) {
    if program.is_null() {
        return;
    }
    let _ = Box::from_raw(program as *mut ProgramWrapper);
}

/// Resolve the program's symbols against `ctx`. May be called again after
/// registering more names.
///
/// # Safety
///
/// Both handles must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_link(
    ctx: *mut JitexprContext,
    program: *mut JitexprProgram,
) -> JitexprResult {
    let Some(wrapper) = get_context_mut(ctx) else {
        return JitexprResult::ErrorInvalidArg;
    };
    let Some(program) = get_program_mut(program) else {
        wrapper.set_error("program is NULL");
        return JitexprResult::ErrorInvalidArg;
    };
    match wrapper.context.link_program(&mut program.program) {
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

/// Evaluate a linked program, storing the result in `*out`.
///
/// # Example (C)
/// ```c
/// double result;
/// if (jitexpr_eval(ctx, program, &result) != JITEXPR_RESULT_OK) {
///     printf("Error: %s\n", jitexpr_get_error(ctx));
/// }
/// ```
///
/// # Safety
///
/// Both handles must be valid and `out` writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_eval(
    ctx: *mut JitexprContext,
    program: *mut JitexprProgram,
    out: *mut f64,
) -> JitexprResult {
    let Some(wrapper) = get_context_mut(ctx) else {
        return JitexprResult::ErrorInvalidArg;
    };
    let Some(program) = get_program_mut(program) else {
        wrapper.set_error("program is NULL");
        return JitexprResult::ErrorInvalidArg;
    };
    if out.is_null() {
        wrapper.set_error("out pointer is NULL");
        return JitexprResult::ErrorInvalidArg;
    }
    match program.program.eval() {
        Ok(value) => {
            *out = value;
            wrapper.clear_error();
            JitexprResult::Ok
        }
        Err(err) => {
            wrapper.set_error(err.to_string());
            JitexprResult::ErrorRuntime
        }
    }
}

/// Whether the context compiles to native code (1) or bytecode (0).
///
/// # Safety
///
/// `ctx` must be a valid context or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_uses_jit(ctx: *const JitexprContext) -> bool {
    get_context(ctx).is_some_and(|w| w.context.backend() == crate::config::Backend::Jit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::context_ffi::{jitexpr_context_free, jitexpr_context_new, jitexpr_var};
    use crate::ffi::error::jitexpr_get_error;
    use std::ffi::{CStr, CString};

    #[test]
    fn test_compile_link_eval() {
        unsafe {
            let ctx = jitexpr_context_new(2);
            let name = CString::new("x").unwrap();
            let x = Box::into_raw(Box::new(3.0f64));
            jitexpr_var(ctx, name.as_ptr(), x);

            let source = CString::new("x * x - 1").unwrap();
            let program = jitexpr_compile(ctx, source.as_ptr());
            assert!(!program.is_null());
            assert_eq!(jitexpr_link(ctx, program), JitexprResult::Ok);

            let mut result = 0.0;
            assert_eq!(jitexpr_eval(ctx, program, &mut result), JitexprResult::Ok);
            assert_eq!(result, 8.0);

            *x = 5.0;
            assert_eq!(jitexpr_eval(ctx, program, &mut result), JitexprResult::Ok);
            assert_eq!(result, 24.0);

            jitexpr_program_free(program);
            jitexpr_context_free(ctx);
            drop(Box::from_raw(x));
        }
    }

    #[test]
    fn test_compile_error_message() {
        unsafe {
            let ctx = jitexpr_context_new(0);
            let source = CString::new("1 + )").unwrap();
            let program = jitexpr_compile(ctx, source.as_ptr());
            assert!(program.is_null());
            let message = CStr::from_ptr(jitexpr_get_error(ctx)).to_str().unwrap();
            assert!(message.starts_with("Error, expected"));
            assert!(message.ends_with("1 + )\n    ^"));
            jitexpr_context_free(ctx);
        }
    }

    #[test]
    fn test_eval_before_link() {
        unsafe {
            let ctx = jitexpr_context_new(0);
            let source = CString::new("missing").unwrap();
            let program = jitexpr_compile(ctx, source.as_ptr());
            let mut result = 0.0;
            assert_eq!(
                jitexpr_eval(ctx, program, &mut result),
                JitexprResult::ErrorRuntime
            );
            assert_eq!(jitexpr_link(ctx, program), JitexprResult::ErrorLink);
            let message = CStr::from_ptr(jitexpr_get_error(ctx)).to_str().unwrap();
            assert_eq!(message, "Error: Undefined symbol: 'missing'");
            jitexpr_program_free(program);
            jitexpr_context_free(ctx);
        }
    }
}
