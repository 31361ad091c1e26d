//! Error handling FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::{JitexprContext, get_context, get_context_mut};
use std::ffi::c_char;

/// Get the last error message.
///
/// Returns a pointer to the error message string, or NULL if no error.
/// The returned pointer is valid until the next API call on `ctx`.
///
/// # Example (C)
/// ```c
/// JitexprProgram *p = jitexpr_compile(ctx, "1 + ");
/// if (p == NULL) {
///     printf("%s\n", jitexpr_get_error(ctx));
/// }
/// ```
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_get_error(ctx: *const JitexprContext) -> *const c_char {
    get_context(ctx)
        .and_then(|wrapper| wrapper.last_error.as_ref())
        .map_or(std::ptr::null(), |error| error.as_ptr())
}

/// Clear the last error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_clear_error(ctx: *mut JitexprContext) {
    if let Some(wrapper) = get_context_mut(ctx) {
        wrapper.clear_error();
    }
}

/// Check if there is a pending error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitexpr_has_error(ctx: *const JitexprContext) -> bool {
    get_context(ctx).is_some_and(|wrapper| wrapper.last_error.is_some())
}
