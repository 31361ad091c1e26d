//! FFI type definitions for the C API.

use crate::context::Context;
use crate::error::{ContextError, LinkError};
use crate::program::Program;
use std::ffi::{CStr, CString, c_char, c_void};

/// Result codes for FFI operations.
///
/// These map to the `JitexprResult` enum in C.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitexprResult {
    /// Operation succeeded
    Ok = 0,
    /// Expression failed to lex or parse
    ErrorCompile = 1,
    /// A symbol could not be resolved
    ErrorLink = 2,
    /// Evaluation failed
    ErrorRuntime = 3,
    /// Invalid argument passed to function
    ErrorInvalidArg = 4,
    /// Name already registered
    ErrorAlreadyDefined = 5,
    /// JIT requested on a build that cannot run it
    ErrorUnsupported = 6,
}

impl JitexprResult {
    pub fn is_ok(self) -> bool {
        self == JitexprResult::Ok
    }

    pub fn is_err(self) -> bool {
        self != JitexprResult::Ok
    }
}

impl From<&ContextError> for JitexprResult {
    fn from(err: &ContextError) -> Self {
        match err {
            ContextError::AlreadyDefined(_) => JitexprResult::ErrorAlreadyDefined,
            ContextError::Compile { .. } => JitexprResult::ErrorCompile,
            ContextError::JitUnavailable => JitexprResult::ErrorUnsupported,
            ContextError::TooManyArguments { .. } | ContextError::NullVariable(_) => {
                JitexprResult::ErrorInvalidArg
            }
        }
    }
}

impl From<&LinkError> for JitexprResult {
    fn from(err: &LinkError) -> Self {
        match err {
            LinkError::UnsupportedTarget => JitexprResult::ErrorUnsupported,
            _ => JitexprResult::ErrorLink,
        }
    }
}

/// Host function type.
///
/// Receives `argc` arguments at `args` and the userdata given at
/// registration, and returns the result.
pub type JitexprFunc =
    unsafe extern "C" fn(args: *const f64, argc: usize, userdata: *mut c_void) -> f64;

/// Opaque context handle.
///
/// Created by `jitexpr_context_new()`, freed by `jitexpr_context_free()`.
#[repr(C)]
pub struct JitexprContext {
    _private: [u8; 0],
}

/// Opaque compiled program handle.
///
/// Created by `jitexpr_compile()`, freed by `jitexpr_program_free()`.
#[repr(C)]
pub struct JitexprProgram {
    _private: [u8; 0],
}

/// Internal wrapper holding the context and FFI state.
pub(crate) struct ContextWrapper {
    pub context: Context,
    /// Last error message (as CString for FFI compatibility)
    pub last_error: Option<CString>,
}

impl ContextWrapper {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            last_error: None,
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        let msg = message.into().replace('\0', " ");
        self.last_error = CString::new(msg).ok();
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}

pub(crate) struct ProgramWrapper {
    pub program: Program,
}

pub(crate) unsafe fn get_context_mut<'a>(ctx: *mut JitexprContext) -> Option<&'a mut ContextWrapper> {
    if ctx.is_null() {
        None
    } else {
        Some(unsafe { &mut *(ctx as *mut ContextWrapper) })
    }
}

pub(crate) unsafe fn get_context<'a>(ctx: *const JitexprContext) -> Option<&'a ContextWrapper> {
    if ctx.is_null() {
        None
    } else {
        Some(unsafe { &*(ctx as *const ContextWrapper) })
    }
}

pub(crate) unsafe fn get_program_mut<'a>(program: *mut JitexprProgram) -> Option<&'a mut ProgramWrapper> {
    if program.is_null() {
        None
    } else {
        Some(unsafe { &mut *(program as *mut ProgramWrapper) })
    }
}

/// Borrow a NUL-terminated UTF-8 argument.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}
