//! C FFI for embedding the expression evaluator.
//!
//! All public functions use `extern "C"` ABI. The header is generated into
//! `include/jitexpr.h` by the build script.
//!
//! # Safety
//!
//! All FFI functions that take raw pointers require:
//! - Non-null pointers (unless documented otherwise)
//! - Valid handles created by `jitexpr_context_new()` / `jitexpr_compile()`
//! - Proper lifetime management (programs are freed before their context,
//!   and registered variables outlive both)

mod context_ffi;
mod error;
mod program_ffi;
mod types;

// Re-export all FFI types and functions for public use
#[allow(unused_imports)]
pub use context_ffi::*;
#[allow(unused_imports)]
pub use error::*;
#[allow(unused_imports)]
pub use program_ffi::*;
#[allow(unused_imports)]
pub use types::{JitexprContext, JitexprFunc, JitexprProgram, JitexprResult};

/// Version information
pub const JITEXPR_VERSION_MAJOR: u32 = 0;
pub const JITEXPR_VERSION_MINOR: u32 = 1;
pub const JITEXPR_VERSION_PATCH: u32 = 0;

/// Get the version string
#[unsafe(no_mangle)]
pub extern "C" fn jitexpr_version() -> *const std::ffi::c_char {
    static VERSION: &[u8] = b"0.1.0\0";
    VERSION.as_ptr() as *const std::ffi::c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = unsafe { std::ffi::CStr::from_ptr(jitexpr_version()).to_str().unwrap() };
        assert_eq!(
            version,
            format!(
                "{}.{}.{}",
                JITEXPR_VERSION_MAJOR, JITEXPR_VERSION_MINOR, JITEXPR_VERSION_PATCH
            )
        );
    }
}
