//! jitexpr - arithmetic expressions compiled to bytecode or x86-64 code.
//!
//! Expressions are parsed once, compiled for one of two backends, linked
//! against a [`Context`] holding variables and functions, and then evaluated
//! as often as needed:
//!
//! ```
//! use jitexpr::{Context, Variable};
//!
//! let mut context = Context::new();
//! let t = Variable::new(0.5);
//! context.var("t", &t).unwrap();
//!
//! let mut program = context.compile("mix(0, 10, t)").unwrap();
//! context.link_program(&mut program).unwrap();
//! assert_eq!(program.eval().unwrap(), 5.0);
//!
//! t.set(1.0);
//! assert_eq!(program.eval().unwrap(), 10.0);
//! ```
//!
//! For C/C++ embedding, use the FFI module functions.

pub mod builtins;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod ffi;
pub mod function;
#[cfg(feature = "jit")]
pub mod jit;
pub mod link;
pub mod program;
pub mod vm;

// Re-export commonly used types
pub use config::{Backend, Definitions, JitMode, RuntimeConfig};
pub use context::Context;
pub use error::{CompileError, ContextError, Error, LinkError, RuntimeError};
pub use function::{Function, IntoFunction, NativeFn, Variable};
pub use program::Program;

// Re-export FFI types for C bindings
pub use ffi::*;
