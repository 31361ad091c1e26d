//! Native code backend for x86-64.
//!
//! - Executable memory allocation
//! - Code buffer and x86-64 instruction encoding
//! - Expression compiler with a peephole pass
//! - Linking by patching absolute addresses into the code
//!
//! This module is only compiled when the `jit` feature is enabled. Code can be
//! generated on any target, but linking fails with
//! [`LinkError::UnsupportedTarget`](crate::error::LinkError) off x86-64.

mod codebuf;
pub mod compiler;
pub mod ir;
mod memory;
mod program;
mod x86_64;

pub use compiler::{JitGenerator, hex_dump, translate};
pub use ir::{Imm, Inst};
pub use memory::ExecutableMemory;
pub use program::JitProgram;
