//! Stack-based bytecode interpreter.

mod ops;
mod program;
mod stack;

pub use ops::Op;
pub use program::InterpretedProgram;
pub use stack::{MAX_CALL_DEPTH, STACK_SIZE, Stack, StackValue};
