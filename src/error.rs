//! Error types for every phase of the pipeline.
//!
//! Compilation, linking and evaluation each get their own enum so callers can
//! tell a bad expression apart from a missing symbol or a runtime fault.

use crate::compiler::source::Span;

/// A lexer or parser failure.
///
/// `Display` renders the message followed by the source line with the
/// offending span underlined by carets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}\n{excerpt}")]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub excerpt: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span, excerpt: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
            excerpt: excerpt.into(),
        }
    }

    /// 0-based offset of the first offending character.
    pub fn position(&self) -> usize {
        self.span.start
    }
}

/// Failure while allocating or protecting executable memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("memory allocation failed")]
    AllocationFailed,
    #[error("memory protection change failed")]
    ProtectionFailed,
    #[error("invalid memory size")]
    InvalidSize,
}

/// Failure while resolving the symbols of a compiled program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// `symbol` is the mangled key, `signature` its human-readable form.
    #[error("Error: Undefined symbol: '{signature}'")]
    UnresolvedSymbol { symbol: String, signature: String },
    #[error("Error: recursive definition of '{0}'")]
    RecursiveDefinition(String),
    #[error("Error: '{0}' is used before it was successfully linked")]
    DependencyNotLinked(String),
    #[error("Error: native code cannot run on this target")]
    UnsupportedTarget,
    #[error("Error: {0}")]
    Memory(#[from] MemoryError),
}

/// Failure while evaluating a program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("program has not been linked")]
    NotLinked,
    #[error("program failed to link: {0}")]
    LinkFailed(LinkError),
    #[error("evaluation stack overflow")]
    StackOverflow,
    #[error("evaluation stack underflow")]
    StackUnderflow,
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("bytecode truncated at offset {0}")]
    TruncatedCode(usize),
    #[error("evaluation left {0} bytes on the stack")]
    UnbalancedStack(usize),
    #[error("program '{0}' is already borrowed")]
    ProgramBusy(String),
}

/// Failure while registering something in a [`crate::Context`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("'{0}' is already defined")]
    AlreadyDefined(String),
    #[error("'{name}' takes {arity} arguments, at most {max} are supported")]
    TooManyArguments {
        name: String,
        arity: usize,
        max: usize,
    },
    #[error("in definition of '{name}':\n{source}")]
    Compile { name: String, source: CompileError },
    #[error("variable '{0}' points at null")]
    NullVariable(String),
    #[error("JIT backend is not available on this build")]
    JitUnavailable,
}

/// Any error the library can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Context(#[from] ContextError),
}
