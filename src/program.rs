use crate::context::Context;
use crate::error::{LinkError, RuntimeError};
#[cfg(feature = "jit")]
use crate::jit::JitProgram;
use crate::link::SymbolTable;
use crate::vm::{InterpretedProgram, Stack};
use std::fmt;

/// A compiled expression for either backend.
pub enum Program {
    Interpreted(InterpretedProgram),
    #[cfg(feature = "jit")]
    Jit(JitProgram),
}

impl Program {
    /// Evaluate the linked program.
    pub fn eval(&self) -> Result<f64, RuntimeError> {
        match self {
            Program::Interpreted(p) => p.eval(),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.eval(),
        }
    }

    /// Evaluate inside a running interpreter. Native programs ignore the
    /// stack.
    pub(crate) fn eval_on(&self, stack: &mut Stack) -> Result<f64, RuntimeError> {
        match self {
            Program::Interpreted(p) => p.eval_on(stack),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.eval(),
        }
    }

    pub fn link(&mut self, context: &Context) -> Result<(), LinkError> {
        match self {
            Program::Interpreted(p) => p.link(context),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.link(context),
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            Program::Interpreted(p) => p.is_ready(),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.is_ready(),
        }
    }

    pub fn link_error(&self) -> Option<&LinkError> {
        match self {
            Program::Interpreted(p) => p.link_error(),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.link_error(),
        }
    }

    /// Entry point native code can call directly.
    pub(crate) fn native_entry(&self) -> Option<usize> {
        match self {
            Program::Interpreted(_) => None,
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.native_entry(),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        match self {
            Program::Interpreted(p) => p.symbols(),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.symbols(),
        }
    }

    /// Size of the unlinked code in bytes.
    pub fn size(&self) -> usize {
        match self {
            Program::Interpreted(p) => p.size(),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.size(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Program::Interpreted(_) => "interpreted",
            #[cfg(feature = "jit")]
            Program::Jit(_) => "jit",
        }
    }

    /// Bytecode listing or IR plus machine code, depending on the backend.
    pub fn disassemble(&self) -> String {
        match self {
            Program::Interpreted(p) => p.disassemble(),
            #[cfg(feature = "jit")]
            Program::Jit(p) => p.disassemble(),
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("backend", &self.backend_name())
            .field("size", &self.size())
            .field("ready", &self.is_ready())
            .finish()
    }
}
