//! Front end: source text to a program for either backend.

pub mod ast;
mod codegen;
pub mod lexer;
pub mod mangle;
mod parser;
pub mod source;

pub use codegen::BytecodeGenerator;
pub use lexer::Lexer;
pub use parser::Parser;

use crate::config::Backend;
use crate::error::CompileError;
use crate::program::Program;
use crate::vm::InterpretedProgram;

/// Parse `source` into an AST.
pub fn parse(source: &str) -> Result<ast::Node, CompileError> {
    Parser::parse(source)
}

pub fn compile_interpreted(source: &str) -> Result<InterpretedProgram, CompileError> {
    let root = parse(source)?;
    let program = BytecodeGenerator::new().generate(&root)?;
    log::debug!(
        "compiled {} AST nodes into {} bytes of bytecode",
        root.size(),
        program.size()
    );
    Ok(program)
}

#[cfg(feature = "jit")]
pub fn compile_jit(source: &str, optimize: bool) -> Result<crate::jit::JitProgram, CompileError> {
    let root = parse(source)?;
    crate::jit::JitGenerator::new().optimize(optimize).generate(&root)
}

/// Compile `source` for `backend`. The result still has to be linked.
pub fn compile(source: &str, backend: Backend, optimize: bool) -> Result<Program, CompileError> {
    match backend {
        Backend::Interpreted => compile_interpreted(source).map(Program::Interpreted),
        #[cfg(feature = "jit")]
        Backend::Jit => compile_jit(source, optimize).map(Program::Jit),
        #[cfg(not(feature = "jit"))]
        Backend::Jit => {
            let _ = optimize;
            compile_interpreted(source).map(Program::Interpreted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_reports_parse_errors() {
        let err = compile("(1 + 2", Backend::Interpreted, true).err().unwrap();
        assert_eq!(err.message, "Error: Unexpected end of input");
    }

    #[test]
    fn test_compile_selects_backend() {
        let program = compile("1", Backend::Interpreted, true).unwrap();
        assert!(matches!(program, Program::Interpreted(_)));
    }
}
