use crate::compiler::ast::{Expr, Node};
use crate::compiler::source::Span;
use crate::error::CompileError;
use crate::link::{RelocKind, Relocation, SymbolKind, SymbolTable};
use crate::vm::{InterpretedProgram, Op};

/// Initial capacity of the bytecode buffer.
const INITIAL_CAPACITY: usize = 512;

/// Generates bytecode for the interpreted backend.
///
/// Symbol references are emitted as a `u16` id with a relocation entry at
/// the id's offset; the linker later replaces them with addresses.
pub struct BytecodeGenerator {
    code: Vec<u8>,
    symbols: SymbolTable,
    relocations: Vec<Relocation>,
}

impl BytecodeGenerator {
    pub fn new() -> Self {
        Self {
            code: Vec::with_capacity(INITIAL_CAPACITY),
            symbols: SymbolTable::new(),
            relocations: Vec::new(),
        }
    }

    pub fn generate(mut self, root: &Node) -> Result<InterpretedProgram, CompileError> {
        self.emit(root)?;
        Ok(InterpretedProgram::new(
            self.code,
            self.symbols,
            self.relocations,
        ))
    }

    fn emit(&mut self, node: &Node) -> Result<(), CompileError> {
        match &node.expr {
            Expr::Float(value) => {
                self.emit_op(Op::PushConst);
                self.code.extend_from_slice(&value.to_le_bytes());
            }
            Expr::Variable(name) => {
                self.emit_op(Op::LoadVar);
                self.emit_symbol(name, SymbolKind::Variable, node.span)?;
            }
            Expr::Call { name, args } => {
                for arg in args {
                    self.emit(arg)?;
                }
                self.emit_op(Op::Invoke);
                self.emit_symbol(
                    name,
                    SymbolKind::Function { arity: args.len() },
                    node.span,
                )?;
            }
            Expr::Add(l, r) => self.emit_binary(l, r, Op::Add)?,
            Expr::Sub(l, r) => self.emit_binary(l, r, Op::Sub)?,
            Expr::Mul(l, r) => self.emit_binary(l, r, Op::Mul)?,
            Expr::Div(l, r) => self.emit_binary(l, r, Op::Div)?,
            Expr::Neg(operand) => {
                self.emit(operand)?;
                self.emit_op(Op::Neg);
            }
            Expr::Plus(operand) => self.emit(operand)?,
            Expr::Combine(first, second) => {
                self.emit(first)?;
                self.emit_op(Op::Discard);
                self.emit(second)?;
            }
        }
        Ok(())
    }

    fn emit_binary(&mut self, lhs: &Node, rhs: &Node, op: Op) -> Result<(), CompileError> {
        self.emit(lhs)?;
        self.emit(rhs)?;
        self.emit_op(op);
        Ok(())
    }

    fn emit_op(&mut self, op: Op) {
        self.code.push(op as u8);
    }

    /// Write the symbol's id and record a relocation for this use site.
    fn emit_symbol(&mut self, name: &str, kind: SymbolKind, span: Span) -> Result<(), CompileError> {
        let id = match kind {
            SymbolKind::Variable => self.symbols.intern_variable(name),
            SymbolKind::Function { arity } => self.symbols.intern_function(name, arity),
        }
        .ok_or_else(|| {
            CompileError::new(
                format!("Error, too many distinct symbols at position {}.", span.start),
                span,
                String::new(),
            )
        })?;
        self.relocations.push(Relocation {
            symbol: id,
            offset: self.code.len(),
            kind: RelocKind::Address,
        });
        self.code.extend_from_slice(&id.to_le_bytes());
        Ok(())
    }
}

impl Default for BytecodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
