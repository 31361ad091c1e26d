//! Expression compiler for x86-64.
//!
//! The AST is lowered to [`Inst`] with every intermediate value on the
//! hardware stack, peephole-optimized, then encoded. Symbol addresses are
//! emitted as zeroed `movabs` immediates with a relocation at the immediate.

use super::codebuf::CodeBuffer;
use super::ir::{self, Imm, Inst};
use super::program::JitProgram;
use super::x86_64::{Reg, X86_64Assembler};
use crate::compiler::ast::{Expr, Node};
use crate::compiler::source::Span;
use crate::error::CompileError;
use crate::function::MAX_ARITY;
use crate::link::{RelocKind, Relocation, SymbolKind, SymbolTable};
use std::fmt::Write;

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Lowers an AST to a [`JitProgram`].
pub struct JitGenerator {
    insts: Vec<Inst>,
    symbols: SymbolTable,
    /// Qwords pushed since entry.
    depth: usize,
    optimize: bool,
}

impl JitGenerator {
    pub fn new() -> Self {
        Self {
            insts: Vec::new(),
            symbols: SymbolTable::new(),
            depth: 0,
            optimize: true,
        }
    }

    /// Enable or disable the peephole pass.
    pub fn optimize(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }

    pub fn generate(mut self, root: &Node) -> Result<JitProgram, CompileError> {
        self.emit(root)?;
        self.pop_rax();
        self.insts.push(Inst::RaxToXmm(0));
        self.insts.push(Inst::Ret);

        if self.optimize {
            log::trace!("jit ir before optimization:\n{}", ir::listing(&self.insts));
            ir::optimize(&mut self.insts);
        }
        log::trace!("jit ir:\n{}", ir::listing(&self.insts));

        let (code, relocations) = translate(&self.insts);
        log::debug!(
            "jit: {} instructions, {} bytes, {} relocations",
            self.insts.len(),
            code.len(),
            relocations.len()
        );
        log::trace!("jit code:\n{}", hex_dump(&code));
        Ok(JitProgram::new(code, self.insts, self.symbols, relocations))
    }

    fn emit(&mut self, node: &Node) -> Result<(), CompileError> {
        match &node.expr {
            Expr::Float(value) => {
                self.insts.push(Inst::MovAbsRax(Imm::Value(value.to_bits())));
                self.push_rax();
            }
            Expr::Variable(name) => {
                let id = self.symbol(name, SymbolKind::Variable, node.span)?;
                self.insts.push(Inst::MovAbsRax(Imm::Symbol(id)));
                self.insts.push(Inst::PushMemRax);
                self.depth += 1;
            }
            Expr::Call { name, args } => self.emit_call(name, args, node.span)?,
            Expr::Add(l, r) => self.emit_binary(l, r, Inst::AddSd)?,
            Expr::Sub(l, r) => self.emit_binary(l, r, Inst::SubSd)?,
            Expr::Mul(l, r) => self.emit_binary(l, r, Inst::MulSd)?,
            Expr::Div(l, r) => self.emit_binary(l, r, Inst::DivSd)?,
            Expr::Neg(operand) => {
                self.emit(operand)?;
                self.pop_rax();
                self.insts.push(Inst::RaxToXmm(0));
                self.insts.push(Inst::MovAbsRax(Imm::Value(SIGN_BIT)));
                self.insts.push(Inst::RaxToXmm(1));
                self.insts.push(Inst::XorPd);
                self.insts.push(Inst::XmmToRax(0));
                self.push_rax();
            }
            Expr::Plus(operand) => self.emit(operand)?,
            Expr::Combine(first, second) => {
                self.emit(first)?;
                self.pop_rax();
                self.emit(second)?;
            }
        }
        Ok(())
    }

    fn emit_binary(&mut self, lhs: &Node, rhs: &Node, op: Inst) -> Result<(), CompileError> {
        self.emit(lhs)?;
        self.emit(rhs)?;
        self.pop_rax();
        self.insts.push(Inst::RaxToXmm(1));
        self.pop_rax();
        self.insts.push(Inst::RaxToXmm(0));
        self.insts.push(op);
        self.insts.push(Inst::XmmToRax(0));
        self.push_rax();
        Ok(())
    }

    fn emit_call(&mut self, name: &str, args: &[Node], span: Span) -> Result<(), CompileError> {
        if args.len() > MAX_ARITY {
            return Err(CompileError::new(
                format!(
                    "Error, function \"{}\" is called with {} arguments, at most {} are supported, at position {}.",
                    name,
                    args.len(),
                    MAX_ARITY,
                    span.start
                ),
                span,
                String::new(),
            ));
        }
        for arg in args {
            self.emit(arg)?;
        }
        // Arguments are interned first, matching the bytecode generator.
        let id = self.symbol(name, SymbolKind::Function { arity: args.len() }, span)?;
        for reg in (0..args.len()).rev() {
            self.pop_rax();
            self.insts.push(Inst::RaxToXmm(reg as u8));
        }

        // Entry leaves rsp at 8 mod 16, so an even depth is misaligned.
        let align = self.depth % 2 == 0;
        if align {
            self.insts.push(Inst::AlignStack);
        }
        self.insts.push(Inst::MovAbsRdi(Imm::Symbol(id)));
        self.insts.push(Inst::MovAbsRax(Imm::Symbol(id)));
        self.insts.push(Inst::CallRax);
        if align {
            self.insts.push(Inst::RestoreStack);
        }
        self.insts.push(Inst::XmmToRax(0));
        self.push_rax();
        Ok(())
    }

    fn push_rax(&mut self) {
        self.insts.push(Inst::PushRax);
        self.depth += 1;
    }

    fn pop_rax(&mut self) {
        self.insts.push(Inst::PopRax);
        self.depth -= 1;
    }

    fn symbol(&mut self, name: &str, kind: SymbolKind, span: Span) -> Result<u16, CompileError> {
        let id = match kind {
            SymbolKind::Variable => self.symbols.intern_variable(name),
            SymbolKind::Function { arity } => self.symbols.intern_function(name, arity),
        };
        id.ok_or_else(|| {
            CompileError::new(
                format!("Error, too many distinct symbols at position {}.", span.start),
                span,
                String::new(),
            )
        })
    }
}

impl Default for JitGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `insts`, returning the code and its relocations.
pub fn translate(insts: &[Inst]) -> (Vec<u8>, Vec<Relocation>) {
    let mut buf = CodeBuffer::with_capacity(insts.len() * 6);
    let mut relocations = Vec::new();
    {
        let mut asm = X86_64Assembler::new(&mut buf);
        for inst in insts {
            match *inst {
                Inst::MovAbsRax(imm) | Inst::MovAbsRdi(imm) => {
                    let (reg, kind) = match inst {
                        Inst::MovAbsRdi(_) => (Reg::Rdi, RelocKind::Environment),
                        _ => (Reg::Rax, RelocKind::Address),
                    };
                    match imm {
                        Imm::Value(value) => asm.mov_ri64(reg, value),
                        Imm::Symbol(symbol) => {
                            asm.mov_ri64(reg, 0);
                            relocations.push(Relocation {
                                symbol,
                                offset: asm.offset() - 8,
                                kind,
                            });
                        }
                    }
                }
                Inst::RaxToXmm(n) => asm.movq_xmm_r64(n, Reg::Rax),
                Inst::XmmToRax(n) => asm.movq_r64_xmm(Reg::Rax, n),
                Inst::PushRax => asm.push(Reg::Rax),
                Inst::PopRax => asm.pop(Reg::Rax),
                Inst::PushMemRax => asm.push_m(Reg::Rax),
                Inst::AddSd => asm.addsd(0, 1),
                Inst::SubSd => asm.subsd(0, 1),
                Inst::MulSd => asm.mulsd(0, 1),
                Inst::DivSd => asm.divsd(0, 1),
                Inst::XorPd => asm.xorpd(0, 1),
                Inst::CallRax => asm.call_r(Reg::Rax),
                Inst::Ret => asm.ret(),
                Inst::AlignStack => asm.sub_ri8(Reg::Rsp, 8),
                Inst::RestoreStack => asm.add_ri8(Reg::Rsp, 8),
            }
        }
    }
    (buf.into_code(), relocations)
}

/// Classic 16-bytes-per-line hex listing.
pub fn hex_dump(code: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in code.chunks(16).enumerate() {
        let _ = write!(out, "{:04x} ", line * 16);
        for byte in chunk {
            let _ = write!(out, " {:02x}", byte);
        }
        out.push('\n');
    }
    out
}
