use super::compiler::hex_dump;
use super::ir::{self, Inst};
#[cfg(target_arch = "x86_64")]
use super::memory::ExecutableMemory;
use crate::context::Context;
use crate::error::{LinkError, RuntimeError};
use crate::link::{self, Binding, LinkState, RelocKind, Relocation, SymbolTable};

type Entry = extern "C" fn() -> f64;

/// A compiled expression as native x86-64 code.
///
/// The unpatched code is kept so the program can be linked again; every link
/// patches a fresh copy and maps it into new executable memory.
pub struct JitProgram {
    code: Vec<u8>,
    insts: Vec<Inst>,
    symbols: SymbolTable,
    relocations: Vec<Relocation>,
    state: LinkState<LinkedCode>,
}

#[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
struct LinkedCode {
    #[cfg(target_arch = "x86_64")]
    _memory: ExecutableMemory,
    entry: Entry,
    _bindings: Vec<Binding>,
}

impl JitProgram {
    pub(crate) fn new(
        code: Vec<u8>,
        insts: Vec<Inst>,
        symbols: SymbolTable,
        relocations: Vec<Relocation>,
    ) -> Self {
        Self {
            code,
            insts,
            symbols,
            relocations,
            state: LinkState::Unlinked,
        }
    }

    /// Unpatched machine code.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn size(&self) -> usize {
        self.code.len()
    }

    pub fn instructions(&self) -> &[Inst] {
        &self.insts
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn link_error(&self) -> Option<&LinkError> {
        self.state.error()
    }

    pub fn link(&mut self, context: &Context) -> Result<(), LinkError> {
        let result = link::resolve(&self.symbols, context).and_then(|bindings| {
            let code = self.patch(&bindings);
            load(&code).map(|(_memory, entry)| LinkedCode {
                #[cfg(target_arch = "x86_64")]
                _memory,
                entry,
                _bindings: bindings,
            })
        });
        self.state.settle(result)
    }

    /// Copy of the code with every relocation filled in.
    fn patch(&self, bindings: &[Binding]) -> Vec<u8> {
        let mut code = self.code.clone();
        for reloc in &self.relocations {
            let value = match (&bindings[reloc.symbol as usize], reloc.kind) {
                (Binding::Variable(var), RelocKind::Address) => var.address() as usize,
                (Binding::Variable(_), RelocKind::Environment) => 0,
                (Binding::Function(function), RelocKind::Address) => function.native_target().0,
                (Binding::Function(function), RelocKind::Environment) => function.native_target().1,
            };
            code[reloc.offset..reloc.offset + 8].copy_from_slice(&(value as u64).to_le_bytes());
        }
        code
    }

    pub fn eval(&self) -> Result<f64, RuntimeError> {
        let linked = self.state.ready()?;
        Ok((linked.entry)())
    }

    /// Address of the linked code, if any.
    pub fn native_entry(&self) -> Option<usize> {
        match &self.state {
            LinkState::Ready(linked) => Some(linked.entry as usize),
            _ => None,
        }
    }

    /// Optimized IR followed by a hex dump of the unpatched code.
    pub fn disassemble(&self) -> String {
        format!("{}\n{}", ir::listing(&self.insts), hex_dump(&self.code))
    }
}

#[cfg(target_arch = "x86_64")]
fn load(code: &[u8]) -> Result<(ExecutableMemory, Entry), LinkError> {
    let mut memory = ExecutableMemory::new(code.len())?;
    memory.write(0, code)?;
    memory.make_executable()?;
    let entry = unsafe { memory.as_fn::<Entry>() }.ok_or(LinkError::UnsupportedTarget)?;
    Ok((memory, entry))
}

#[cfg(not(target_arch = "x86_64"))]
fn load(_code: &[u8]) -> Result<((), Entry), LinkError> {
    Err(LinkError::UnsupportedTarget)
}

#[cfg(all(test, target_arch = "x86_64", unix))]
mod tests {
    use super::*;
    use crate::compiler::compile_jit;
    use crate::function::Variable;

    fn linked(source: &str, context: &Context) -> JitProgram {
        let mut program = compile_jit(source, true).unwrap();
        program.link(context).unwrap();
        program
    }

    fn eval(source: &str) -> f64 {
        linked(source, &Context::new()).eval().unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2"), 2.0);
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("1 / 4"), 0.25);
        assert_eq!(eval("-(2 + 3)"), -5.0);
        assert_eq!(eval("1; 2; 3"), 3.0);
    }

    #[test]
    fn test_negative_zero() {
        assert_eq!(eval("-0").to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn test_builtin_calls() {
        assert_eq!(eval("sqrt(16)"), 4.0);
        assert_eq!(eval("1 + max(2, 5)"), 6.0);
        assert_eq!(eval("clamp(5, 0, 1)"), 1.0);
        assert!((eval("sin(0) + cos(0)") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_variables_are_read_live() {
        let mut context = Context::new();
        let x = Variable::new(3.0);
        context.var("x", &x).unwrap();
        let program = linked("x * x + 1", &context);
        assert_eq!(program.eval().unwrap(), 10.0);
        x.set(4.0);
        assert_eq!(program.eval().unwrap(), 17.0);
    }

    #[test]
    fn test_closure_with_eight_arguments() {
        let mut context = Context::new();
        context
            .func(
                "sum8",
                |a: f64, b: f64, c: f64, d: f64, e: f64, f: f64, g: f64, h: f64| {
                    a + 2.0 * b + 3.0 * c + 4.0 * d + 5.0 * e + 6.0 * f + 7.0 * g + 8.0 * h
                },
            )
            .unwrap();
        let program = linked("sum8(1, 1, 1, 1, 1, 1, 1, 1)", &context);
        assert_eq!(program.eval().unwrap(), 36.0);
        let program = linked("1 + sum8(8, 7, 6, 5, 4, 3, 2, 1)", &context);
        assert_eq!(program.eval().unwrap(), 121.0);
    }

    #[test]
    fn test_relink_picks_up_new_code() {
        let context = Context::new();
        let mut program = compile_jit("pow(2, 10)", true).unwrap();
        program.link(&context).unwrap();
        let first = program.native_entry();
        program.link(&context).unwrap();
        assert_eq!(program.eval().unwrap(), 1024.0);
        assert!(first.is_some());
        assert!(program.native_entry().is_some());
    }

    #[test]
    fn test_unresolved_symbol() {
        let mut program = compile_jit("nope(1)", true).unwrap();
        let err = program.link(&Context::new()).unwrap_err();
        assert_eq!(err.to_string(), "Error: Undefined symbol: 'double nope(double)'");
        assert!(matches!(program.eval(), Err(RuntimeError::LinkFailed(_))));
        assert_eq!(program.native_entry(), None);
    }

    #[test]
    fn test_disassemble_lists_ir_and_bytes() {
        let program = compile_jit("1", true).unwrap();
        let text = program.disassemble();
        assert!(text.starts_with("movabs rax, 0x3ff0000000000000\nmovq xmm0, rax\nret\n"));
        assert!(text.contains("0000  48 b8"));
    }
}
