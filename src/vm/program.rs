use super::ops::Op;
use super::stack::Stack;
use crate::context::Context;
use crate::error::{LinkError, RuntimeError};
use crate::function::Wrapper;
use crate::link::{self, Binding, LinkState, Relocation, SymbolTable};
use std::fmt::Write;
use std::mem::size_of;

const PTR_SIZE: usize = size_of::<usize>();

/// A compiled expression for the bytecode interpreter.
///
/// The unlinked bytecode is kept so the program can be linked again; linking
/// produces a separate buffer with every symbol id replaced by addresses.
pub struct InterpretedProgram {
    code: Vec<u8>,
    symbols: SymbolTable,
    relocations: Vec<Relocation>,
    state: LinkState<LinkedBytecode>,
}

struct LinkedBytecode {
    data: Vec<u8>,
    /// Keeps every referenced variable and function alive.
    _bindings: Vec<Binding>,
}

impl InterpretedProgram {
    pub(crate) fn new(code: Vec<u8>, symbols: SymbolTable, relocations: Vec<Relocation>) -> Self {
        Self {
            code,
            symbols,
            relocations,
            state: LinkState::Unlinked,
        }
    }

    /// Unlinked bytecode.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn size(&self) -> usize {
        self.code.len()
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

    /// Resolve every symbol against `context` and build the executable
    /// bytecode. On failure the program refuses to run until linked again.
    pub fn link(&mut self, context: &Context) -> Result<(), LinkError> {
        let result = link::resolve(&self.symbols, context).map(|bindings| LinkedBytecode {
            data: self.rewrite(&bindings),
            _bindings: bindings,
        });
        self.state.settle(result)
    }

    /// Copy the bytecode, replacing each 2-byte symbol id with the symbol's
    /// address, followed by the wrapper address for functions.
    fn rewrite(&self, bindings: &[Binding]) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.code.len() + self.relocations.len() * 2 * PTR_SIZE);
        let mut cursor = 0;
        for reloc in &self.relocations {
            data.extend_from_slice(&self.code[cursor..reloc.offset]);
            match &bindings[reloc.symbol as usize] {
                Binding::Variable(var) => {
                    data.extend_from_slice(&(var.address() as usize).to_le_bytes());
                }
                Binding::Function(function) => {
                    let (target, wrapper) = function.interpreter_target();
                    data.extend_from_slice(&target.to_le_bytes());
                    data.extend_from_slice(&(wrapper as usize).to_le_bytes());
                }
            }
            cursor = reloc.offset + size_of::<u16>();
        }
        data.extend_from_slice(&self.code[cursor..]);
        data
    }

    /// Evaluate on a fresh stack.
    pub fn eval(&self) -> Result<f64, RuntimeError> {
        let mut stack = Stack::new();
        self.eval_on(&mut stack)
    }

    /// Evaluate on `stack`, leaving it as it was found.
    pub(crate) fn eval_on(&self, stack: &mut Stack) -> Result<f64, RuntimeError> {
        let linked = self.state.ready()?;
        let base = stack.depth();
        let result = execute(&linked.data, stack).and_then(|()| stack.pop::<f64>());
        let leftover = stack.depth().saturating_sub(base);
        stack.truncate(base);
        let value = result?;
        if leftover != 0 {
            return Err(RuntimeError::UnbalancedStack(leftover));
        }
        Ok(value)
    }

    /// Listing of the unlinked bytecode.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut pc = 0;
        while pc < self.code.len() {
            let byte = self.code[pc];
            let _ = write!(out, "{:04x}  ", pc);
            let Some(op) = Op::from_u8(byte) else {
                let _ = writeln!(out, "??? 0x{:02x}", byte);
                break;
            };
            pc += 1;
            match op {
                Op::PushConst => match read_u64(&self.code, &mut pc) {
                    Ok(bits) => {
                        let _ = writeln!(out, "{} {}", op.mnemonic(), f64::from_bits(bits));
                    }
                    Err(_) => break,
                },
                Op::LoadVar | Op::Invoke => {
                    let Some(raw) = self.code.get(pc..pc + 2) else {
                        break;
                    };
                    let id = u16::from_le_bytes([raw[0], raw[1]]);
                    pc += 2;
                    let name = self.symbols.name(id).unwrap_or("?");
                    let _ = writeln!(out, "{} #{} {}", op.mnemonic(), id, name);
                }
                _ => {
                    let _ = writeln!(out, "{}", op.mnemonic());
                }
            }
        }
        out
    }
}

/// Run linked bytecode until the end of the buffer.
fn execute(data: &[u8], stack: &mut Stack) -> Result<(), RuntimeError> {
    let mut pc = 0;
    while pc < data.len() {
        let opcode = data[pc];
        let op = Op::from_u8(opcode).ok_or(RuntimeError::InvalidOpcode { opcode, offset: pc })?;
        pc += 1;
        match op {
            Op::PushConst => {
                let value = f64::from_bits(read_u64(data, &mut pc)?);
                stack.push(value)?;
            }
            Op::LoadVar => {
                let address = read_usize(data, &mut pc)?;
                // Linked variables outlive the program through its bindings.
                let value = unsafe { (address as *const f64).read() };
                stack.push(value)?;
            }
            Op::Invoke => {
                let target = read_usize(data, &mut pc)?;
                let wrapper = read_usize(data, &mut pc)?;
                let wrapper: Wrapper = unsafe { std::mem::transmute::<usize, Wrapper>(wrapper) };
                unsafe { wrapper(stack, target)? };
            }
            Op::Add => binary(stack, |l, r| l + r)?,
            Op::Sub => binary(stack, |l, r| l - r)?,
            Op::Mul => binary(stack, |l, r| l * r)?,
            Op::Div => binary(stack, |l, r| l / r)?,
            Op::Neg => {
                let value: f64 = stack.pop()?;
                stack.push(-value)?;
            }
            Op::Discard => {
                stack.pop::<f64>()?;
            }
        }
    }
    Ok(())
}

fn binary(stack: &mut Stack, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
    let rhs: f64 = stack.pop()?;
    let lhs: f64 = stack.pop()?;
    stack.push(op(lhs, rhs))
}

fn read_u64(data: &[u8], pc: &mut usize) -> Result<u64, RuntimeError> {
    let raw = data
        .get(*pc..*pc + 8)
        .ok_or(RuntimeError::TruncatedCode(*pc))?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(raw);
    *pc += 8;
    Ok(u64::from_le_bytes(bytes))
}

fn read_usize(data: &[u8], pc: &mut usize) -> Result<usize, RuntimeError> {
    let raw = data
        .get(*pc..*pc + PTR_SIZE)
        .ok_or(RuntimeError::TruncatedCode(*pc))?;
    let mut bytes = [0u8; PTR_SIZE];
    bytes.copy_from_slice(raw);
    *pc += PTR_SIZE;
    Ok(usize::from_le_bytes(bytes))
}
