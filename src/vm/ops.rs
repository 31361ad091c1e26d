/// Bytecode opcodes of the interpreted backend.
///
/// Each opcode is one byte, followed by its inline operand if it has one.
/// Operands are little-endian.
///
/// | opcode | operand before link | operand after link |
/// | --- | --- | --- |
/// | `PushConst` | `f64` | `f64` |
/// | `LoadVar` | `u16` symbol id | address of the `f64` |
/// | `Invoke` | `u16` symbol id | target address, wrapper address |
///
/// The remaining opcodes take no operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    // ========================================
    // Values
    // ========================================
    PushConst = 1,
    LoadVar = 2,
    Invoke = 3,

    // ========================================
    // f64 Arithmetic
    // ========================================
    Add = 4,
    Sub = 5,
    Mul = 6,
    Div = 7,
    Neg = 8,

    // ========================================
    // Stack Manipulation
    // ========================================
    /// Drops the top value (left side of a `;` sequence).
    Discard = 9,
}

impl Op {
    pub fn from_u8(byte: u8) -> Option<Op> {
        let op = match byte {
            1 => Op::PushConst,
            2 => Op::LoadVar,
            3 => Op::Invoke,
            4 => Op::Add,
            5 => Op::Sub,
            6 => Op::Mul,
            7 => Op::Div,
            8 => Op::Neg,
            9 => Op::Discard,
            _ => return None,
        };
        Some(op)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::PushConst => "PUSH_CONST",
            Op::LoadVar => "LOAD_VAR",
            Op::Invoke => "INVOKE",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Neg => "NEG",
            Op::Discard => "DISCARD",
        }
    }
}
