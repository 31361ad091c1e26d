//! Stack-machine IR the expression compiler emits before encoding.
//!
//! Each instruction maps to exactly one x86-64 instruction. Values live on
//! the hardware stack between operations; `rax` and `xmm0..xmm7` are scratch.

use std::fmt;

/// A 64-bit immediate, either known now or patched in at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Imm {
    Value(u64),
    Symbol(u16),
}

impl fmt::Display for Imm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imm::Value(v) => write!(f, "{:#x}", v),
            Imm::Symbol(id) => write!(f, "<#{}>", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inst {
    MovAbsRax(Imm),
    /// Environment pointer for the next call.
    MovAbsRdi(Imm),
    RaxToXmm(u8),
    XmmToRax(u8),
    PushRax,
    PopRax,
    /// Push the qword `rax` points at.
    PushMemRax,
    /// `xmm0 op= xmm1`
    AddSd,
    SubSd,
    MulSd,
    DivSd,
    XorPd,
    CallRax,
    Ret,
    /// `sub rsp, 8` so the next call sees a 16-byte aligned stack.
    AlignStack,
    RestoreStack,
}

impl Inst {
    fn reads_rax(self) -> bool {
        matches!(
            self,
            Inst::PushRax | Inst::PushMemRax | Inst::CallRax | Inst::RaxToXmm(_)
        )
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::MovAbsRax(imm) => write!(f, "movabs rax, {}", imm),
            Inst::MovAbsRdi(imm) => write!(f, "movabs rdi, {}", imm),
            Inst::RaxToXmm(n) => write!(f, "movq xmm{}, rax", n),
            Inst::XmmToRax(n) => write!(f, "movq rax, xmm{}", n),
            Inst::PushRax => write!(f, "push rax"),
            Inst::PopRax => write!(f, "pop rax"),
            Inst::PushMemRax => write!(f, "push qword [rax]"),
            Inst::AddSd => write!(f, "addsd xmm0, xmm1"),
            Inst::SubSd => write!(f, "subsd xmm0, xmm1"),
            Inst::MulSd => write!(f, "mulsd xmm0, xmm1"),
            Inst::DivSd => write!(f, "divsd xmm0, xmm1"),
            Inst::XorPd => write!(f, "xorpd xmm0, xmm1"),
            Inst::CallRax => write!(f, "call rax"),
            Inst::Ret => write!(f, "ret"),
            Inst::AlignStack => write!(f, "sub rsp, 8"),
            Inst::RestoreStack => write!(f, "add rsp, 8"),
        }
    }
}

/// Remove redundant moves until nothing changes:
///
/// - `push rax; pop rax`
/// - `movq rax, xmmN; movq xmmN, rax` when `rax` is dead afterwards
pub fn optimize(insts: &mut Vec<Inst>) {
    let before = insts.len();
    loop {
        let len = insts.len();
        let mut out = Vec::with_capacity(len);
        let mut i = 0;
        while i < len {
            let next = insts.get(i + 1).copied();
            let redundant = match (insts[i], next) {
                (Inst::PushRax, Some(Inst::PopRax)) => true,
                (Inst::XmmToRax(a), Some(Inst::RaxToXmm(b))) if a == b => {
                    insts.get(i + 2).is_none_or(|after| !after.reads_rax())
                }
                _ => false,
            };
            if redundant {
                i += 2;
            } else {
                out.push(insts[i]);
                i += 1;
            }
        }
        *insts = out;
        if insts.len() == len {
            break;
        }
    }
    log::debug!("peephole: {} -> {} instructions", before, insts.len());
}

/// One instruction per line.
pub fn listing(insts: &[Inst]) -> String {
    insts.iter().map(|inst| format!("{}\n", inst)).collect()
}
