//! x86-64 instruction encoding for the JIT.
//!
//! Only the handful of instructions the expression compiler needs: 64-bit
//! immediates, the hardware stack, indirect calls and scalar SSE2 arithmetic.
//! Calls follow the System V AMD64 ABI.

use super::codebuf::CodeBuffer;

/// The general-purpose registers the generated code touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    Rax = 0, // Return value, call target
    Rsp = 4, // Stack pointer
    Rdi = 7, // 1st integer argument (function environment)
}

impl Reg {
    /// Register code for ModR/M and opcode+reg encodings.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// x86-64 assembler.
pub struct X86_64Assembler<'a> {
    buf: &'a mut CodeBuffer,
}

impl<'a> X86_64Assembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self { buf }
    }

    /// Offset of the next instruction.
    pub fn offset(&self) -> usize {
        self.buf.offset()
    }

    // ==================== Encoding helpers ====================

    /// REX.W: 64-bit operand size. None of the registers need REX.B.
    fn emit_rex_w(&mut self) {
        self.buf.emit_u8(0x48);
    }

    /// Encode ModR/M byte.
    /// mod: 2 bits, reg: 3 bits, rm: 3 bits
    fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
        ((mode & 0x3) << 6) | ((reg & 0x7) << 3) | (rm & 0x7)
    }

    // ==================== Data Movement ====================

    /// MOV r64, imm64 (move 64-bit immediate to register)
    ///
    /// The immediate is always the last 8 bytes emitted, so callers can record
    /// `offset() - 8` as a patch site.
    pub fn mov_ri64(&mut self, dst: Reg, imm: u64) {
        self.emit_rex_w();
        self.buf.emit_u8(0xB8 + dst.code()); // MOV r64, imm64
        self.buf.emit_u64(imm);
    }

    // ==================== Stack Operations ====================

    /// PUSH r64
    pub fn push(&mut self, reg: Reg) {
        self.buf.emit_u8(0x50 + reg.code());
    }

    /// POP r64
    pub fn pop(&mut self, reg: Reg) {
        self.buf.emit_u8(0x58 + reg.code());
    }

    /// PUSH qword [r64] (push the value the register points at)
    ///
    /// `[rsp]` would need a SIB byte and is not supported.
    pub fn push_m(&mut self, base: Reg) {
        debug_assert_ne!(base, Reg::Rsp);
        self.buf.emit_u8(0xFF); // PUSH r/m64
        self.buf.emit_u8(Self::modrm(0b00, 6, base.code()));
    }

    /// SUB r64, imm8 (sign-extended)
    pub fn sub_ri8(&mut self, dst: Reg, imm: i8) {
        self.emit_rex_w();
        self.buf.emit_u8(0x83); // SUB r/m64, imm8
        self.buf.emit_u8(Self::modrm(0b11, 5, dst.code()));
        self.buf.emit_u8(imm as u8);
    }

    /// ADD r64, imm8 (sign-extended)
    pub fn add_ri8(&mut self, dst: Reg, imm: i8) {
        self.emit_rex_w();
        self.buf.emit_u8(0x83); // ADD r/m64, imm8
        self.buf.emit_u8(Self::modrm(0b11, 0, dst.code()));
        self.buf.emit_u8(imm as u8);
    }

    // ==================== Control Flow ====================

    /// CALL r64 (indirect call through register)
    pub fn call_r(&mut self, reg: Reg) {
        self.buf.emit_u8(0xFF); // CALL r/m64
        self.buf.emit_u8(Self::modrm(0b11, 2, reg.code()));
    }

    /// RET (return)
    pub fn ret(&mut self) {
        self.buf.emit_u8(0xC3);
    }

    // ==================== SSE2 Floating Point ====================

    /// MOVQ xmm, r64 (move quadword from GP register to XMM)
    pub fn movq_xmm_r64(&mut self, xmm: u8, src: Reg) {
        // 66 REX.W 0F 6E /r - MOVQ xmm, r/m64
        self.buf.emit_u8(0x66);
        self.emit_rex_w();
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0x6E);
        self.buf.emit_u8(Self::modrm(0b11, xmm, src.code()));
    }

    /// MOVQ r64, xmm (move quadword from XMM to GP register)
    pub fn movq_r64_xmm(&mut self, dst: Reg, xmm: u8) {
        // 66 REX.W 0F 7E /r - MOVQ r/m64, xmm
        self.buf.emit_u8(0x66);
        self.emit_rex_w();
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0x7E);
        self.buf.emit_u8(Self::modrm(0b11, xmm, dst.code()));
    }

    /// ADDSD xmm1, xmm2 (add scalar double-precision)
    pub fn addsd(&mut self, dst: u8, src: u8) {
        self.sse_op(0xF2, 0x58, dst, src);
    }

    /// SUBSD xmm1, xmm2 (subtract scalar double-precision)
    pub fn subsd(&mut self, dst: u8, src: u8) {
        self.sse_op(0xF2, 0x5C, dst, src);
    }

    /// MULSD xmm1, xmm2 (multiply scalar double-precision)
    pub fn mulsd(&mut self, dst: u8, src: u8) {
        self.sse_op(0xF2, 0x59, dst, src);
    }

    /// DIVSD xmm1, xmm2 (divide scalar double-precision)
    pub fn divsd(&mut self, dst: u8, src: u8) {
        self.sse_op(0xF2, 0x5E, dst, src);
    }

    /// XORPD xmm1, xmm2 (bitwise xor of packed doubles)
    pub fn xorpd(&mut self, dst: u8, src: u8) {
        self.sse_op(0x66, 0x57, dst, src);
    }

    /// `prefix 0F opcode /r` with both operands in xmm0..xmm7.
    fn sse_op(&mut self, prefix: u8, opcode: u8, dst: u8, src: u8) {
        self.buf.emit_u8(prefix);
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(opcode);
        self.buf.emit_u8(Self::modrm(0b11, dst, src));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(f: impl FnOnce(&mut X86_64Assembler)) -> Vec<u8> {
        let mut buf = CodeBuffer::default();
        f(&mut X86_64Assembler::new(&mut buf));
        buf.into_code()
    }

    #[test]
    fn test_mov_ri64() {
        let code = assemble(|asm| asm.mov_ri64(Reg::Rax, 0x123456789ABCDEF0));

        // MOV RAX, imm64 = 48 B8 <imm64>
        assert_eq!(
            code,
            &[0x48, 0xB8, 0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn test_mov_ri64_rdi() {
        let code = assemble(|asm| asm.mov_ri64(Reg::Rdi, 0));

        // MOV RDI, imm64 = 48 BF <imm64>
        assert_eq!(&code[..2], &[0x48, 0xBF]);
        assert_eq!(code.len(), 10);
    }

    #[test]
    fn test_push_pop() {
        let code = assemble(|asm| {
            asm.push(Reg::Rax);
            asm.push(Reg::Rdi);
            asm.pop(Reg::Rdi);
            asm.pop(Reg::Rax);
        });

        // PUSH RAX = 50
        // PUSH RDI = 57
        // POP RDI = 5F
        // POP RAX = 58
        assert_eq!(code, &[0x50, 0x57, 0x5F, 0x58]);
    }

    #[test]
    fn test_push_m() {
        // PUSH [RAX] = FF 30
        assert_eq!(assemble(|asm| asm.push_m(Reg::Rax)), &[0xFF, 0x30]);
        // PUSH [RDI] = FF 37
        assert_eq!(assemble(|asm| asm.push_m(Reg::Rdi)), &[0xFF, 0x37]);
    }

    #[test]
    fn test_stack_adjust() {
        // SUB RSP, 8 = 48 83 EC 08
        assert_eq!(assemble(|asm| asm.sub_ri8(Reg::Rsp, 8)), &[0x48, 0x83, 0xEC, 0x08]);
        // ADD RSP, 8 = 48 83 C4 08
        assert_eq!(assemble(|asm| asm.add_ri8(Reg::Rsp, 8)), &[0x48, 0x83, 0xC4, 0x08]);
    }

    #[test]
    fn test_call_r() {
        // CALL RAX = FF D0
        assert_eq!(assemble(|asm| asm.call_r(Reg::Rax)), &[0xFF, 0xD0]);
        // CALL RDI = FF D7
        assert_eq!(assemble(|asm| asm.call_r(Reg::Rdi)), &[0xFF, 0xD7]);
    }

    #[test]
    fn test_ret() {
        assert_eq!(assemble(|asm| asm.ret()), &[0xC3]);
    }

    #[test]
    fn test_movq() {
        // MOVQ XMM0, RAX = 66 48 0F 6E C0
        assert_eq!(
            assemble(|asm| asm.movq_xmm_r64(0, Reg::Rax)),
            &[0x66, 0x48, 0x0F, 0x6E, 0xC0]
        );
        // MOVQ XMM7, RAX = 66 48 0F 6E F8
        assert_eq!(
            assemble(|asm| asm.movq_xmm_r64(7, Reg::Rax)),
            &[0x66, 0x48, 0x0F, 0x6E, 0xF8]
        );
        // MOVQ RAX, XMM0 = 66 48 0F 7E C0
        assert_eq!(
            assemble(|asm| asm.movq_r64_xmm(Reg::Rax, 0)),
            &[0x66, 0x48, 0x0F, 0x7E, 0xC0]
        );
    }

    #[test]
    fn test_scalar_double_arithmetic() {
        let code = assemble(|asm| {
            asm.addsd(0, 1);
            asm.subsd(0, 1);
            asm.mulsd(0, 1);
            asm.divsd(0, 1);
            asm.xorpd(0, 1);
        });

        // ADDSD XMM0, XMM1 = F2 0F 58 C1
        // SUBSD XMM0, XMM1 = F2 0F 5C C1
        // MULSD XMM0, XMM1 = F2 0F 59 C1
        // DIVSD XMM0, XMM1 = F2 0F 5E C1
        // XORPD XMM0, XMM1 = 66 0F 57 C1
        assert_eq!(
            code,
            &[
                0xF2, 0x0F, 0x58, 0xC1, 0xF2, 0x0F, 0x5C, 0xC1, 0xF2, 0x0F, 0x59, 0xC1, 0xF2,
                0x0F, 0x5E, 0xC1, 0x66, 0x0F, 0x57, 0xC1,
            ]
        );
    }
}
