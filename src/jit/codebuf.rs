//! Growable byte buffer the assembler writes into. Offsets into it become
//! relocation sites once the code is translated.

#[derive(Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
        }
    }

    /// Where the next byte lands.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Little-endian, as immediates and patched addresses are stored.
    pub fn emit_u64(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn into_code(self) -> Vec<u8> {
        self.code
    }
}
