use crate::error::RuntimeError;

/// Capacity of the evaluation stack in bytes.
pub const STACK_SIZE: usize = 1024;

/// How many sub-programs may be active inside one another.
pub const MAX_CALL_DEPTH: usize = 64;

/// A value that can be moved on and off the stack by its byte width.
pub trait StackValue: Copy {
    const SIZE: usize;

    fn store(self, out: &mut [u8]);
    fn load(bytes: &[u8]) -> Self;
}

macro_rules! impl_stack_value {
    ($($ty:ty),*) => {$(
        impl StackValue for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn store(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn load(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }
        }
    )*};
}

impl_stack_value!(f64, u64, u32, u16);

/// Fixed-size evaluation stack of the bytecode interpreter.
///
/// Every push and pop is bounds-checked against [`STACK_SIZE`].
pub struct Stack {
    data: [u8; STACK_SIZE],
    sp: usize,
    calls: usize,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            data: [0; STACK_SIZE],
            sp: 0,
            calls: 0,
        }
    }

    /// Bytes currently in use.
    pub fn depth(&self) -> usize {
        self.sp
    }

    pub fn is_empty(&self) -> bool {
        self.sp == 0
    }

    pub fn push<T: StackValue>(&mut self, value: T) -> Result<(), RuntimeError> {
        let end = self.sp + T::SIZE;
        if end > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        value.store(&mut self.data[self.sp..end]);
        self.sp = end;
        Ok(())
    }

    pub fn pop<T: StackValue>(&mut self) -> Result<T, RuntimeError> {
        let start = self
            .sp
            .checked_sub(T::SIZE)
            .ok_or(RuntimeError::StackUnderflow)?;
        let value = T::load(&self.data[start..self.sp]);
        self.sp = start;
        Ok(value)
    }

    /// Discard everything above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.sp = self.sp.min(depth);
    }

    pub(crate) fn enter_call(&mut self) -> Result<(), RuntimeError> {
        if self.calls >= MAX_CALL_DEPTH {
            return Err(RuntimeError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        self.calls += 1;
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.calls = self.calls.saturating_sub(1);
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_lifo() {
        let mut stack = Stack::new();
        stack.push(1.5f64).unwrap();
        stack.push(2.5f64).unwrap();
        assert_eq!(stack.depth(), 16);
        assert_eq!(stack.pop::<f64>().unwrap(), 2.5);
        assert_eq!(stack.pop::<f64>().unwrap(), 1.5);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_mixed_widths() {
        let mut stack = Stack::new();
        stack.push(7u16).unwrap();
        stack.push(-0.0f64).unwrap();
        assert_eq!(stack.depth(), 10);
        assert_eq!(stack.pop::<f64>().unwrap().to_bits(), (-0.0f64).to_bits());
        assert_eq!(stack.pop::<u16>().unwrap(), 7);
    }

    #[test]
    fn test_overflow_is_checked() {
        let mut stack = Stack::new();
        for i in 0..STACK_SIZE / 8 {
            stack.push(i as f64).unwrap();
        }
        assert_eq!(stack.push(0.0f64), Err(RuntimeError::StackOverflow));
        assert_eq!(stack.depth(), STACK_SIZE);
    }

    #[test]
    fn test_underflow_is_checked() {
        let mut stack = Stack::new();
        stack.push(1u32).unwrap();
        assert_eq!(stack.pop::<f64>(), Err(RuntimeError::StackUnderflow));
        assert_eq!(stack.pop::<u32>(), Ok(1));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut stack = Stack::new();
        for _ in 0..MAX_CALL_DEPTH {
            stack.enter_call().unwrap();
        }
        assert_eq!(
            stack.enter_call(),
            Err(RuntimeError::CallDepthExceeded(MAX_CALL_DEPTH))
        );
        stack.leave_call();
        assert!(stack.enter_call().is_ok());
    }
}
