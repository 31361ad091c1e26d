//! Variables and callable functions as seen by compiled programs.
//!
//! Bytecode reaches a function through a `(target, wrapper)` pair: the
//! wrapper pops the arguments off the evaluation stack, calls the target and
//! pushes the result. Native code reaches it through an `(entry, env)` pair:
//! the arguments travel in `xmm0..xmm7`, `env` in `rdi`.

use crate::error::RuntimeError;
use crate::program::Program;
use crate::vm::Stack;
use std::cell::{Cell, Ref, RefCell};
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

/// Most arguments a registered function may take.
pub const MAX_ARITY: usize = 8;

/// A double that compiled programs read by address.
///
/// Clones share the same storage, and every linked program keeps a clone, so
/// the value stays valid for as long as something can read it.
#[derive(Clone)]
pub struct Variable(Slot);

#[derive(Clone)]
enum Slot {
    Shared(Rc<Cell<f64>>),
    External(NonNull<f64>),
}

impl Variable {
    pub fn new(value: f64) -> Self {
        Variable(Slot::Shared(Rc::new(Cell::new(value))))
    }

    /// Wrap caller-owned storage.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads and writes for as long as this handle
    /// or any program linked against it is alive.
    pub unsafe fn from_raw(ptr: *mut f64) -> Option<Self> {
        NonNull::new(ptr).map(|p| Variable(Slot::External(p)))
    }

    pub fn get(&self) -> f64 {
        match &self.0 {
            Slot::Shared(cell) => cell.get(),
            Slot::External(ptr) => unsafe { ptr.as_ptr().read() },
        }
    }

    pub fn set(&self, value: f64) {
        match &self.0 {
            Slot::Shared(cell) => cell.set(value),
            Slot::External(ptr) => unsafe { ptr.as_ptr().write(value) },
        }
    }

    /// Stable address of the value.
    pub fn address(&self) -> *const f64 {
        match &self.0 {
            Slot::Shared(cell) => cell.as_ptr(),
            Slot::External(ptr) => ptr.as_ptr(),
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Variable").field(&self.get()).finish()
    }
}

/// A bare C-ABI function, as used for the builtins.
#[derive(Debug, Clone, Copy)]
pub enum NativeFn {
    Arity0(extern "C" fn() -> f64),
    Arity1(extern "C" fn(f64) -> f64),
    Arity2(extern "C" fn(f64, f64) -> f64),
    Arity3(extern "C" fn(f64, f64, f64) -> f64),
}

impl NativeFn {
    pub fn arity(self) -> usize {
        match self {
            NativeFn::Arity0(_) => 0,
            NativeFn::Arity1(_) => 1,
            NativeFn::Arity2(_) => 2,
            NativeFn::Arity3(_) => 3,
        }
    }

    fn address(self) -> usize {
        match self {
            NativeFn::Arity0(f) => f as usize,
            NativeFn::Arity1(f) => f as usize,
            NativeFn::Arity2(f) => f as usize,
            NativeFn::Arity3(f) => f as usize,
        }
    }

    fn wrapper(self) -> Wrapper {
        match self {
            NativeFn::Arity0(_) => native0,
            NativeFn::Arity1(_) => native1,
            NativeFn::Arity2(_) => native2,
            NativeFn::Arity3(_) => native3,
        }
    }
}

/// A boxed Rust closure taking its arguments as a slice.
pub struct Closure {
    arity: usize,
    body: Box<dyn Fn(&[f64]) -> f64>,
}

impl Closure {
    pub fn new(arity: usize, body: impl Fn(&[f64]) -> f64 + 'static) -> Self {
        Self {
            arity,
            body: Box::new(body),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: &[f64]) -> f64 {
        (self.body)(args)
    }
}

/// A named expression compiled by a context and callable from others.
#[derive(Clone)]
pub struct SubProgram(Rc<SubProgramInner>);

struct SubProgramInner {
    name: String,
    program: RefCell<Program>,
}

impl SubProgram {
    pub(crate) fn new(name: &str, program: Program) -> Self {
        SubProgram(Rc::new(SubProgramInner {
            name: name.to_string(),
            program: RefCell::new(program),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_ready(&self) -> bool {
        self.0.program.try_borrow().is_ok_and(|p| p.is_ready())
    }

    pub fn program(&self) -> Ref<'_, Program> {
        self.0.program.borrow()
    }

    pub(crate) fn cell(&self) -> &RefCell<Program> {
        &self.0.program
    }

    fn as_ptr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

/// Anything a call site can resolve to.
#[derive(Clone)]
pub enum Function {
    Native(NativeFn),
    Closure(Rc<Closure>),
    /// Named sub-programs always take zero arguments.
    Program(SubProgram),
}

impl Function {
    pub fn closure(arity: usize, body: impl Fn(&[f64]) -> f64 + 'static) -> Self {
        Function::Closure(Rc::new(Closure::new(arity, body)))
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native(f) => f.arity(),
            Function::Closure(c) => c.arity(),
            Function::Program(_) => 0,
        }
    }

    /// Target and wrapper addresses for the bytecode interpreter.
    pub(crate) fn interpreter_target(&self) -> (usize, Wrapper) {
        match self {
            Function::Native(f) => (f.address(), f.wrapper()),
            Function::Closure(c) => (Rc::as_ptr(c) as usize, closure_wrapper),
            Function::Program(sub) => (sub.as_ptr(), program_wrapper),
        }
    }

    /// Entry and environment addresses for native code.
    pub(crate) fn native_target(&self) -> (usize, usize) {
        match self {
            Function::Native(f) => (f.address(), 0),
            Function::Closure(c) => (closure_trampoline(c.arity()), Rc::as_ptr(c) as usize),
            Function::Program(sub) => {
                let entry = sub.cell().try_borrow().ok().and_then(|p| p.native_entry());
                match entry {
                    Some(entry) => (entry, 0),
                    None => (program_trampoline as *const () as usize, sub.as_ptr()),
                }
            }
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(n) => write!(f, "Native/{}", n.arity()),
            Function::Closure(c) => write!(f, "Closure/{}", c.arity()),
            Function::Program(p) => write!(f, "Program({})", p.name()),
        }
    }
}

/// Conversion from a Rust closure to a [`Function`], with the arity taken
/// from the closure's signature.
///
/// `Args` is a marker tuple (`()`, `(f64,)`, `(f64, f64)`, ...) that keeps
/// the per-arity implementations apart. Closure parameters need explicit
/// `f64` annotations for the arity to be inferred.
pub trait IntoFunction<Args> {
    fn into_function(self) -> Function;
}

macro_rules! impl_into_function {
    (@f64 $arg:ident) => { f64 };
    ($n:expr; $($arg:ident),*) => {
        impl<F> IntoFunction<($(impl_into_function!(@f64 $arg),)*)> for F
        where
            F: Fn($(impl_into_function!(@f64 $arg)),*) -> f64 + 'static,
        {
            fn into_function(self) -> Function {
                Function::closure($n, move |args: &[f64]| match *args {
                    [$($arg),*] => self($($arg),*),
                    _ => f64::NAN,
                })
            }
        }
    };
}

impl_into_function!(0;);
impl_into_function!(1; a);
impl_into_function!(2; a, b);
impl_into_function!(3; a, b, c);
impl_into_function!(4; a, b, c, d);
impl_into_function!(5; a, b, c, d, e);
impl_into_function!(6; a, b, c, d, e, f);
impl_into_function!(7; a, b, c, d, e, f, g);
impl_into_function!(8; a, b, c, d, e, f, g, h);

// ===== Interpreter wrappers =====

/// Pops the arguments for `target`, calls it and pushes the result.
pub(crate) type Wrapper = unsafe fn(&mut Stack, usize) -> Result<(), RuntimeError>;

unsafe fn native0(stack: &mut Stack, target: usize) -> Result<(), RuntimeError> {
    let f: extern "C" fn() -> f64 = unsafe { std::mem::transmute(target) };
    stack.push(f())
}

unsafe fn native1(stack: &mut Stack, target: usize) -> Result<(), RuntimeError> {
    let f: extern "C" fn(f64) -> f64 = unsafe { std::mem::transmute(target) };
    let a = stack.pop()?;
    stack.push(f(a))
}

unsafe fn native2(stack: &mut Stack, target: usize) -> Result<(), RuntimeError> {
    let f: extern "C" fn(f64, f64) -> f64 = unsafe { std::mem::transmute(target) };
    let b = stack.pop()?;
    let a = stack.pop()?;
    stack.push(f(a, b))
}

unsafe fn native3(stack: &mut Stack, target: usize) -> Result<(), RuntimeError> {
    let f: extern "C" fn(f64, f64, f64) -> f64 = unsafe { std::mem::transmute(target) };
    let c = stack.pop()?;
    let b = stack.pop()?;
    let a = stack.pop()?;
    stack.push(f(a, b, c))
}

unsafe fn closure_wrapper(stack: &mut Stack, target: usize) -> Result<(), RuntimeError> {
    let closure = unsafe { &*(target as *const Closure) };
    let mut args = [0.0; MAX_ARITY];
    let args = &mut args[..closure.arity()];
    for slot in args.iter_mut().rev() {
        *slot = stack.pop()?;
    }
    stack.push(closure.call(args))
}

unsafe fn program_wrapper(stack: &mut Stack, target: usize) -> Result<(), RuntimeError> {
    let sub = unsafe { &*(target as *const SubProgramInner) };
    let program = sub
        .program
        .try_borrow()
        .map_err(|_| RuntimeError::ProgramBusy(sub.name.clone()))?;
    stack.enter_call()?;
    let value = program.eval_on(stack);
    stack.leave_call();
    stack.push(value?)
}

// ===== Native trampolines =====

macro_rules! closure_trampolines {
    ($($name:ident($($arg:ident),*);)*) => {$(
        extern "C" fn $name(env: *const c_void, $($arg: f64),*) -> f64 {
            let closure = unsafe { &*(env as *const Closure) };
            closure.call(&[$($arg),*])
        }
    )*};
}

closure_trampolines! {
    trampoline0();
    trampoline1(a0);
    trampoline2(a0, a1);
    trampoline3(a0, a1, a2);
    trampoline4(a0, a1, a2, a3);
    trampoline5(a0, a1, a2, a3, a4);
    trampoline6(a0, a1, a2, a3, a4, a5);
    trampoline7(a0, a1, a2, a3, a4, a5, a6);
    trampoline8(a0, a1, a2, a3, a4, a5, a6, a7);
}

fn closure_trampoline(arity: usize) -> usize {
    match arity {
        0 => trampoline0 as *const () as usize,
        1 => trampoline1 as *const () as usize,
        2 => trampoline2 as *const () as usize,
        3 => trampoline3 as *const () as usize,
        4 => trampoline4 as *const () as usize,
        5 => trampoline5 as *const () as usize,
        6 => trampoline6 as *const () as usize,
        7 => trampoline7 as *const () as usize,
        _ => trampoline8 as *const () as usize,
    }
}

/// Runs a sub-program that has no native entry of its own. Native code has
/// no error channel, so failures are logged and yield NaN.
extern "C" fn program_trampoline(env: *const c_void) -> f64 {
    let sub = unsafe { &*(env as *const SubProgramInner) };
    let result = match sub.program.try_borrow() {
        Ok(program) => program.eval(),
        Err(_) => Err(RuntimeError::ProgramBusy(sub.name.clone())),
    };
    result.unwrap_or_else(|err| {
        log::error!("{}: {}", sub.name, err);
        f64::NAN
    })
}
