//! The registry compiled programs are linked against.

use crate::builtins;
use crate::compiler::{self, mangle::mangle};
use crate::config::{Backend, RuntimeConfig};
use crate::error::{CompileError, ContextError, LinkError};
use crate::function::{Function, IntoFunction, MAX_ARITY, NativeFn, SubProgram, Variable};
use crate::link::SymbolKind;
use crate::program::Program;
use std::cell::Ref;
use std::collections::{BTreeMap, HashMap};

/// Named variables, functions and sub-programs, plus the backend every
/// program compiled through this context targets.
///
/// A context is single-threaded. Each evaluation gets its own stack, so
/// programs linked against the same context never share mutable state
/// other than the variables themselves.
pub struct Context {
    config: RuntimeConfig,
    backend: Backend,
    variables: HashMap<String, Variable>,
    /// Keyed by mangled name.
    functions: HashMap<String, Function>,
    programs: BTreeMap<String, SubProgram>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl Context {
    /// A context using the JIT wherever it can run, with the builtins
    /// registered.
    pub fn new() -> Self {
        let config = RuntimeConfig::default();
        let backend = config.backend().unwrap_or(Backend::Interpreted);
        Self::build(config, backend)
    }

    /// A context that always uses the bytecode interpreter.
    pub fn interpreted() -> Self {
        Self::build(RuntimeConfig::default(), Backend::Interpreted)
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self, ContextError> {
        let backend = config.backend()?;
        Ok(Self::build(config, backend))
    }

    fn build(config: RuntimeConfig, backend: Backend) -> Self {
        let mut context = Self {
            config,
            backend,
            variables: HashMap::new(),
            functions: HashMap::new(),
            programs: BTreeMap::new(),
        };
        for (name, f) in builtins::all() {
            context.functions.insert(mangle(name, f.arity()), Function::Native(f));
        }
        log::debug!(
            "context created ({:?} backend, {} builtins)",
            backend,
            context.functions.len()
        );
        context
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ===== Registration =====

    /// Register a variable. Programs read its current value on every eval.
    pub fn var(&mut self, name: &str, var: &Variable) -> Result<(), ContextError> {
        if self.variables.contains_key(name) {
            return Err(ContextError::AlreadyDefined(name.to_string()));
        }
        self.variables.insert(name.to_string(), var.clone());
        Ok(())
    }

    /// Register caller-owned storage as a variable.
    ///
    /// # Safety
    /// `ptr` must stay valid for as long as this context or any program
    /// linked against it is alive.
    pub unsafe fn var_ptr(&mut self, name: &str, ptr: *mut f64) -> Result<Variable, ContextError> {
        let var = unsafe { Variable::from_raw(ptr) }
            .ok_or_else(|| ContextError::NullVariable(name.to_string()))?;
        self.var(name, &var)?;
        Ok(var)
    }

    /// Register a Rust closure; the arity comes from its signature.
    ///
    /// ```
    /// let mut context = jitexpr::Context::interpreted();
    /// context.func("hypot", |a: f64, b: f64| a.hypot(b)).unwrap();
    /// ```
    pub fn func<Args>(&mut self, name: &str, f: impl IntoFunction<Args>) -> Result<(), ContextError> {
        self.register(name, f.into_function())
    }

    pub fn func_native(&mut self, name: &str, f: NativeFn) -> Result<(), ContextError> {
        self.register(name, Function::Native(f))
    }

    /// Register a closure taking its arguments as a slice of length `arity`.
    pub fn func_closure(
        &mut self,
        name: &str,
        arity: usize,
        body: impl Fn(&[f64]) -> f64 + 'static,
    ) -> Result<(), ContextError> {
        self.register(name, Function::closure(arity, body))
    }

    /// Compile `source` as a zero-argument function callable as `name()`.
    /// It is linked by [`Context::link`].
    pub fn func_source(&mut self, name: &str, source: &str) -> Result<(), ContextError> {
        let key = mangle(name, 0);
        if self.functions.contains_key(&key) {
            return Err(ContextError::AlreadyDefined(name.to_string()));
        }
        let program = self.compile(source).map_err(|source| ContextError::Compile {
            name: name.to_string(),
            source,
        })?;
        let sub = SubProgram::new(name, program);
        self.programs.insert(name.to_string(), sub.clone());
        self.functions.insert(key, Function::Program(sub));
        Ok(())
    }

    fn register(&mut self, name: &str, function: Function) -> Result<(), ContextError> {
        let arity = function.arity();
        if arity > MAX_ARITY {
            return Err(ContextError::TooManyArguments {
                name: name.to_string(),
                arity,
                max: MAX_ARITY,
            });
        }
        let key = mangle(name, arity);
        if self.functions.contains_key(&key) {
            return Err(ContextError::AlreadyDefined(name.to_string()));
        }
        log::trace!("registered {}", key);
        self.functions.insert(key, function);
        Ok(())
    }

    // ===== Lookup =====

    pub fn lookup_variable(&self, name: &str) -> Option<Variable> {
        self.variables.get(name).cloned()
    }

    /// Look up a function by mangled name.
    pub fn lookup_function(&self, mangled: &str) -> Option<Function> {
        self.functions.get(mangled).cloned()
    }

    /// The named sub-program registered with [`Context::func_source`].
    pub fn get_func(&self, name: &str) -> Option<Ref<'_, Program>> {
        self.programs.get(name).map(|sub| sub.program())
    }

    pub fn program_names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    // ===== Compile and link =====

    /// Compile for this context's backend. The program still has to be
    /// linked before it can run.
    pub fn compile(&self, source: &str) -> Result<Program, CompileError> {
        let program = compiler::compile(source, self.backend, self.config.optimize)?;
        if self.config.trace_jit && self.backend == Backend::Jit {
            log::info!("compiled `{}`:\n{}", source, program.disassemble());
        }
        Ok(program)
    }

    pub fn link_program(&self, program: &mut Program) -> Result<(), LinkError> {
        program.link(self)
    }

    /// Link every named sub-program, dependencies first.
    ///
    /// Programs that are already linked are left alone. Every program is
    /// attempted; the first error is returned.
    pub fn link(&self) -> Result<(), LinkError> {
        let mut visits = HashMap::new();
        let mut first_error = None;
        for name in self.programs.keys() {
            if let Err(err) = self.visit(name, &mut visits) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn visit(&self, name: &str, visits: &mut HashMap<String, Visit>) -> Result<(), LinkError> {
        match visits.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                log::error!("recursive definition of '{}'", name);
                return Err(LinkError::RecursiveDefinition(name.to_string()));
            }
            None => {}
        }
        let Some(sub) = self.programs.get(name) else {
            return Ok(());
        };
        if sub.is_ready() {
            visits.insert(name.to_string(), Visit::Done);
            return Ok(());
        }

        visits.insert(name.to_string(), Visit::InProgress);
        let mut first_error = None;
        for dep in self.dependencies(sub) {
            if let Err(err) = self.visit(&dep, visits) {
                first_error.get_or_insert(err);
            }
        }
        let linked = sub.cell().borrow_mut().link(self);
        visits.insert(name.to_string(), Visit::Done);

        match (first_error, linked) {
            (Some(err), _) | (None, Err(err)) => Err(err),
            (None, Ok(())) => {
                log::debug!("linked '{}'", name);
                Ok(())
            }
        }
    }

    /// Named sub-programs `sub` calls.
    fn dependencies(&self, sub: &SubProgram) -> Vec<String> {
        let program = sub.program();
        program
            .symbols()
            .iter()
            .filter(|(_, _, kind)| *kind == SymbolKind::Function { arity: 0 })
            .filter_map(|(_, mangled, _)| match self.functions.get(mangled) {
                Some(Function::Program(dep)) => Some(dep.name().to_string()),
                _ => None,
            })
            .collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;

    fn eval(context: &Context, source: &str) -> f64 {
        let mut program = context.compile(source).unwrap();
        context.link_program(&mut program).unwrap();
        program.eval().unwrap()
    }

    #[test]
    fn test_builtins_registered() {
        let context = Context::interpreted();
        assert!(context.lookup_function("_Z3sind").is_some());
        assert!(context.lookup_function("_Z5clampddd").is_some());
        assert!(context.lookup_function("_Z5clock").is_some());
        assert_eq!(eval(&context, "round(2.5) + min(1, 2)"), 4.0);
    }

    #[test]
    fn test_registration_is_first_wins() {
        let mut context = Context::interpreted();
        assert_eq!(
            context.func("sin", |x: f64| x),
            Err(ContextError::AlreadyDefined("sin".to_string()))
        );
        // Same name, different arity is a different function.
        context.func("sin", |x: f64, y: f64| x + y).unwrap();
        assert_eq!(eval(&context, "sin(1, 2)"), 3.0);

        let x = Variable::new(1.0);
        context.var("x", &x).unwrap();
        assert!(context.var("x", &Variable::new(2.0)).is_err());
    }

    #[test]
    fn test_too_many_arguments() {
        let mut context = Context::interpreted();
        let err = context.func_closure("f", 9, |_| 0.0).unwrap_err();
        assert_eq!(
            err,
            ContextError::TooManyArguments {
                name: "f".to_string(),
                arity: 9,
                max: MAX_ARITY
            }
        );
    }

    #[test]
    fn test_var_ptr() {
        let mut context = Context::interpreted();
        let mut value = 7.0;
        unsafe { context.var_ptr("v", &mut value) }.unwrap();
        assert_eq!(eval(&context, "v + 1"), 8.0);
        assert_eq!(
            unsafe { context.var_ptr("w", std::ptr::null_mut()) }.unwrap_err(),
            ContextError::NullVariable("w".to_string())
        );
    }

    #[test]
    fn test_sub_programs_link_in_dependency_order() {
        let mut context = Context::interpreted();
        // Registered before its dependency; BTreeMap order would link it first.
        context.func_source("a", "b() * 2").unwrap();
        context.func_source("b", "3").unwrap();
        context.link().unwrap();
        assert_eq!(context.get_func("a").unwrap().eval(), Ok(6.0));
        assert_eq!(eval(&context, "a() + b()"), 9.0);
    }

    #[test]
    fn test_recursive_definition_detected() {
        let mut context = Context::interpreted();
        context.func_source("ping", "pong()").unwrap();
        context.func_source("pong", "ping() + 1").unwrap();
        let err = context.link().unwrap_err();
        assert!(matches!(err, LinkError::RecursiveDefinition(_)));
        assert!(!context.get_func("ping").unwrap().is_ready());
        assert!(!context.get_func("pong").unwrap().is_ready());
    }

    #[test]
    fn test_self_reference_detected() {
        let mut context = Context::interpreted();
        context.func_source("me", "me() + 1").unwrap();
        assert_eq!(
            context.link(),
            Err(LinkError::RecursiveDefinition("me".to_string()))
        );
    }

    #[test]
    fn test_link_continues_after_error() {
        let mut context = Context::interpreted();
        context.func_source("bad", "missing(1)").unwrap();
        context.func_source("good", "2").unwrap();
        assert!(context.link().is_err());
        assert_eq!(context.get_func("good").unwrap().eval(), Ok(2.0));
        assert!(matches!(
            context.get_func("bad").unwrap().eval(),
            Err(RuntimeError::LinkFailed(_))
        ));
    }

    #[test]
    fn test_dependency_not_linked() {
        let mut context = Context::interpreted();
        context.func_source("sub", "1").unwrap();
        let mut program = context.compile("sub() + 1").unwrap();
        assert_eq!(
            context.link_program(&mut program),
            Err(LinkError::DependencyNotLinked("sub".to_string()))
        );
        context.link().unwrap();
        context.link_program(&mut program).unwrap();
        assert_eq!(program.eval(), Ok(2.0));
    }

    #[test]
    fn test_compile_error_in_sub_program() {
        let mut context = Context::interpreted();
        let err = context.func_source("broken", "1 +").unwrap_err();
        assert!(matches!(err, ContextError::Compile { ref name, .. } if name == "broken"));
        assert!(context.get_func("broken").is_none());
    }

    #[test]
    fn test_closures_capture_state() {
        let mut context = Context::interpreted();
        let offset = 10.0;
        context.func("shift", move |x: f64| x + offset).unwrap();
        context.func("zero", || 0.0).unwrap();
        assert_eq!(eval(&context, "shift(zero()) + shift(1)"), 21.0);
    }
}
