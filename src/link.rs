//! Symbols, relocations and name resolution shared by both backends.

use crate::compiler::mangle::{demangle, mangle};
use crate::context::Context;
use crate::error::{LinkError, RuntimeError};
use crate::function::{Function, Variable};
use std::collections::HashMap;
use std::fmt;

/// How a symbol is used at its reference sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Function { arity: usize },
}

/// Per-program table mapping symbol names to dense ids `0..N`.
///
/// Variables are keyed by their bare name, functions by their mangled name.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    ids: HashMap<(String, SymbolKind), u16>,
    entries: Vec<(String, SymbolKind)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `name`, allocating the next one on first sight.
    /// Returns `None` once every `u16` id is taken.
    pub fn intern(&mut self, name: &str, kind: SymbolKind) -> Option<u16> {
        let key = (name.to_string(), kind);
        if let Some(&id) = self.ids.get(&key) {
            return Some(id);
        }
        let id = u16::try_from(self.entries.len()).ok()?;
        self.ids.insert(key, id);
        self.entries.push((name.to_string(), kind));
        Some(id)
    }

    pub fn intern_variable(&mut self, name: &str) -> Option<u16> {
        self.intern(name, SymbolKind::Variable)
    }

    pub fn intern_function(&mut self, name: &str, arity: usize) -> Option<u16> {
        self.intern(&mangle(name, arity), SymbolKind::Function { arity })
    }

    pub fn id(&self, name: &str, kind: SymbolKind) -> Option<u16> {
        self.ids.get(&(name.to_string(), kind)).copied()
    }

    pub fn name(&self, id: u16) -> Option<&str> {
        self.entries.get(id as usize).map(|(name, _)| name.as_str())
    }

    pub fn kind(&self, id: u16) -> Option<SymbolKind> {
        self.entries.get(id as usize).map(|(_, kind)| *kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Symbols in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &str, SymbolKind)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(id, (name, kind))| (id as u16, name.as_str(), *kind))
    }
}

/// What a relocation site expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// Address of a variable or entry point of a function.
    Address,
    /// Environment pointer handed to a function in `rdi` (native code only).
    Environment,
}

/// A code offset that refers to a symbol and must be patched at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub symbol: u16,
    pub offset: usize,
    pub kind: RelocKind,
}

impl fmt::Display for Relocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}: #{} ({:?})", self.offset, self.symbol, self.kind)
    }
}

/// Link status of a compiled program.
pub enum LinkState<T> {
    Unlinked,
    Ready(T),
    Failed(LinkError),
}

impl<T> LinkState<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, LinkState::Ready(_))
    }

    pub fn error(&self) -> Option<&LinkError> {
        match self {
            LinkState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// The linked artifact, or the reason the program cannot run.
    pub fn ready(&self) -> Result<&T, RuntimeError> {
        match self {
            LinkState::Ready(linked) => Ok(linked),
            LinkState::Unlinked => Err(RuntimeError::NotLinked),
            LinkState::Failed(err) => Err(RuntimeError::LinkFailed(err.clone())),
        }
    }

    /// Record the outcome of a link attempt.
    pub(crate) fn settle(&mut self, result: Result<T, LinkError>) -> Result<(), LinkError> {
        match result {
            Ok(linked) => {
                *self = LinkState::Ready(linked);
                Ok(())
            }
            Err(err) => {
                *self = LinkState::Failed(err.clone());
                Err(err)
            }
        }
    }
}

/// What a symbol resolved to.
#[derive(Clone)]
pub(crate) enum Binding {
    Variable(Variable),
    Function(Function),
}

/// Resolve every symbol of a program against `context`, indexed by id.
///
/// Variable references only match variables and call sites only match
/// functions of the same mangled arity. Named sub-programs must already be
/// linked.
pub(crate) fn resolve(symbols: &SymbolTable, context: &Context) -> Result<Vec<Binding>, LinkError> {
    let mut bindings = Vec::with_capacity(symbols.len());
    for (_, name, kind) in symbols.iter() {
        let binding = match kind {
            SymbolKind::Variable => context.lookup_variable(name).map(Binding::Variable),
            SymbolKind::Function { .. } => context.lookup_function(name).map(Binding::Function),
        };
        let Some(binding) = binding else {
            let err = unresolved(name);
            log::error!("{}", err);
            return Err(err);
        };
        if let Binding::Function(Function::Program(sub)) = &binding {
            if !sub.is_ready() {
                return Err(LinkError::DependencyNotLinked(sub.name().to_string()));
            }
        }
        bindings.push(binding);
    }
    log::debug!("resolved {} symbols", bindings.len());
    Ok(bindings)
}

fn unresolved(symbol: &str) -> LinkError {
    LinkError::UnresolvedSymbol {
        symbol: symbol.to_string(),
        signature: demangle(symbol),
    }
}
