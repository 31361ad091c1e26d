//! Runtime configuration types.

use crate::context::Context;
use crate::error::ContextError;
use crate::function::Variable;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// JIT compilation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JitMode {
    /// JIT disabled, interpreter only
    Off,
    /// JIT required; fails where native code cannot run
    On,
    /// Automatic: JIT enabled if supported on this platform
    #[default]
    Auto,
}

/// Backend a context compiles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Interpreted,
    Jit,
}

/// Whether this build can run generated machine code.
pub fn jit_available() -> bool {
    cfg!(all(feature = "jit", target_arch = "x86_64", unix))
}

/// Runtime configuration for a context
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub jit_mode: JitMode,
    /// Log IR and machine code of every JIT compilation at `info`.
    pub trace_jit: bool,
    /// Run the peephole pass on JIT code.
    pub optimize: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            jit_mode: JitMode::Auto,
            trace_jit: false,
            optimize: true,
        }
    }
}

impl RuntimeConfig {
    pub fn backend(&self) -> Result<Backend, ContextError> {
        match self.jit_mode {
            JitMode::Off => Ok(Backend::Interpreted),
            JitMode::On if jit_available() => Ok(Backend::Jit),
            JitMode::On => Err(ContextError::JitUnavailable),
            JitMode::Auto if jit_available() => Ok(Backend::Jit),
            JitMode::Auto => Ok(Backend::Interpreted),
        }
    }
}

/// Variables and named sub-programs loaded from a TOML file.
///
/// ```toml
/// [variables]
/// time = 0.5
///
/// [functions]
/// wave = "sin(time * 6.2831853)"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definitions {
    #[serde(default)]
    pub variables: BTreeMap<String, f64>,
    #[serde(default)]
    pub functions: BTreeMap<String, String>,
}

impl Definitions {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("invalid definitions: {}", e))
    }

    /// Register every variable and function. Sub-programs are compiled but
    /// not linked. Returns the variable handles by name.
    pub fn apply(&self, context: &mut Context) -> Result<BTreeMap<String, Variable>, ContextError> {
        let mut handles = BTreeMap::new();
        for (name, &value) in &self.variables {
            let var = Variable::new(value);
            context.var(name, &var)?;
            handles.insert(name.clone(), var);
        }
        for (name, source) in &self.functions {
            context.func_source(name, source)?;
        }
        Ok(handles)
    }
}
