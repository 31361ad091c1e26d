use clap::{Args, Parser, Subcommand, ValueEnum};
use jitexpr::compiler::{self, ast, mangle};
use jitexpr::config::{Definitions, JitMode, RuntimeConfig};
use jitexpr::{Context, Variable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

// Wrapper types for clap ValueEnum support
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum JitModeArg {
    Off,
    On,
    #[default]
    Auto,
}

impl From<JitModeArg> for JitMode {
    fn from(arg: JitModeArg) -> Self {
        match arg {
            JitModeArg::Off => JitMode::Off,
            JitModeArg::On => JitMode::On,
            JitModeArg::Auto => JitMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormatArg {
    #[default]
    Human,
    Json,
}

#[derive(Parser)]
#[command(name = "jitexpr")]
#[command(about = "Compile and evaluate arithmetic expressions", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, link and evaluate an expression
    Eval(EvalArgs),
    /// Parse an expression and report the first error
    Check {
        /// The expression to check
        expr: String,
    },
    /// Print the linker symbol for a function name and arity
    Mangle {
        name: String,
        arity: usize,
    },
    /// Print the signature encoded in a linker symbol
    Demangle {
        symbol: String,
    },
}

#[derive(Args)]
struct EvalArgs {
    /// The expression to evaluate
    expr: String,

    /// JIT compilation mode (off, on, auto)
    #[arg(long, value_enum, default_value = "auto")]
    jit: JitModeArg,

    /// Define a variable, e.g. --var t=0.5 (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    vars: Vec<(String, f64)>,

    /// TOML file with [variables] and [functions] tables
    #[arg(long, value_name = "FILE")]
    defs: Option<PathBuf>,

    /// Evaluate this many times and report the elapsed time
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    repeat: u64,

    /// Output format (human, json)
    #[arg(long, value_enum, default_value = "human")]
    format: OutputFormatArg,

    /// Dump the syntax tree to stderr
    #[arg(long)]
    dump_ast: bool,

    /// Dump the interpreter bytecode to stderr
    #[arg(long)]
    dump_bytecode: bool,

    /// Dump the JIT instruction listing and machine code to stderr
    #[arg(long)]
    dump_ir: bool,

    /// Log every JIT compilation
    #[arg(long)]
    trace_jit: bool,

    /// Disable the peephole optimizer
    #[arg(long)]
    no_optimize: bool,
}

#[derive(Serialize)]
struct EvalReport<'a> {
    expression: &'a str,
    backend: &'static str,
    result: f64,
    evals: u64,
    elapsed_ns: u64,
}

fn parse_var(arg: &str) -> Result<(String, f64), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", arg));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
    Ok((name.to_string(), value))
}

fn init_logger(verbose: u8, trace_jit: bool) {
    let level = match (verbose, trace_jit) {
        (0, false) => log::LevelFilter::Warn,
        (0, true) | (1, _) => log::LevelFilter::Info,
        (2, _) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn dump_ir(expr: &str, optimize: bool) -> Result<String, String> {
    #[cfg(feature = "jit")]
    {
        compiler::compile_jit(expr, optimize)
            .map(|program| program.disassemble())
            .map_err(|e| e.to_string())
    }
    #[cfg(not(feature = "jit"))]
    {
        let _ = (expr, optimize);
        Err("--dump-ir requires a build with the jit feature".to_string())
    }
}

fn run_eval(args: EvalArgs) -> Result<(), String> {
    let config = RuntimeConfig {
        jit_mode: args.jit.into(),
        trace_jit: args.trace_jit,
        optimize: !args.no_optimize,
    };
    let mut context = Context::with_config(config).map_err(|e| e.to_string())?;

    let mut variables: BTreeMap<String, Variable> = BTreeMap::new();
    if let Some(path) = &args.defs {
        let defs = Definitions::load(path)?;
        variables = defs.apply(&mut context).map_err(|e| e.to_string())?;
    }
    // --var overrides a value from the definitions file
    for (name, value) in &args.vars {
        match variables.get(name) {
            Some(var) => var.set(*value),
            None => {
                let var = Variable::new(*value);
                context.var(name, &var).map_err(|e| e.to_string())?;
                variables.insert(name.clone(), var);
            }
        }
    }
    context.link().map_err(|e| e.to_string())?;

    if args.dump_ast {
        let root = compiler::parse(&args.expr).map_err(|e| e.to_string())?;
        eprint!("{}", ast::dump(&root));
    }
    if args.dump_bytecode {
        let program = compiler::compile_interpreted(&args.expr).map_err(|e| e.to_string())?;
        eprint!("{}", program.disassemble());
    }
    if args.dump_ir {
        eprint!("{}", dump_ir(&args.expr, !args.no_optimize)?);
    }

    let mut program = context.compile(&args.expr).map_err(|e| e.to_string())?;
    context
        .link_program(&mut program)
        .map_err(|e| e.to_string())?;

    let start = Instant::now();
    let mut result = 0.0;
    for _ in 0..args.repeat {
        result = program.eval().map_err(|e| e.to_string())?;
    }
    let elapsed = start.elapsed();

    match args.format {
        OutputFormatArg::Human => {
            println!("{}", result);
            if args.repeat > 1 {
                eprintln!(
                    "{} evals in {:?} ({:.1} ns/eval, {})",
                    args.repeat,
                    elapsed,
                    per_eval_ns(elapsed, args.repeat),
                    program.backend_name()
                );
            }
        }
        OutputFormatArg::Json => {
            let report = EvalReport {
                expression: &args.expr,
                backend: program.backend_name(),
                result,
                evals: args.repeat,
                elapsed_ns: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            };
            let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn per_eval_ns(elapsed: Duration, evals: u64) -> f64 {
    elapsed.as_nanos() as f64 / evals as f64
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let trace_jit = matches!(&cli.command, Commands::Eval(args) if args.trace_jit);
    init_logger(cli.verbose, trace_jit);

    match cli.command {
        Commands::Eval(args) => {
            if let Err(e) = run_eval(args) {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
        Commands::Check { expr } => match compiler::parse(&expr) {
            Ok(_) => println!("ok"),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        Commands::Mangle { name, arity } => {
            println!("{}", mangle::mangle(&name, arity));
        }
        Commands::Demangle { symbol } => {
            println!("{}", mangle::demangle(&symbol));
        }
    }

    ExitCode::SUCCESS
}
