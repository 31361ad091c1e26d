//! In-process integration tests that contribute to coverage.
//!
//! These tests drive the public API directly instead of spawning the CLI.
//! Every test runs on the interpreter and, where native code can run, on
//! the JIT as well.

use jitexpr::compiler::mangle::{demangle, mangle};
use jitexpr::config::{JitMode, RuntimeConfig};
use jitexpr::{Context, LinkError, RuntimeError, Variable};

fn contexts() -> Vec<Context> {
    let mut contexts = vec![Context::interpreted()];
    if cfg!(all(feature = "jit", target_arch = "x86_64", unix)) {
        let config = RuntimeConfig {
            jit_mode: JitMode::On,
            ..Default::default()
        };
        contexts.push(Context::with_config(config).unwrap());
    }
    contexts
}

fn eval_in(context: &Context, source: &str) -> f64 {
    let mut program = context
        .compile(source)
        .unwrap_or_else(|e| panic!("compile `{}`: {}", source, e));
    context
        .link_program(&mut program)
        .unwrap_or_else(|e| panic!("link `{}`: {}", source, e));
    program.eval().unwrap()
}

fn eval_all(source: &str) -> Vec<f64> {
    contexts().iter().map(|c| eval_in(c, source)).collect()
}

fn assert_eval(source: &str, expected: f64) {
    for (context, value) in contexts().iter().zip(eval_all(source)) {
        assert_eq!(
            value,
            expected,
            "`{}` on the {:?} backend",
            source,
            context.backend()
        );
    }
}

// Arithmetic
#[test]
fn test_arithmetic() {
    assert_eval("1 + 2 * 3", 7.0);
    assert_eval("(1 + 2) * 3", 9.0);
    assert_eval("10 / 4", 2.5);
    assert_eval("1.5 + 0.25", 1.75);
    assert_eval("5. * 2", 10.0);
}

#[test]
fn test_precedence_and_associativity() {
    assert_eval("2 - 3 - 4", -5.0);
    assert_eval("2 + 3 * 4", 14.0);
    assert_eval("8 / 2 / 2", 2.0);
}

#[test]
fn test_unary_operators() {
    assert_eval("-2 + 3", 1.0);
    assert_eval("+(-5)", -5.0);
    assert_eval("- -5", 5.0);
    assert_eval("-(2 * 3)", -6.0);
}

#[test]
fn test_ieee_semantics() {
    for value in eval_all("1 / 0") {
        assert_eq!(value, f64::INFINITY);
    }
    for value in eval_all("0 / 0") {
        assert!(value.is_nan());
    }
    for value in eval_all("-0") {
        assert_eq!(value.to_bits(), (-0.0f64).to_bits());
    }
}

#[test]
fn test_sequence_yields_last_value() {
    assert_eval("1; 2; 3", 3.0);
    assert_eval("sin(0); 4 * 2", 8.0);
}

// Builtins
#[test]
fn test_builtins() {
    assert_eval("max(2, 7)", 7.0);
    assert_eval("min(2, 7)", 2.0);
    assert_eval("sqrt(16)", 4.0);
    assert_eval("fabs(-3)", 3.0);
    assert_eval("pow(2, 10)", 1024.0);
    assert_eval("mix(0, 10, 0.5)", 5.0);
    assert_eval("lerp(0, 10, 0.25)", 2.5);
    assert_eval("clamp(5, 0, 1)", 1.0);
    assert_eval("step(0.5, 0.7)", 1.0);
    assert_eval("round(2.5)", 3.0);
    assert_eval("sin(0) + cos(0)", 1.0);
}

#[test]
fn test_clock_is_callable() {
    for value in eval_all("clock()") {
        assert!(value >= 0.0);
    }
}

// Variables
#[test]
fn test_variable_binding() {
    for mut context in contexts() {
        let x = Variable::new(10.0);
        context.var("x", &x).unwrap();
        let mut program = context.compile("x * 2").unwrap();
        context.link_program(&mut program).unwrap();
        assert_eq!(program.eval(), Ok(20.0));

        x.set(21.0);
        assert_eq!(program.eval(), Ok(42.0));
    }
}

#[test]
fn test_raw_variable_binding() {
    for mut context in contexts() {
        let storage = Box::into_raw(Box::new(3.0f64));
        unsafe { context.var_ptr("y", storage).unwrap() };
        let mut program = context.compile("y + 1").unwrap();
        context.link_program(&mut program).unwrap();
        assert_eq!(program.eval(), Ok(4.0));

        unsafe { *storage = -1.0 };
        assert_eq!(program.eval(), Ok(0.0));
        drop(program);
        drop(context);
        drop(unsafe { Box::from_raw(storage) });
    }
}

#[test]
fn test_eval_is_idempotent() {
    for mut context in contexts() {
        let t = Variable::new(0.3);
        context.var("t", &t).unwrap();
        let mut program = context.compile("sin(t) * 3 / 7 - t").unwrap();
        context.link_program(&mut program).unwrap();
        let first = program.eval().unwrap().to_bits();
        for _ in 0..100 {
            assert_eq!(program.eval().unwrap().to_bits(), first);
        }
    }
}

// Functions
#[test]
fn test_overloads_resolve_by_arity() {
    for mut context in contexts() {
        context.func("f", |a: f64| a + 1.0).unwrap();
        context.func("f", |a: f64, b: f64| a * b).unwrap();
        assert_eq!(eval_in(&context, "f(2)"), 3.0);
        assert_eq!(eval_in(&context, "f(2, 5)"), 10.0);

        let mut program = context.compile("f(1, 2, 3)").unwrap();
        let err = context.link_program(&mut program).unwrap_err();
        assert_eq!(
            err,
            LinkError::UnresolvedSymbol {
                symbol: mangle("f", 3),
                signature: demangle(&mangle("f", 3)),
            }
        );
    }
}

#[test]
fn test_closures_capture_state() {
    for mut context in contexts() {
        let offset = 100.0;
        context.func("shift", move |a: f64| a + offset).unwrap();
        context
            .func_closure("sum4", 4, |args| args.iter().sum())
            .unwrap();
        assert_eq!(eval_in(&context, "shift(1) + sum4(1, 2, 3, 4)"), 111.0);
    }
}

#[test]
fn test_named_subprograms() {
    for mut context in contexts() {
        let t = Variable::new(2.0);
        context.var("t", &t).unwrap();
        context.func_source("double_t", "t * 2").unwrap();
        context.func_source("quad_t", "double_t() * 2").unwrap();
        context.link().unwrap();

        assert_eq!(context.get_func("quad_t").unwrap().eval(), Ok(8.0));
        assert_eq!(eval_in(&context, "quad_t() + double_t()"), 12.0);

        t.set(1.0);
        assert_eq!(eval_in(&context, "quad_t()"), 4.0);
    }
}

#[test]
fn test_recursive_subprograms_are_rejected() {
    for mut context in contexts() {
        context.func_source("ping", "pong() + 1").unwrap();
        context.func_source("pong", "ping() + 1").unwrap();
        assert!(matches!(
            context.link(),
            Err(LinkError::RecursiveDefinition(_))
        ));
    }
}

// Errors
#[test]
fn test_unresolved_symbol_refuses_eval() {
    for context in contexts() {
        let mut program = context.compile("undefined_fn(1)").unwrap();
        assert_eq!(program.eval(), Err(RuntimeError::NotLinked));

        let err = context.link_program(&mut program).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: Undefined symbol: 'double undefined_fn(double)'"
        );
        assert!(!program.is_ready());
        assert!(matches!(program.eval(), Err(RuntimeError::LinkFailed(_))));
    }
}

#[test]
fn test_first_unresolved_symbol_is_the_same_on_every_backend() {
    let errors: Vec<LinkError> = contexts()
        .iter()
        .map(|context| {
            let mut program = context.compile("nope(missing_var)").unwrap();
            context.link_program(&mut program).unwrap_err()
        })
        .collect();
    for err in &errors {
        assert_eq!(
            *err,
            LinkError::UnresolvedSymbol {
                symbol: "missing_var".into(),
                signature: "missing_var".into(),
            }
        );
    }
    assert!(errors.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_relink_after_registration() {
    for mut context in contexts() {
        let mut program = context.compile("late + 1").unwrap();
        assert!(context.link_program(&mut program).is_err());

        let late = Variable::new(41.0);
        context.var("late", &late).unwrap();
        context.link_program(&mut program).unwrap();
        assert_eq!(program.eval(), Ok(42.0));
    }
}

#[test]
fn test_parser_error_position() {
    for context in contexts() {
        let err = context.compile("1 + )").unwrap_err();
        assert_eq!(err.position(), 4);
        assert_eq!(
            err.to_string(),
            "Error, expected expression, but \")\" was found at position 4.\n1 + )\n    ^"
        );
    }
}

#[test]
fn test_compile_errors_leave_context_usable() {
    for context in contexts() {
        assert!(context.compile("(1 + 2").is_err());
        assert!(context.compile("2 $ 3").is_err());
        assert_eq!(eval_in(&context, "2 * 3"), 6.0);
    }
}

#[test]
fn test_mangling_stability() {
    assert_eq!(mangle("foo", 2), mangle("foo", 2));
    assert_eq!(demangle(&mangle("foo", 2)), "double foo(double, double)");
}
