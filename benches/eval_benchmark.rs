//! Compile, link and eval benchmarks for the interpreter and the JIT.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use jitexpr::config::{Backend, JitMode, RuntimeConfig};
use jitexpr::{Context, Variable};
use std::time::Duration;

const EXPRESSIONS: &[(&str, &str)] = &[
    ("arithmetic", "(t + 1) * (t - 2) / 3 - t * t"),
    ("builtins", "sin(t) * cos(t) + sqrt(fabs(t))"),
    ("easing", "mix(0, 100, clamp(t * 2 - 0.5, 0, 1))"),
];

/// Contexts for every backend this build can run.
fn contexts(t: &Variable) -> Vec<Context> {
    let mut modes = vec![JitMode::Off];
    if jitexpr::config::jit_available() {
        modes.push(JitMode::On);
    }
    modes
        .into_iter()
        .map(|jit_mode| {
            let config = RuntimeConfig {
                jit_mode,
                ..Default::default()
            };
            let mut context = Context::with_config(config).unwrap();
            context.var("t", t).unwrap();
            context
        })
        .collect()
}

fn backend_label(context: &Context) -> &'static str {
    match context.backend() {
        Backend::Interpreted => "interpreter",
        Backend::Jit => "jit",
    }
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let t = Variable::new(0.5);

    for context in contexts(&t) {
        for (name, source) in EXPRESSIONS {
            group.bench_with_input(
                BenchmarkId::new(backend_label(&context), name),
                source,
                |b, s| b.iter(|| context.compile(black_box(s)).unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_link(c: &mut Criterion) {
    let mut group = c.benchmark_group("link");
    let t = Variable::new(0.5);

    for context in contexts(&t) {
        for (name, source) in EXPRESSIONS {
            let mut program = context.compile(source).unwrap();
            group.bench_function(BenchmarkId::new(backend_label(&context), name), |b| {
                b.iter(|| context.link_program(black_box(&mut program)).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval");
    group.measurement_time(Duration::from_secs(3));
    let t = Variable::new(0.5);

    for context in contexts(&t) {
        for (name, source) in EXPRESSIONS {
            let mut program = context.compile(source).unwrap();
            context.link_program(&mut program).unwrap();
            group.bench_function(BenchmarkId::new(backend_label(&context), name), |b| {
                b.iter(|| black_box(&program).eval().unwrap())
            });
        }
    }

    group.bench_function(BenchmarkId::new("native", "arithmetic"), |b| {
        b.iter(|| {
            let t = black_box(t.get());
            (t + 1.0) * (t - 2.0) / 3.0 - t * t
        })
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_link, bench_eval);
criterion_main!(benches);
