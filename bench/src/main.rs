use jitexpr::config::{JitMode, RuntimeConfig, jit_available};
use jitexpr::{Context, Variable};
use serde::Serialize;
use std::time::Instant;

const ITERATIONS: u32 = 1_000_000;

#[derive(Serialize)]
struct BenchmarkResult {
    name: String,
    expression: String,
    iterations: u32,
    jit_on_secs: Option<f64>,
    jit_off_secs: f64,
    rust_time_secs: f64,
}

#[derive(Serialize)]
struct BenchmarkOutput {
    results: Vec<BenchmarkResult>,
}

// Rust reference implementations

fn rust_polynomial(t: f64) -> f64 {
    (t + 1.0) * (t - 2.0) / 3.0 - t * t
}

fn rust_wave(t: f64) -> f64 {
    (t * 6.2831853).sin() * 0.5 + 0.5
}

fn rust_easing(t: f64) -> f64 {
    let x = (t * 2.0 - 0.5).clamp(0.0, 1.0);
    x * 100.0
}

/// Sample times in [0, 1) so every benchmark sees the same inputs.
fn sample(i: u32) -> f64 {
    f64::from(i) / f64::from(ITERATIONS)
}

fn time_rust(f: fn(f64) -> f64) -> f64 {
    let start = Instant::now();
    let mut sum = 0.0;
    for i in 0..ITERATIONS {
        sum += f(std::hint::black_box(sample(i)));
    }
    let elapsed = start.elapsed().as_secs_f64();
    eprintln!("{}", sum);
    elapsed
}

fn run_benchmark(source: &str, jit_enabled: bool) -> Result<f64, String> {
    let config = RuntimeConfig {
        jit_mode: if jit_enabled {
            JitMode::On
        } else {
            JitMode::Off
        },
        ..Default::default()
    };
    let mut context = Context::with_config(config).map_err(|e| e.to_string())?;
    let t = Variable::new(0.0);
    context.var("t", &t).map_err(|e| e.to_string())?;
    let mut program = context.compile(source).map_err(|e| e.to_string())?;
    context
        .link_program(&mut program)
        .map_err(|e| e.to_string())?;

    let start = Instant::now();
    let mut sum = 0.0;
    for i in 0..ITERATIONS {
        t.set(sample(i));
        sum += program.eval().map_err(|e| e.to_string())?;
    }
    let elapsed = start.elapsed().as_secs_f64();
    eprintln!("{}", sum);
    Ok(elapsed)
}

fn measure(name: &str, source: &str, reference: fn(f64) -> f64) -> BenchmarkResult {
    let rust_time = time_rust(reference);
    let jit_on = if jit_available() {
        match run_benchmark(source, true) {
            Ok(secs) => Some(secs),
            Err(e) => {
                eprintln!("Benchmark {} (jit=on) failed: {}", name, e);
                None
            }
        }
    } else {
        None
    };
    let jit_off = run_benchmark(source, false).unwrap_or_else(|e| {
        eprintln!("Benchmark {} (jit=off) failed: {}", name, e);
        f64::NAN
    });

    BenchmarkResult {
        name: name.to_string(),
        expression: source.to_string(),
        iterations: ITERATIONS,
        jit_on_secs: jit_on,
        jit_off_secs: jit_off,
        rust_time_secs: rust_time,
    }
}

fn main() {
    let results = vec![
        measure("polynomial", "(t + 1) * (t - 2) / 3 - t * t", rust_polynomial),
        measure("wave", "sin(t * 6.2831853) * 0.5 + 0.5", rust_wave),
        measure("easing", "clamp(t * 2 - 0.5, 0, 1) * 100", rust_easing),
    ];

    let output = BenchmarkOutput { results };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to serialize results: {}", e),
    }
}
