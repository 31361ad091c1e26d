//! Math library every [`Context`](crate::Context) starts with.
//!
//! All of these are plain `extern "C"` functions so native code can call
//! them directly.

use crate::function::NativeFn;

extern "C" fn round(a: f64) -> f64 {
    (a + 0.5).trunc()
}

extern "C" fn max(a: f64, b: f64) -> f64 {
    if a > b { a } else { b }
}

extern "C" fn min(a: f64, b: f64) -> f64 {
    if a < b { a } else { b }
}

extern "C" fn step(edge: f64, x: f64) -> f64 {
    if x < edge { 0.0 } else { 1.0 }
}

extern "C" fn mix(a: f64, b: f64, x: f64) -> f64 {
    a * (1.0 - x) + b * x
}

extern "C" fn select(a: f64, b: f64, x: f64) -> f64 {
    if x == 0.0 { a } else { b }
}

unsafe extern "C" {
    #[link_name = "clock"]
    fn c_clock() -> libc::clock_t;
}

/// Processor time in clock ticks.
extern "C" fn clock() -> f64 {
    unsafe { c_clock() as f64 }
}

extern "C" fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x > hi {
        hi
    } else if x < lo {
        lo
    } else {
        x
    }
}

extern "C" fn atan2(a: f64, b: f64) -> f64 {
    a.atan2(b)
}

extern "C" fn pow(x: f64, y: f64) -> f64 {
    x.powf(y)
}

macro_rules! unary {
    ($($name:ident => $body:expr;)*) => {
        $(
            extern "C" fn $name(x: f64) -> f64 {
                let f: fn(f64) -> f64 = $body;
                f(x)
            }
        )*

        const UNARY: &[(&str, extern "C" fn(f64) -> f64)] = &[$((stringify!($name), $name)),*];
    };
}

unary! {
    log => f64::ln;
    exp => f64::exp;
    log10 => f64::log10;
    exp10 => |x| 10f64.powf(x);
    sin => f64::sin;
    cos => f64::cos;
    asin => f64::asin;
    acos => f64::acos;
    tan => f64::tan;
    tanh => f64::tanh;
    atan => f64::atan;
    atanh => f64::atanh;
    fabs => f64::abs;
    sqrt => f64::sqrt;
}

/// Every builtin with its name, in registration order.
pub fn all() -> Vec<(&'static str, NativeFn)> {
    let mut builtins = vec![
        ("round", NativeFn::Arity1(round)),
        ("max", NativeFn::Arity2(max)),
        ("min", NativeFn::Arity2(min)),
        ("step", NativeFn::Arity2(step)),
        ("mix", NativeFn::Arity3(mix)),
        ("lerp", NativeFn::Arity3(mix)),
        ("select", NativeFn::Arity3(select)),
        ("clock", NativeFn::Arity0(clock)),
        ("clamp", NativeFn::Arity3(clamp)),
    ];
    builtins.extend(UNARY.iter().map(|&(name, f)| (name, NativeFn::Arity1(f))));
    builtins.push(("atan2", NativeFn::Arity2(atan2)));
    builtins.push(("pow", NativeFn::Arity2(pow)));
    builtins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(2.49), 2.0);
        assert_eq!(round(-0.2), 0.0);
    }

    #[test]
    fn test_selection_helpers() {
        assert_eq!(step(1.0, 0.5), 0.0);
        assert_eq!(step(1.0, 1.0), 1.0);
        assert_eq!(select(3.0, 4.0, 0.0), 3.0);
        assert_eq!(select(3.0, 4.0, 2.0), 4.0);
        assert_eq!(mix(0.0, 10.0, 0.25), 2.5);
        assert_eq!(clamp(-1.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.5, 0.0, 1.0), 0.5);
    }

    #[test]
    fn test_clock_counts_up() {
        let first = clock();
        let mut spin = 0.0f64;
        for i in 0..100_000 {
            spin += std::hint::black_box(f64::from(i)).sqrt();
        }
        std::hint::black_box(spin);
        let second = clock();
        assert!(first >= 0.0);
        assert!(second >= first);
    }

    #[test]
    fn test_unary_table() {
        assert_eq!(exp10(2.0), 100.0);
        assert_eq!(fabs(-3.0), 3.0);
        assert_eq!(UNARY.len(), 14);
    }

    #[test]
    fn test_all_names_unique() {
        let builtins = all();
        let mut names: Vec<&str> = builtins.iter().map(|(n, _)| *n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), builtins.len());
        assert_eq!(builtins.len(), 25);
    }
}
