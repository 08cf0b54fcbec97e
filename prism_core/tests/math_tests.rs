//! Math builtin expansion conformance. Transcendentals are series-based,
//! so float comparisons allow a small tolerance.

mod common;

use common::{assert_close, result_as_f64, run_program};
use prism_ast::builder::*;

fn run_f64(expr: prism_ast::Expr) -> f64 {
    let program = program_full(
        vec![def(
            "/main",
            vec![return_transform("f64")],
            vec![],
            vec![ret(expr)],
        )],
        vec!["/math/*"],
        vec![],
    );
    result_as_f64(run_program(&program, "/main"))
}

fn run_i32(expr: prism_ast::Expr) -> i64 {
    let program = program_full(
        vec![def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(expr)],
        )],
        vec!["/math/*"],
        vec![],
    );
    run_program(&program, "/main") as i64
}

#[test]
fn integer_min_max_clamp() {
    assert_eq!(run_i32(call("min", vec![lit_i32(4), lit_i32(9)])), 4);
    assert_eq!(run_i32(call("max", vec![lit_i32(4), lit_i32(9)])), 9);
    assert_eq!(
        run_i32(call("clamp", vec![lit_i32(12), lit_i32(0), lit_i32(10)])),
        10
    );
    assert_eq!(
        run_i32(call("clamp", vec![lit_i32(-3), lit_i32(0), lit_i32(10)])),
        0
    );
    assert_eq!(
        run_i32(call("clamp", vec![lit_i32(5), lit_i32(0), lit_i32(10)])),
        5
    );
}

#[test]
fn integer_abs_and_sign() {
    assert_eq!(run_i32(call("abs", vec![lit_i32(-5)])), 5);
    assert_eq!(run_i32(call("abs", vec![lit_i32(5)])), 5);
    assert_eq!(run_i32(call("sign", vec![lit_i32(-9)])), -1);
    assert_eq!(run_i32(call("sign", vec![lit_i32(0)])), 0);
    assert_eq!(run_i32(call("sign", vec![lit_i32(3)])), 1);
}

#[test]
fn integer_pow_loops() {
    assert_eq!(run_i32(call("pow", vec![lit_i32(2), lit_i32(10)])), 1024);
    assert_eq!(run_i32(call("pow", vec![lit_i32(3), lit_i32(0)])), 1);
    assert_eq!(run_i32(call("pow", vec![lit_i32(7), lit_i32(1)])), 7);
}

#[test]
fn negate_rejects_unsigned() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("i64")],
        vec![],
        vec![ret(call("negate", vec![lit_u64(1)]))],
    )]);
    assert!(common::validate_err(&program, "/main")
        .contains("negate does not support unsigned operands"));
}

#[test]
fn float_sqrt_and_cbrt() {
    assert_close(run_f64(call("sqrt", vec![lit_f64(2.0)])), 2f64.sqrt(), 1e-9);
    assert_close(run_f64(call("sqrt", vec![lit_f64(144.0)])), 12.0, 1e-9);
    assert_close(run_f64(call("sqrt", vec![lit_f64(0.25)])), 0.5, 1e-9);
    assert_eq!(run_f64(call("sqrt", vec![lit_f64(0.0)])), 0.0);
    assert!(run_f64(call("sqrt", vec![lit_f64(-1.0)])).is_nan());

    assert_close(run_f64(call("cbrt", vec![lit_f64(27.0)])), 3.0, 1e-9);
    assert_close(run_f64(call("cbrt", vec![lit_f64(-8.0)])), -2.0, 1e-9);
}

#[test]
fn float_exp_and_log() {
    assert_close(run_f64(call("exp", vec![lit_f64(0.0)])), 1.0, 1e-12);
    assert_close(run_f64(call("exp", vec![lit_f64(1.0)])), 1f64.exp(), 1e-9);
    assert_close(run_f64(call("exp", vec![lit_f64(-2.5)])), (-2.5f64).exp(), 1e-9);
    assert_close(run_f64(call("exp2", vec![lit_f64(10.0)])), 1024.0, 1e-6);

    assert_close(run_f64(call("log", vec![lit_f64(1.0)])), 0.0, 1e-12);
    assert_close(run_f64(call("log", vec![lit_f64(10.0)])), 10f64.ln(), 1e-9);
    assert_close(run_f64(call("log2", vec![lit_f64(8.0)])), 3.0, 1e-9);
    assert_close(run_f64(call("log10", vec![lit_f64(1000.0)])), 3.0, 1e-9);
    assert!(run_f64(call("log", vec![lit_f64(-1.0)])).is_nan());
    assert_eq!(run_f64(call("log", vec![lit_f64(0.0)])), f64::NEG_INFINITY);
}

#[test]
fn float_pow_domain_rules() {
    assert_close(run_f64(call("pow", vec![lit_f64(2.0), lit_f64(10.0)])), 1024.0, 1e-6);
    assert_close(run_f64(call("pow", vec![lit_f64(9.0), lit_f64(0.5)])), 3.0, 1e-9);
    assert!(run_f64(call("pow", vec![lit_f64(-2.0), lit_f64(2.0)])).is_nan());
    assert_eq!(run_f64(call("pow", vec![lit_f64(0.0), lit_f64(0.0)])), 1.0);
    assert_eq!(
        run_f64(call("pow", vec![lit_f64(0.0), lit_f64(-1.0)])),
        f64::INFINITY
    );
    assert_eq!(run_f64(call("pow", vec![lit_f64(0.0), lit_f64(2.0)])), 0.0);
}

#[test]
fn float_trig() {
    assert_close(run_f64(call("sin", vec![lit_f64(0.0)])), 0.0, 1e-12);
    assert_close(run_f64(call("sin", vec![lit_f64(1.0)])), 1f64.sin(), 1e-9);
    assert_close(run_f64(call("cos", vec![lit_f64(1.0)])), 1f64.cos(), 1e-9);
    assert_close(run_f64(call("sin", vec![lit_f64(8.0)])), 8f64.sin(), 1e-6);
    assert_close(run_f64(call("tan", vec![lit_f64(0.5)])), 0.5f64.tan(), 1e-9);
}

#[test]
fn float_inverse_trig() {
    assert_close(run_f64(call("atan", vec![lit_f64(1.0)])), std::f64::consts::FRAC_PI_4, 1e-9);
    assert_close(run_f64(call("atan", vec![lit_f64(-3.0)])), (-3f64).atan(), 1e-9);
    assert_close(run_f64(call("asin", vec![lit_f64(0.5)])), 0.5f64.asin(), 1e-9);
    assert_close(run_f64(call("asin", vec![lit_f64(1.0)])), std::f64::consts::FRAC_PI_2, 1e-12);
    assert_close(run_f64(call("acos", vec![lit_f64(0.5)])), 0.5f64.acos(), 1e-9);
    assert!(run_f64(call("asin", vec![lit_f64(2.0)])).is_nan());
}

#[test]
fn float_atan2_quadrants() {
    for (y, x) in [(1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (-1.0, 1.0), (1.0, 0.0), (-1.0, 0.0)] {
        assert_close(
            run_f64(call("atan2", vec![lit_f64(y), lit_f64(x)])),
            y.atan2(x),
            1e-9,
        );
    }
}

#[test]
fn float_hyperbolic() {
    assert_close(run_f64(call("sinh", vec![lit_f64(1.0)])), 1f64.sinh(), 1e-9);
    assert_close(run_f64(call("cosh", vec![lit_f64(1.0)])), 1f64.cosh(), 1e-9);
    assert_close(run_f64(call("tanh", vec![lit_f64(0.5)])), 0.5f64.tanh(), 1e-9);
    assert_close(run_f64(call("asinh", vec![lit_f64(2.0)])), 2f64.asinh(), 1e-9);
    assert_close(run_f64(call("acosh", vec![lit_f64(2.0)])), 2f64.acosh(), 1e-9);
    assert_close(run_f64(call("atanh", vec![lit_f64(0.5)])), 0.5f64.atanh(), 1e-9);
    assert!(run_f64(call("acosh", vec![lit_f64(0.5)])).is_nan());
}

#[test]
fn rounding_family() {
    assert_eq!(run_f64(call("floor", vec![lit_f64(2.7)])), 2.0);
    assert_eq!(run_f64(call("floor", vec![lit_f64(-2.1)])), -3.0);
    assert_eq!(run_f64(call("ceil", vec![lit_f64(2.1)])), 3.0);
    assert_eq!(run_f64(call("ceil", vec![lit_f64(-2.7)])), -2.0);
    assert_eq!(run_f64(call("trunc", vec![lit_f64(-2.7)])), -2.0);
    assert_eq!(run_f64(call("round", vec![lit_f64(2.5)])), 3.0);
    assert_eq!(run_f64(call("round", vec![lit_f64(-2.5)])), -3.0);
    assert_close(run_f64(call("fract", vec![lit_f64(2.75)])), 0.75, 1e-12);
    assert_eq!(run_i32(call("floor", vec![lit_i32(7)])), 7);
    assert_eq!(run_i32(call("fract", vec![lit_i32(7)])), 0);
}

#[test]
fn misc_numeric_helpers() {
    assert_close(run_f64(call("hypot", vec![lit_f64(3.0), lit_f64(4.0)])), 5.0, 1e-9);
    assert_close(
        run_f64(call("fma", vec![lit_f64(2.0), lit_f64(3.0), lit_f64(4.0)])),
        10.0,
        1e-12,
    );
    assert_eq!(run_f64(call("copysign", vec![lit_f64(3.0), lit_f64(-1.0)])), -3.0);
    assert_eq!(run_f64(call("copysign", vec![lit_f64(-3.0), lit_f64(2.0)])), 3.0);
    assert_close(
        run_f64(call("radians", vec![lit_f64(180.0)])),
        std::f64::consts::PI,
        1e-12,
    );
    assert_close(run_f64(call("degrees", vec![name("pi")])), 180.0, 1e-9);
    assert_close(
        run_f64(call("lerp", vec![lit_f64(2.0), lit_f64(6.0), lit_f64(0.25)])),
        3.0,
        1e-12,
    );
    assert_close(run_f64(call("saturate", vec![lit_f64(1.5)])), 1.0, 1e-12);
    assert_close(run_f64(call("saturate", vec![lit_f64(-0.5)])), 0.0, 1e-12);
}

#[test]
fn float_predicates_return_bool() {
    let program = program_full(
        vec![def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(call(
                "and",
                vec![
                    call("is_finite", vec![lit_f64(1.0)]),
                    call(
                        "and",
                        vec![
                            call("is_nan", vec![call("sqrt", vec![lit_f64(-1.0)])]),
                            call(
                                "is_inf",
                                vec![call("pow", vec![lit_f64(0.0), lit_f64(-2.0)])],
                            ),
                        ],
                    ),
                ],
            ))],
        )],
        vec!["/math/*"],
        vec![],
    );
    assert_eq!(run_program(&program, "/main"), 1);
}

#[test]
fn math_constants_push_f64_bits() {
    assert_close(run_f64(name("pi")), std::f64::consts::PI, 0.0);
    assert_close(run_f64(name("tau")), std::f64::consts::TAU, 0.0);
    assert_close(run_f64(name("e")), std::f64::consts::E, 0.0);
}

#[test]
fn float32_math_runs_in_narrow_width() {
    let program = program_full(
        vec![def(
            "/main",
            vec![return_transform("f32")],
            vec![],
            vec![ret(call("sqrt", vec![lit_f32(2.0)]))],
        )],
        vec!["/math/*"],
        vec![],
    );
    let bits = run_program(&program, "/main");
    let value = f32::from_bits(bits as u32);
    assert!((value - 2f32.sqrt()).abs() < 1e-5);
}

#[test]
fn modulo_is_integer_only() {
    assert_eq!(run_i32(call("modulo", vec![lit_i32(17), lit_i32(5)])), 2);
    let program = program(vec![def(
        "/main",
        vec![return_transform("f64")],
        vec![],
        vec![ret(call("modulo", vec![lit_f64(1.0), lit_f64(2.0)]))],
    )]);
    assert!(common::validate_err(&program, "/main").contains("modulo requires integer operands"));
}
