//! Runtime-guard behavior: each guarded failure prints its fixed
//! diagnostic to stderr and exits the entry with result 3.

mod common;

use common::{lower, run_module};
use prism_ast::builder::*;

fn guard_outcome(program: &prism_ast::Program) -> (u64, String, String) {
    let module = lower(program, "/main");
    run_module(&module)
}

#[test]
fn negative_loop_count_trips_the_guard() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "count", lit_i32(-2)),
            loop_stmt(name("count"), vec![]),
            ret(lit_i32(0)),
        ],
    )]);
    let (result, stdout, stderr) = guard_outcome(&program);
    assert_eq!(result, 3);
    assert!(stdout.is_empty());
    assert_eq!(stderr, "loop count must be non-negative\n");
}

#[test]
fn map_missing_key_trips_the_guard() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("mut")],
                "m",
                map_lit(
                    "i32",
                    "i32",
                    vec![(lit_i32(1), lit_i32(10)), (lit_i32(2), lit_i32(20))],
                ),
            ),
            ret(method("at", name("m"), vec![lit_i32(9)])),
        ],
    )]);
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, 3);
    assert_eq!(stderr, "map key not found\n");
}

#[test]
fn map_lookup_finds_present_keys() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("mut")],
                "m",
                map_lit(
                    "i32",
                    "i32",
                    vec![(lit_i32(1), lit_i32(10)), (lit_i32(2), lit_i32(20))],
                ),
            ),
            ret(method("at", name("m"), vec![lit_i32(2)])),
        ],
    )]);
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, 20);
    assert!(stderr.is_empty());
}

#[test]
fn array_index_bounds_guard() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("array<i32>")],
                "values",
                array_lit("i32", vec![lit_i32(4), lit_i32(7)]),
            ),
            ret(method("at", name("values"), vec![lit_i32(5)])),
        ],
    )]);
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, 3);
    assert_eq!(stderr, "array index out of bounds\n");
}

#[test]
fn vector_pop_on_empty_guard() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![]),
            ),
            call("pop", vec![name("values")]),
            ret(lit_i32(0)),
        ],
    )]);
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, 3);
    assert_eq!(stderr, "vector pop on empty\n");
}

#[test]
fn vector_capacity_exceeded_guard() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![lit_i32(1)]),
            ),
            call("push", vec![name("values"), lit_i32(2)]),
            ret(lit_i32(0)),
        ],
    )]);
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, 3);
    assert_eq!(stderr, "vector capacity exceeded\n");
}

#[test]
fn vector_reserve_guards() {
    let program1 = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![lit_i32(1), lit_i32(2)]),
            ),
            call("reserve", vec![name("values"), lit_i32(-1)]),
            ret(lit_i32(0)),
        ],
    )]);
    let (result, _, stderr) = guard_outcome(&program1);
    assert_eq!(result, 3);
    assert_eq!(stderr, "vector reserve expects non-negative capacity\n");

    let program2 = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![lit_i32(1), lit_i32(2)]),
            ),
            call("reserve", vec![name("values"), lit_i32(5)]),
            ret(lit_i32(0)),
        ],
    )]);
    let (result, _, stderr) = guard_outcome(&program2);
    assert_eq!(result, 3);
    assert_eq!(stderr, "vector reserve exceeds capacity\n");
}

#[test]
fn string_index_guard() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call("at", vec![lit_str("abc"), lit_i32(9)]))],
    )]);
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, 3);
    assert_eq!(stderr, "string index out of bounds\n");
}

#[test]
fn string_at_reads_bytes() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call("at", vec![lit_str("abc"), lit_i32(1)]))],
    )]);
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, u64::from(b'b'));
    assert!(stderr.is_empty());
}

#[test]
fn negative_pow_exponent_guard() {
    let program = program_full(
        vec![def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                binding(&["i32", "mut"], "exponent", lit_i32(-1)),
                ret(call("pow", vec![lit_i32(2), name("exponent")])),
            ],
        )],
        vec!["/math/*"],
        vec![],
    );
    let (result, _, stderr) = guard_outcome(&program);
    assert_eq!(result, 3);
    assert_eq!(stderr, "pow exponent must be non-negative\n");
}

#[test]
fn print_output_order_and_streams() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int"), effects(&["io_out", "io_err"])],
        vec![],
        vec![
            call("print_line", vec![lit_str("one")]),
            call("print_line", vec![lit_i32(2)]),
            call("print_line_error", vec![lit_str("warn")]),
            call("print", vec![lit_str("three")]),
            ret(lit_i32(0)),
        ],
    )]);
    let (result, stdout, stderr) = guard_outcome(&program);
    assert_eq!(result, 0);
    assert_eq!(stdout, "one\n2\nthree");
    assert_eq!(stderr, "warn\n");
}

#[test]
fn print_value_selects_stream_and_newline() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int"), effects(&["io_out", "io_err"])],
        vec![],
        vec![
            call("print_value", vec![lit_i32(1), lit_i32(7), lit_bool(false)]),
            call("print_value", vec![lit_i32(2), lit_f64(1.5), lit_bool(true)]),
            ret(lit_i32(0)),
        ],
    )]);
    let (_, stdout, stderr) = guard_outcome(&program);
    assert_eq!(stdout, "7");
    assert_eq!(stderr, "1.5\n");
}

#[test]
fn print_string_prints_interned_text() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int"), effects(&["io_out"])],
        vec![],
        vec![
            binding(&["string"], "message", lit_str("hello")),
            call("print_string", vec![lit_i32(1), name("message"), lit_bool(true)]),
            ret(lit_i32(0)),
        ],
    )]);
    let (_, stdout, _) = guard_outcome(&program);
    assert_eq!(stdout, "hello\n");
}

#[test]
fn bool_values_print_as_words() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int"), effects(&["io_out"])],
        vec![],
        vec![
            call("print_line", vec![lit_bool(true)]),
            call("print_line", vec![lit_bool(false)]),
            ret(lit_i32(0)),
        ],
    )]);
    let (_, stdout, _) = guard_outcome(&program);
    assert_eq!(stdout, "true\nfalse\n");
}
