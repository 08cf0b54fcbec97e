//! Collection lowering: literals, indexing, count/capacity, vector
//! mutators, map lookups with string keys, and entry argv helpers.

mod common;

use common::{lower_with, run_module, run_program};
use prism_ast::builder::*;
use prism_core::CoreOptions;

#[test]
fn array_literal_indexing() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("array<i32>")],
                "values",
                array_lit("i32", vec![lit_i32(4), lit_i32(7), lit_i32(9)]),
            ),
            ret(method("at", name("values"), vec![lit_i32(1)])),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 7);
}

#[test]
fn at_unsafe_skips_the_guard_for_valid_indices() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("array<i32>")],
                "values",
                array_lit("i32", vec![lit_i32(5), lit_i32(6)]),
            ),
            ret(method("at_unsafe", name("values"), vec![lit_i32(0)])),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 5);
}

#[test]
fn array_count() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("array<i32>")],
                "values",
                array_lit("i32", vec![lit_i32(1), lit_i32(2), lit_i32(3)]),
            ),
            ret(method("count", name("values"), vec![])),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 3);
}

#[test]
fn string_count_folds_to_length() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call("count", vec![lit_str("hello")]))],
    )]);
    assert_eq!(run_program(&program, "/main"), 5);
}

#[test]
fn vector_push_pop_and_count() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![lit_i32(10), lit_i32(20), lit_i32(30)]),
            ),
            call("pop", vec![name("values")]),
            call("push", vec![name("values"), lit_i32(40)]),
            ret(call(
                "plus",
                vec![
                    method("count", name("values"), vec![]),
                    method("at", name("values"), vec![lit_i32(2)]),
                ],
            )),
        ],
    )]);
    // Three elements again after pop+push; the last one is 40.
    assert_eq!(run_program(&program, "/main"), 43);
}

#[test]
fn vector_capacity_survives_clear() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![lit_i32(1), lit_i32(2)]),
            ),
            call("clear", vec![name("values")]),
            ret(call(
                "plus",
                vec![
                    method("count", name("values"), vec![]),
                    method("capacity", name("values"), vec![]),
                ],
            )),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 2);
}

#[test]
fn vector_remove_at_shifts_elements() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![lit_i32(1), lit_i32(2), lit_i32(3)]),
            ),
            call("remove_at", vec![name("values"), lit_i32(0)]),
            ret(call(
                "plus",
                vec![
                    method("count", name("values"), vec![]),
                    method("at", name("values"), vec![lit_i32(0)]),
                ],
            )),
        ],
    )]);
    // Two elements left, first is 2.
    assert_eq!(run_program(&program, "/main"), 4);
}

#[test]
fn vector_remove_swap_moves_last_into_hole() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>"), type_transform("mut")],
                "values",
                vector_lit("i32", vec![lit_i32(1), lit_i32(2), lit_i32(3)]),
            ),
            call("remove_swap", vec![name("values"), lit_i32(0)]),
            ret(method("at", name("values"), vec![lit_i32(0)])),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 3);
}

#[test]
fn vector_mutators_require_mutable_binding() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("vector<i32>")],
                "values",
                vector_lit("i32", vec![lit_i32(1)]),
            ),
            call("push", vec![name("values"), lit_i32(2)]),
            ret(lit_i32(0)),
        ],
    )]);
    let error = common::lower_err(&program, "/main");
    assert!(error.contains("push requires mutable vector binding"));
}

#[test]
fn map_with_string_keys() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("mut")],
                "ports",
                map_lit(
                    "string",
                    "i32",
                    vec![(lit_str("http"), lit_i32(80)), (lit_str("https"), lit_i32(443))],
                ),
            ),
            ret(method("at", name("ports"), vec![lit_str("https")])),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 443);
}

#[test]
fn map_count_reports_pairs() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("mut")],
                "m",
                map_lit("i32", "i32", vec![(lit_i32(1), lit_i32(2)), (lit_i32(3), lit_i32(4))]),
            ),
            ret(method("count", name("m"), vec![])),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 2);
}

#[test]
fn map_literal_shape_errors() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![type_transform("mut")],
                "m",
                call_t("map", vec!["i32", "i32"], vec![lit_i32(1)]),
            ),
            ret(lit_i32(0)),
        ],
    )]);
    let error = common::validate_err(&program, "/main");
    assert!(error.contains("map literal requires an even number of arguments"));
}

#[test]
fn entry_argv_count_and_at() {
    let options = CoreOptions {
        entry_args: Some(vec!["tool".to_string(), "alpha".to_string(), "beta".to_string()]),
        ..CoreOptions::default()
    };
    let program = program(vec![def(
        "/main",
        vec![return_transform("int"), effects(&["io_out"])],
        vec![binding_uninit(&["array<string>"], "args")],
        vec![
            call("print_line", vec![method("at", name("args"), vec![lit_i32(1)])]),
            ret(method("count", name("args"), vec![])),
        ],
    )]);
    let module = lower_with(&program, "/main", &options);
    let (result, stdout, _) = run_module(&module);
    assert_eq!(result, 3);
    assert_eq!(stdout, "alpha\n");
}

#[test]
fn entry_parameters_need_argv_support() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![binding_uninit(&["array<string>"], "args")],
        vec![ret(method("count", name("args"), vec![]))],
    )]);
    let error = common::lower_err(&program, "/main");
    assert!(error.contains("argv support"), "unexpected diagnostic: {error}");
}

#[test]
fn argv_strings_are_rejected_as_map_keys() {
    let options = CoreOptions {
        entry_args: Some(vec!["tool".to_string(), "http".to_string()]),
        ..CoreOptions::default()
    };
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![binding_uninit(&["array<string>"], "args")],
        vec![
            binding_t(
                vec![type_transform("mut")],
                "ports",
                map_lit("string", "i32", vec![(lit_str("http"), lit_i32(80))]),
            ),
            binding(&["string"], "key", method("at", name("args"), vec![lit_i32(1)])),
            ret(method("at", name("ports"), vec![name("key")])),
        ],
    )]);
    prism_core::SemanticAnalyzer::new(options.clone())
        .validate(&program, "/main")
        .expect("validates");
    let error = prism_core::IrLowerer::new(options)
        .lower(&program, "/main")
        .expect_err("argv keys must be rejected")
        .to_string();
    assert!(
        error.contains("argv"),
        "unexpected diagnostic: {error}"
    );
}
