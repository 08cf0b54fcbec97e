//! Lowering shape tests: exact instruction sequences for the small
//! pipelines, inlining behavior, and control-flow skeletons.

mod common;

use common::{has_op, lower, lower_err, ops, run_module, run_program};
use prism_ast::builder::*;
use prism_core::IrOpcode::{self, *};

#[test]
fn add_two_ints_lowers_to_exact_sequence() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call("plus", vec![lit_i32(1), lit_i32(2)]))],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(ops(&module), vec![PushI32, PushI32, AddI32, ReturnI32]);
    assert_eq!(run_module(&module).0, 3);
}

#[test]
fn literal_statement_is_popped() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![lit_i32(1), ret(lit_i32(2))],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(ops(&module), vec![PushI32, Pop, PushI32, ReturnI32]);
    assert_eq!(run_module(&module).0, 2);
}

#[test]
fn i64_arithmetic_selects_wide_opcodes() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("i64")],
        vec![],
        vec![ret(call("plus", vec![lit_i64(1), lit_i64(2)]))],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(ops(&module), vec![PushI64, PushI64, AddI64, ReturnI64]);
    assert_eq!(run_module(&module).0, 3);
}

#[test]
fn u64_comparison_uses_unsigned_opcode() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call(
            "greater_than",
            vec![lit_u64(u64::MAX), lit_u64(1)],
        ))],
    )]);
    let module = lower(&program, "/main");
    assert!(has_op(&module, CmpGtU64));
    assert_eq!(run_module(&module).0, 1);
}

#[test]
fn locals_and_assign_statement_sequence() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(2)),
            assign(name("value"), call("plus", vec![name("value"), lit_i32(3)])),
            ret(name("value")),
        ],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(
        ops(&module),
        vec![
            PushI32, StoreLocal, LoadLocal, PushI32, AddI32, Dup, StoreLocal, Pop, LoadLocal,
            ReturnI32,
        ]
    );
    assert_eq!(run_module(&module).0, 5);
}

#[test]
fn assign_as_return_expression_keeps_value() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(1)),
            ret(assign(name("value"), lit_i32(4))),
        ],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(
        ops(&module),
        vec![PushI32, StoreLocal, PushI32, Dup, StoreLocal, ReturnI32]
    );
    assert_eq!(run_module(&module).0, 4);
}

#[test]
fn implicit_void_return_is_appended() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("void")],
        vec![],
        vec![binding(&["i32"], "value", lit_i32(2))],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(ops(&module), vec![PushI32, StoreLocal, ReturnVoid]);
    assert_eq!(run_module(&module).0, 0);
}

#[test]
fn missing_return_transform_defaults_to_void() {
    let program = program(vec![def(
        "/main",
        vec![],
        vec![],
        vec![binding(&["i32"], "value", lit_i32(4))],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(ops(&module), vec![PushI32, StoreLocal, ReturnVoid]);
}

#[test]
fn explicit_void_return_is_not_duplicated() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("void")],
        vec![],
        vec![ret_void()],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(ops(&module), vec![ReturnVoid]);
}

#[test]
fn expression_statement_discards_value() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            call("plus", vec![lit_i32(1), lit_i32(2)]),
            ret(lit_i32(7)),
        ],
    )]);
    let module = lower(&program, "/main");
    assert_eq!(
        ops(&module),
        vec![PushI32, PushI32, AddI32, Pop, PushI32, ReturnI32]
    );
    assert_eq!(run_module(&module).0, 7);
}

#[test]
fn definition_calls_are_fully_inlined() {
    let program = program(vec![
        def(
            "/addOne",
            vec![return_transform("int")],
            vec![binding_uninit(&["i32"], "x")],
            vec![ret(call("plus", vec![name("x"), lit_i32(1)]))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(call("addOne", vec![lit_i32(2)]))],
        ),
    ]);
    let module = lower(&program, "/main");
    assert_eq!(module.functions.len(), 1);
    assert_eq!(run_module(&module).0, 3);
}

#[test]
fn inlining_honors_defaults_and_labels() {
    let program = program(vec![
        def(
            "/sum3",
            vec![return_transform("int")],
            vec![
                binding_uninit(&["i32"], "a"),
                binding(&["i32"], "b", lit_i32(2)),
                binding(&["i32"], "c", lit_i32(3)),
            ],
            vec![ret(call(
                "plus",
                vec![call("plus", vec![name("a"), name("b")]), name("c")],
            ))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(labeled(
                call("sum3", vec![lit_i32(1), lit_i32(10)]),
                &[("c", 1)],
            ))],
        ),
    ]);
    assert_eq!(run_program(&program, "/main"), 13);
}

#[test]
fn void_definition_call_as_statement() {
    let program = program(vec![
        def("/touch", vec![return_transform("void")], vec![], vec![ret_void()]),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![call("touch", vec![]), ret(lit_i32(7))],
        ),
    ]);
    let module = lower(&program, "/main");
    assert_eq!(module.functions.len(), 1);
    assert_eq!(run_module(&module).0, 7);
}

#[test]
fn recursive_definition_calls_are_rejected() {
    let program = program(vec![
        def(
            "/spin",
            vec![return_transform("int")],
            vec![binding_uninit(&["i32"], "x")],
            vec![ret(call("spin", vec![name("x")]))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(call("spin", vec![lit_i32(1)]))],
        ),
    ]);
    let error = lower_err(&program, "/main");
    assert!(error.contains("recursive"), "unexpected diagnostic: {error}");
}

#[test]
fn comparisons_and_boolean_ops() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call(
            "and",
            vec![
                call("greater_than", vec![lit_i32(5), lit_i32(2)]),
                call("not_equal", vec![lit_i32(3), lit_i32(0)]),
            ],
        ))],
    )]);
    let module = lower(&program, "/main");
    assert!(has_op(&module, CmpGtI32));
    assert!(has_op(&module, CmpNeI32));
    assert_eq!(run_module(&module).0, 1);
}

#[test]
fn boolean_not_and_or() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call(
            "or",
            vec![call("not", vec![lit_bool(false)]), lit_bool(false)],
        ))],
    )]);
    assert_eq!(run_program(&program, "/main"), 1);
}

#[test]
fn numeric_operands_to_boolean_ops() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call(
            "and",
            vec![lit_i32(1), call("not", vec![lit_i32(0)])],
        ))],
    )]);
    assert_eq!(run_program(&program, "/main"), 1);
}

#[test]
fn short_circuit_and_skips_side_effect() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(1)),
            binding(&["i32", "mut"], "witness", lit_i32(0)),
            assign(
                name("value"),
                call(
                    "and",
                    vec![
                        call("equal", vec![name("value"), lit_i32(0)]),
                        assign(name("witness"), lit_i32(9)),
                    ],
                ),
            ),
            ret(name("witness")),
        ],
    )]);
    let module = lower(&program, "/main");
    assert!(has_op(&module, JumpIfZero));
    assert!(has_op(&module, Jump));
    assert_eq!(run_module(&module).0, 0);
}

#[test]
fn short_circuit_or_skips_side_effect() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(1)),
            binding(&["i32", "mut"], "witness", lit_i32(0)),
            assign(
                name("value"),
                call(
                    "or",
                    vec![
                        call("equal", vec![name("value"), lit_i32(1)]),
                        assign(name("witness"), lit_i32(9)),
                    ],
                ),
            ),
            ret(name("witness")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 0);
}

#[test]
fn if_else_statement_lowers_to_jumps() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32"], "value", lit_i32(1)),
            if_stmt(
                call("less_equal", vec![name("value"), lit_i32(1)]),
                vec![ret(lit_i32(7))],
                vec![ret(lit_i32(3))],
            ),
        ],
    )]);
    let module = lower(&program, "/main");
    assert!(has_op(&module, Jump));
    assert!(has_op(&module, JumpIfZero));
    assert_eq!(run_module(&module).0, 7);
}

#[test]
fn if_expression_selects_else_branch() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(if_expr(lit_bool(false), lit_i32(4), lit_i32(9)))],
    )]);
    let module = lower(&program, "/main");
    assert!(has_op(&module, Jump));
    assert!(has_op(&module, JumpIfZero));
    assert_eq!(run_module(&module).0, 9);
}

#[test]
fn repeat_lowers_to_counted_loop() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(0)),
            repeat_stmt(
                lit_i32(3),
                vec![assign(
                    name("value"),
                    call("plus", vec![name("value"), lit_i32(2)]),
                )],
            ),
            ret(name("value")),
        ],
    )]);
    let module = lower(&program, "/main");
    assert!(has_op(&module, Jump));
    assert!(has_op(&module, JumpIfZero));
    assert_eq!(run_module(&module).0, 6);
}

#[test]
fn repeat_with_non_positive_count_skips_body() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(0)),
            repeat_stmt(lit_i32(-2), vec![assign(name("value"), lit_i32(9))]),
            ret(name("value")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 0);
}

#[test]
fn while_loop_counts_up() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "i", lit_i32(0)),
            while_stmt(
                call("less_than", vec![name("i"), lit_i32(5)]),
                vec![assign(name("i"), call("plus", vec![name("i"), lit_i32(1)]))],
            ),
            ret(name("i")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 5);
}

#[test]
fn for_loop_accumulates() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "total", lit_i32(0)),
            for_stmt(
                binding(&["i32", "mut"], "i", lit_i32(0)),
                call("less_than", vec![name("i"), lit_i32(4)]),
                assign(name("i"), call("plus", vec![name("i"), lit_i32(1)])),
                vec![assign(
                    name("total"),
                    call("plus", vec![name("total"), name("i")]),
                )],
            ),
            ret(name("total")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 6);
}

#[test]
fn loop_runs_count_times() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "total", lit_i32(0)),
            loop_stmt(
                lit_i32(4),
                vec![assign(
                    name("total"),
                    call("plus", vec![name("total"), lit_i32(3)]),
                )],
            ),
            ret(name("total")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 12);
}

#[test]
fn loop_accepts_i64_and_u64_counts() {
    for count in [lit_i64(3), lit_u64(3)] {
        let program = program(vec![def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                binding(&["i32", "mut"], "total", lit_i32(0)),
                loop_stmt(
                    count,
                    vec![assign(
                        name("total"),
                        call("plus", vec![name("total"), lit_i32(1)]),
                    )],
                ),
                ret(name("total")),
            ],
        )]);
        assert_eq!(run_program(&program, "/main"), 3);
    }
}

#[test]
fn pointer_location_and_dereference() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(1)),
            binding_t(
                vec![type_transform("Pointer<i32>"), type_transform("mut")],
                "ptr",
                call("location", vec![name("value")]),
            ),
            assign(call("dereference", vec![name("ptr")]), lit_i32(7)),
            ret(call("dereference", vec![name("ptr")])),
        ],
    )]);
    let module = lower(&program, "/main");
    assert!(has_op(&module, AddressOfLocal));
    assert!(has_op(&module, LoadIndirect));
    assert!(has_op(&module, StoreIndirect));
    assert_eq!(run_module(&module).0, 7);
}

#[test]
fn pointer_store_is_visible_through_binding() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(2)),
            binding_t(
                vec![type_transform("Pointer<i32>"), type_transform("mut")],
                "ptr",
                call("location", vec![name("value")]),
            ),
            assign(call("dereference", vec![name("ptr")]), lit_i32(9)),
            ret(name("value")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 9);
}

#[test]
fn pointer_plus_uses_sixteen_byte_stride() {
    // Two adjacent locals sit 16 bytes apart, so +16 lands on the second.
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32"], "first", lit_i32(4)),
            binding(&["i32"], "second", lit_i32(9)),
            ret(call(
                "dereference",
                vec![call(
                    "plus",
                    vec![call("location", vec![name("first")]), lit_i32(16)],
                )],
            )),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 9);
}

#[test]
fn increment_and_decrement() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(5)),
            call("increment", vec![name("value")]),
            call("increment", vec![name("value")]),
            call("decrement", vec![name("value")]),
            ret(name("value")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 6);
}

#[test]
fn convert_between_widths() {
    let program1 = program(vec![def(
        "/main",
        vec![return_transform("i64")],
        vec![],
        vec![ret(call_t("convert", vec!["i64"], vec![lit_i32(12)]))],
    )]);
    assert_eq!(run_program(&program1, "/main"), 12);

    let program2 = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call_t("convert", vec!["i32"], vec![lit_f64(3.9)]))],
    )]);
    assert_eq!(run_program(&program2, "/main"), 3);

    let program3 = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![ret(call_t("convert", vec!["bool"], vec![lit_i32(42)]))],
    )]);
    assert_eq!(run_program(&program3, "/main"), 1);
}

#[test]
fn value_block_yields_last_expression() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding_t(
                vec![],
                "value",
                block_expr(vec![binding(&["i32"], "inner", lit_i32(3)), name("inner")]),
            ),
            ret(name("value")),
        ],
    )]);
    assert_eq!(run_program(&program, "/main"), 3);
}

#[test]
fn statement_call_with_trailing_block() {
    let program = program(vec![
        def(
            "/execute",
            vec![return_transform("void")],
            vec![binding_uninit(&["i32"], "count")],
            vec![ret_void()],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                binding(&["i32", "mut"], "value", lit_i32(1)),
                call_with_body(
                    "execute",
                    vec![lit_i32(2)],
                    vec![assign(name("value"), lit_i32(3))],
                ),
                ret(name("value")),
            ],
        ),
    ]);
    assert_eq!(run_program(&program, "/main"), 3);
}

#[test]
fn jump_targets_stay_in_range() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "i", lit_i32(0)),
            while_stmt(
                call("less_than", vec![name("i"), lit_i32(3)]),
                vec![assign(name("i"), call("plus", vec![name("i"), lit_i32(1)]))],
            ),
            if_stmt(
                call("equal", vec![name("i"), lit_i32(3)]),
                vec![ret(lit_i32(1))],
                vec![ret(lit_i32(0))],
            ),
        ],
    )]);
    let module = lower(&program, "/main");
    let len = module.functions[0].instructions.len() as u64;
    for instruction in &module.functions[0].instructions {
        if matches!(instruction.op, IrOpcode::Jump | IrOpcode::JumpIfZero) {
            assert!(instruction.imm <= len, "jump target {} out of range", instruction.imm);
        }
    }
    assert_eq!(run_module(&module).0, 1);
}
