//! Struct lowering: constructors, field access, methods, and lifecycle
//! helpers.

mod common;

use common::{lower, run_module, run_program, validate_err};
use prism_ast::builder::*;
use prism_ast::Transform;

#[test]
fn constructor_and_method_call() {
    let program = program(vec![
        def(
            "/Foo",
            vec![Transform::bare("struct")],
            vec![],
            vec![binding(&["i32"], "value", lit_i32(1))],
        ),
        def(
            "/Foo/ping",
            vec![return_transform("int")],
            vec![binding_uninit(&["Foo"], "self")],
            vec![ret(lit_i32(9))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(method("ping", call("Foo", vec![]), vec![]))],
        ),
    ]);
    assert_eq!(run_program(&program, "/main"), 9);
}

#[test]
fn field_access_reads_initialized_value() {
    let program = program(vec![
        def(
            "/Point",
            vec![Transform::bare("struct")],
            vec![],
            vec![
                binding(&["i32"], "x", lit_i32(4)),
                binding(&["i32"], "y", lit_i32(7)),
            ],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                binding_t(vec![type_transform("Point")], "p", call("Point", vec![])),
                ret(call("plus", vec![field(name("p"), "x"), field(name("p"), "y")])),
            ],
        ),
    ]);
    assert_eq!(run_program(&program, "/main"), 11);
}

#[test]
fn methods_read_fields_through_self() {
    let program = program(vec![
        def(
            "/Point",
            vec![Transform::bare("struct")],
            vec![],
            vec![
                binding(&["i32"], "x", lit_i32(3)),
                binding(&["i32"], "y", lit_i32(5)),
            ],
        ),
        def(
            "/Point/total",
            vec![return_transform("int")],
            vec![binding_uninit(&["Point"], "self")],
            vec![ret(call(
                "plus",
                vec![field(name("self"), "x"), field(name("self"), "y")],
            ))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                binding_t(vec![type_transform("Point")], "p", call("Point", vec![])),
                ret(method("total", name("p"), vec![])),
            ],
        ),
    ]);
    assert_eq!(run_program(&program, "/main"), 8);
}

#[test]
fn create_and_destroy_run_in_order() {
    let program = program(vec![
        def(
            "/Thing",
            vec![Transform::bare("struct")],
            vec![],
            vec![binding(&["i32"], "value", lit_i32(1))],
        ),
        def(
            "/Thing/Create",
            vec![return_transform("void"), effects(&["io_out"])],
            vec![],
            vec![call("print_line", vec![lit_i32(1)])],
        ),
        def(
            "/Thing/Destroy",
            vec![return_transform("void"), effects(&["io_out"])],
            vec![],
            vec![call("print_line", vec![lit_i32(2)])],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![call("Thing", vec![]), ret(lit_i32(0))],
        ),
    ]);
    let module = lower(&program, "/main");
    let (result, stdout, _) = run_module(&module);
    assert_eq!(result, 0);
    assert_eq!(stdout, "1\n2\n");
}

#[test]
fn destroy_runs_per_iteration_for_loop_scoped_structs() {
    let program = program(vec![
        def(
            "/Thing",
            vec![Transform::bare("struct")],
            vec![],
            vec![binding(&["i32"], "value", lit_i32(1))],
        ),
        def(
            "/Thing/Destroy",
            vec![return_transform("void"), effects(&["io_out"])],
            vec![],
            vec![call("print_line", vec![lit_i32(9)])],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                loop_stmt(
                    lit_i32(2),
                    vec![binding_t(
                        vec![type_transform("Thing")],
                        "item",
                        call("Thing", vec![]),
                    )],
                ),
                ret(lit_i32(0)),
            ],
        ),
    ]);
    let module = lower(&program, "/main");
    let (_, stdout, _) = run_module(&module);
    assert_eq!(stdout, "9\n9\n");
}

#[test]
fn unknown_method_is_rejected() {
    let program = program(vec![
        def(
            "/Foo",
            vec![Transform::bare("struct")],
            vec![],
            vec![binding(&["i32"], "value", lit_i32(1))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                binding_t(vec![type_transform("Foo")], "foo", call("Foo", vec![])),
                ret(method("missing", name("foo"), vec![])),
            ],
        ),
    ]);
    assert!(validate_err(&program, "/main").contains("unknown method: missing"));
}

#[test]
fn method_calls_on_raw_pointers_are_rejected() {
    let program = program(vec![def(
        "/main",
        vec![return_transform("int")],
        vec![],
        vec![
            binding(&["i32", "mut"], "value", lit_i32(1)),
            binding_t(
                vec![type_transform("Pointer<i32>")],
                "ptr",
                call("location", vec![name("value")]),
            ),
            ret(method("ping", name("ptr"), vec![])),
        ],
    )]);
    assert!(validate_err(&program, "/main").contains("unknown method target for ping"));
}

#[test]
fn unknown_field_is_rejected() {
    let program = program(vec![
        def(
            "/Foo",
            vec![Transform::bare("struct")],
            vec![],
            vec![binding(&["i32"], "value", lit_i32(1))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![
                binding_t(vec![type_transform("Foo")], "foo", call("Foo", vec![])),
                ret(field(name("foo"), "missing")),
            ],
        ),
    ]);
    assert!(validate_err(&program, "/main").contains("unknown field: missing"));
}

#[test]
fn struct_constructors_reject_arguments() {
    let program = program(vec![
        def(
            "/Foo",
            vec![Transform::bare("struct")],
            vec![],
            vec![binding(&["i32"], "value", lit_i32(1))],
        ),
        def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![call("Foo", vec![lit_i32(1)]), ret(lit_i32(0))],
        ),
    ]);
    assert!(validate_err(&program, "/main").contains("struct constructors do not accept arguments"));
}
