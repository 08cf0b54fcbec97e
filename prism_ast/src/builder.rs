//! Construction helpers for tests, examples, and embedding tools.
//!
//! The parser is a separate tool, so everything that needs a `Program` in
//! this workspace assembles one through these helpers. They stay close to
//! the surface syntax: `binding(&["i32", "mut"], "value", lit_i32(2))` is
//! `[i32 mut] value(2i32)`.

use crate::expr::{Call, Expr, FloatLit, FloatWidth, IntLit, IntWidth, NameRef, StrEncoding, StrLit};
use crate::program::{Definition, Execution, Program};
use crate::transform::Transform;

pub fn lit_i32(value: i32) -> Expr {
    Expr::Int(IntLit {
        value: value as i64 as u64,
        width: IntWidth::W32,
        unsigned: false,
    })
}

pub fn lit_i64(value: i64) -> Expr {
    Expr::Int(IntLit {
        value: value as u64,
        width: IntWidth::W64,
        unsigned: false,
    })
}

pub fn lit_u64(value: u64) -> Expr {
    Expr::Int(IntLit {
        value,
        width: IntWidth::W64,
        unsigned: true,
    })
}

pub fn lit_f32(value: f32) -> Expr {
    Expr::Float(FloatLit {
        value: value as f64,
        width: FloatWidth::W32,
    })
}

pub fn lit_f64(value: f64) -> Expr {
    Expr::Float(FloatLit {
        value,
        width: FloatWidth::W64,
    })
}

pub fn lit_bool(value: bool) -> Expr {
    Expr::Bool(value)
}

/// A `"..."utf8` string literal.
pub fn lit_str(value: &str) -> Expr {
    lit_str_enc(value, StrEncoding::Utf8)
}

pub fn lit_str_enc(value: &str, encoding: StrEncoding) -> Expr {
    Expr::Str(StrLit {
        value: value.to_string(),
        encoding,
    })
}

pub fn name(name: &str) -> Expr {
    Expr::Name(NameRef {
        name: name.to_string(),
        namespace: String::new(),
    })
}

pub fn name_ns(namespace: &str, name: &str) -> Expr {
    Expr::Name(NameRef {
        name: name.to_string(),
        namespace: namespace.to_string(),
    })
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Call::new(name, args))
}

pub fn call_ns(namespace: &str, name: &str, args: Vec<Expr>) -> Expr {
    let mut inner = Call::new(name, args);
    inner.namespace = namespace.to_string();
    Expr::Call(inner)
}

/// A templated call such as `convert<i64>(x)` or `array<i32>(...)`.
pub fn call_t(name: &str, template_args: Vec<&str>, args: Vec<Expr>) -> Expr {
    let mut inner = Call::new(name, args);
    inner.template_args = template_args.into_iter().map(str::to_string).collect();
    Expr::Call(inner)
}

/// A statement call with a trailing block: `callee(args) { body }`.
pub fn call_with_body(name: &str, args: Vec<Expr>, body: Vec<Expr>) -> Expr {
    let mut inner = Call::new(name, args);
    inner.body = body;
    inner.has_body = true;
    Expr::Call(inner)
}

/// Replace positional labels: `labeled(call, &[("c", 1)])` marks `args[1]`
/// as the labeled argument `c`.
pub fn labeled(expr: Expr, labels: &[(&str, usize)]) -> Expr {
    match expr {
        Expr::Call(mut inner) => {
            for (label, index) in labels {
                inner.arg_names[*index] = (*label).to_string();
            }
            Expr::Call(inner)
        }
        other => other,
    }
}

/// A dot-receiver method call `receiver.name(args)`; the receiver becomes
/// the leading argument.
pub fn method(name: &str, receiver: Expr, mut args: Vec<Expr>) -> Expr {
    let mut all = vec![receiver];
    all.append(&mut args);
    let mut inner = Call::new(name, all);
    inner.is_method_call = true;
    Expr::Call(inner)
}

/// A field access `receiver.name`.
pub fn field(receiver: Expr, name: &str) -> Expr {
    let mut inner = Call::new(name, vec![receiver]);
    inner.is_field_access = true;
    Expr::Call(inner)
}

/// A bare block envelope `{ body }` used as a then/else branch or loop body.
pub fn envelope(body: Vec<Expr>) -> Expr {
    let mut inner = Call::new("", vec![]);
    inner.body = body;
    inner.has_body = true;
    Expr::Call(inner)
}

/// A `block() { body }` expression.
pub fn block_expr(body: Vec<Expr>) -> Expr {
    let mut inner = Call::new("block", vec![]);
    inner.body = body;
    inner.has_body = true;
    Expr::Call(inner)
}

/// `[types...] name(init)`, a binding with bare type/qualifier transforms.
pub fn binding(types: &[&str], name: &str, init: Expr) -> Expr {
    binding_t(types.iter().map(|t| type_transform(t)).collect(), name, init)
}

/// A binding with explicit transforms (for templated types).
pub fn binding_t(transforms: Vec<Transform>, name: &str, init: Expr) -> Expr {
    let mut inner = Call::new(name, vec![init]);
    inner.is_binding = true;
    inner.transforms = transforms;
    Expr::Call(inner)
}

/// An uninitialized binding (struct fields reject these; parameters use them).
pub fn binding_uninit(types: &[&str], name: &str) -> Expr {
    let mut inner = Call::new(name, vec![]);
    inner.is_binding = true;
    inner.transforms = types.iter().map(|t| type_transform(t)).collect();
    Expr::Call(inner)
}

/// Turn a surface type name into its transform, handling the templated
/// forms `Pointer<T>`, `Reference<T>`, `array<T>`, `vector<T>`, `map<K,V>`.
pub fn type_transform(ty: &str) -> Transform {
    match ty.find('<') {
        Some(open) if ty.ends_with('>') => {
            let base = &ty[..open];
            let inner = &ty[open + 1..ty.len() - 1];
            Transform::templated(base, inner.split(',').map(str::trim).collect())
        }
        _ => Transform::bare(ty),
    }
}

pub fn ret(expr: Expr) -> Expr {
    call("return", vec![expr])
}

pub fn ret_void() -> Expr {
    call("return", vec![])
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    call("assign", vec![target, value])
}

/// `if(cond) { then } else { else }` as a statement.
pub fn if_stmt(cond: Expr, then_body: Vec<Expr>, else_body: Vec<Expr>) -> Expr {
    call("if", vec![cond, envelope(then_body), envelope(else_body)])
}

/// `if(cond, then, else)` as a value expression.
pub fn if_expr(cond: Expr, then_value: Expr, else_value: Expr) -> Expr {
    call("if", vec![cond, then_value, else_value])
}

pub fn loop_stmt(count: Expr, body: Vec<Expr>) -> Expr {
    call("loop", vec![count, envelope(body)])
}

pub fn while_stmt(cond: Expr, body: Vec<Expr>) -> Expr {
    call("while", vec![cond, envelope(body)])
}

pub fn for_stmt(init: Expr, cond: Expr, step: Expr, body: Vec<Expr>) -> Expr {
    call("for", vec![init, cond, step, envelope(body)])
}

/// `repeat(count) { body }`: the count is an argument, the body trails.
pub fn repeat_stmt(count: Expr, body: Vec<Expr>) -> Expr {
    call_with_body("repeat", vec![count], body)
}

/// `array<T>(items...)`.
pub fn array_lit(element_type: &str, items: Vec<Expr>) -> Expr {
    call_t("array", vec![element_type], items)
}

/// `vector<T>(items...)`.
pub fn vector_lit(element_type: &str, items: Vec<Expr>) -> Expr {
    call_t("vector", vec![element_type], items)
}

/// `map<K, V>{k1 = v1, ...}`; pairs arrive flattened.
pub fn map_lit(key_type: &str, value_type: &str, pairs: Vec<(Expr, Expr)>) -> Expr {
    let mut args = Vec::with_capacity(pairs.len() * 2);
    for (key, value) in pairs {
        args.push(key);
        args.push(value);
    }
    call_t("map", vec![key_type, value_type], args)
}

pub fn return_transform(ty: &str) -> Transform {
    Transform::templated("return", vec![ty])
}

pub fn effects(capabilities: &[&str]) -> Transform {
    Transform::with_args("effects", capabilities.iter().map(|c| name(c)).collect())
}

pub fn capabilities(names: &[&str]) -> Transform {
    Transform::with_args("capabilities", names.iter().map(|c| name(c)).collect())
}

pub fn def(
    full_path: &str,
    transforms: Vec<Transform>,
    params: Vec<Expr>,
    body: Vec<Expr>,
) -> Definition {
    let mut definition = Definition::new(full_path);
    definition.transforms = transforms;
    definition.params = params;
    definition.body = body;
    definition
}

pub fn execution(call: Expr) -> Execution {
    Execution {
        call,
        transforms: Vec::new(),
    }
}

pub fn execution_with(call: Expr, transforms: Vec<Transform>) -> Execution {
    Execution { call, transforms }
}

pub fn program(definitions: Vec<Definition>) -> Program {
    Program::with_definitions(definitions)
}

pub fn program_full(
    definitions: Vec<Definition>,
    imports: Vec<&str>,
    executions: Vec<Execution>,
) -> Program {
    Program {
        definitions,
        imports: imports.into_iter().map(str::to_string).collect(),
        executions,
    }
}
