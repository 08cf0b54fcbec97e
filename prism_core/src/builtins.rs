//! The closed builtin identifier surface.
//!
//! These names cross the source/AST boundary verbatim, so the tables here
//! are the single place the analyzer and the lowerer agree on what exists
//! and how many arguments it takes.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::capability::Capability;

/// Argument-count bounds for a builtin (`max == usize::MAX` means variadic).
#[derive(Debug, Clone, Copy)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

const fn fixed(n: usize) -> Arity {
    Arity { min: n, max: n }
}

const fn between(min: usize, max: usize) -> Arity {
    Arity { min, max }
}

const VARIADIC: Arity = Arity {
    min: 0,
    max: usize::MAX,
};

/// Arities for every builtin name. `loop`/`while`/`for` counts include the
/// body envelope the parser appends; `repeat` carries its body separately.
pub static BUILTIN_ARITIES: Lazy<HashMap<&'static str, Arity>> = Lazy::new(|| {
    let mut m = HashMap::new();
    // arithmetic
    for name in ["plus", "minus", "multiply", "divide", "modulo"] {
        m.insert(name, fixed(2));
    }
    m.insert("negate", fixed(1));
    // comparisons
    for name in [
        "equal",
        "not_equal",
        "greater_than",
        "less_than",
        "greater_equal",
        "less_equal",
    ] {
        m.insert(name, fixed(2));
    }
    // boolean
    m.insert("and", fixed(2));
    m.insert("or", fixed(2));
    m.insert("not", fixed(1));
    // control
    m.insert("if", between(2, 3));
    m.insert("loop", fixed(2));
    m.insert("while", fixed(2));
    m.insert("for", fixed(4));
    m.insert("repeat", fixed(1));
    m.insert("block", fixed(0));
    m.insert("return", between(0, 1));
    // data
    m.insert("array", VARIADIC);
    m.insert("vector", VARIADIC);
    m.insert("map", VARIADIC);
    m.insert("at", fixed(2));
    m.insert("at_unsafe", fixed(2));
    m.insert("count", fixed(1));
    m.insert("capacity", fixed(1));
    m.insert("push", fixed(2));
    m.insert("pop", fixed(1));
    m.insert("reserve", fixed(2));
    m.insert("clear", fixed(1));
    m.insert("remove_at", fixed(2));
    m.insert("remove_swap", fixed(2));
    // memory
    m.insert("location", fixed(1));
    m.insert("dereference", fixed(1));
    m.insert("assign", fixed(2));
    m.insert("increment", fixed(1));
    m.insert("decrement", fixed(1));
    // numerics
    m.insert("clamp", fixed(3));
    m.insert("min", fixed(2));
    m.insert("max", fixed(2));
    m.insert("abs", fixed(1));
    m.insert("sign", fixed(1));
    m.insert("saturate", fixed(1));
    m.insert("lerp", fixed(3));
    m.insert("pow", fixed(2));
    for name in [
        "sqrt", "cbrt", "exp", "exp2", "log", "log2", "log10", "floor", "ceil", "round", "trunc",
        "fract", "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "asinh",
        "acosh", "atanh", "radians", "degrees", "is_nan", "is_inf", "is_finite",
    ] {
        m.insert(name, fixed(1));
    }
    m.insert("atan2", fixed(2));
    m.insert("hypot", fixed(2));
    m.insert("fma", fixed(3));
    m.insert("copysign", fixed(2));
    // conversion
    m.insert("convert", fixed(1));
    // I/O
    m.insert("print", fixed(1));
    m.insert("print_line", fixed(1));
    m.insert("print_error", fixed(1));
    m.insert("print_line_error", fixed(1));
    m.insert("print_value", fixed(3));
    m.insert("print_string", fixed(3));
    m
});

/// The math builtins that live under `/math/...` (or bare after a
/// `/math/*` import).
pub static MATH_BUILTINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abs", "sign", "min", "max", "clamp", "lerp", "saturate", "floor", "ceil", "round",
        "trunc", "fract", "sqrt", "cbrt", "pow", "exp", "exp2", "log", "log2", "log10", "sin",
        "cos", "tan", "asin", "acos", "atan", "atan2", "radians", "degrees", "sinh", "cosh",
        "tanh", "asinh", "acosh", "atanh", "fma", "hypot", "copysign", "is_nan", "is_inf",
        "is_finite",
    ]
    .into_iter()
    .collect()
});

/// Math constants and their values.
pub static MATH_CONSTANTS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("pi", 3.141_592_653_589_793_1);
    m.insert("tau", 6.283_185_307_179_586_2);
    m.insert("e", 2.718_281_828_459_045_1);
    m
});

/// Loop-family statement builtins.
pub fn is_loop_name(name: &str) -> bool {
    matches!(name, "loop" | "while" | "for" | "repeat")
}

/// True for any name in the closed builtin surface.
pub fn is_builtin_name(name: &str) -> bool {
    BUILTIN_ARITIES.contains_key(name)
}

/// The capability a builtin needs, if any. `print_value`/`print_string`
/// depend on their stream argument, which the caller resolves separately.
pub fn required_capability(name: &str) -> Option<Capability> {
    match name {
        "print" | "print_line" => Some(Capability::IoOut),
        "print_error" | "print_line_error" => Some(Capability::IoErr),
        _ => None,
    }
}

/// Lifecycle helper leaf names.
pub fn is_lifecycle_name(name: &str) -> bool {
    matches!(
        name,
        "Create"
            | "Destroy"
            | "Copy"
            | "CreateStack"
            | "DestroyStack"
            | "CreateHeap"
            | "DestroyHeap"
            | "CreateBuffer"
            | "DestroyBuffer"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_surface_contains_spec_names() {
        for name in [
            "plus", "equal", "and", "if", "loop", "array", "at", "location", "clamp", "pow",
            "atan2", "is_finite", "convert", "print_line", "print_value",
        ] {
            assert!(is_builtin_name(name), "missing builtin {name}");
        }
        assert!(!is_builtin_name("printf"));
    }

    #[test]
    fn print_capabilities() {
        assert_eq!(required_capability("print_line"), Some(Capability::IoOut));
        assert_eq!(required_capability("print_line_error"), Some(Capability::IoErr));
        assert_eq!(required_capability("plus"), None);
    }

    #[test]
    fn lifecycle_names() {
        assert!(is_lifecycle_name("Create"));
        assert!(is_lifecycle_name("DestroyBuffer"));
        assert!(!is_lifecycle_name("create"));
    }
}
