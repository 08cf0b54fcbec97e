//! Transform records: the bracketed `[...]` envelope attached to
//! definitions, bindings, and executions.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// One transform such as `return<T>`, `effects(io_out)`, `struct`, `mut`,
/// or a bare type tag like `i32`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    pub template_args: Vec<String>,
    pub args: Vec<Expr>,
    pub body: Vec<Expr>,
}

impl Transform {
    /// A transform with no template args, args, or body (`mut`, `struct`, a
    /// type tag, ...).
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_args: Vec::new(),
            args: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A transform with template arguments (`return<int>`, `array<i32>`).
    pub fn templated(name: impl Into<String>, template_args: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            template_args: template_args.into_iter().map(str::to_string).collect(),
            args: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A transform with call-style arguments (`effects(io_out)`,
    /// `align_bytes(16)`).
    pub fn with_args(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            template_args: Vec::new(),
            args,
            body: Vec::new(),
        }
    }
}
