//! Expression nodes.
//!
//! The parser hands every expression over as one of the variants below. A
//! `Call` is deliberately broad: bindings, method calls, field accesses, and
//! block envelopes all arrive as calls with the corresponding flag set, and
//! `arg_names` always has the same length as `args` with the empty string as
//! the positional sentinel.

use serde::{Deserialize, Serialize};

use crate::transform::Transform;

/// Integer literal width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntWidth {
    W32,
    W64,
}

/// Float literal width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatWidth {
    W32,
    W64,
}

/// String literal encoding tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrEncoding {
    Utf8,
    Ascii,
    RawUtf8,
    RawAscii,
}

/// Integer literal. The payload is the raw two's-complement bit pattern;
/// `unsigned` records the `u64` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntLit {
    pub value: u64,
    pub width: IntWidth,
    pub unsigned: bool,
}

/// Float literal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatLit {
    pub value: f64,
    pub width: FloatWidth,
}

/// String literal, already decoded by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrLit {
    pub value: String,
    pub encoding: StrEncoding,
}

/// A bare name reference, possibly carrying the namespace prefix that was in
/// scope where it appeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
    pub namespace: String,
}

/// A call expression. Also used for bindings (`is_binding`), dot-receiver
/// method calls (`is_method_call`, receiver is `args[0]`), field accesses
/// (`is_field_access`), and block envelopes (`has_body` with no args).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub namespace: String,
    pub args: Vec<Expr>,
    /// Parallel to `args`; empty string marks a positional argument.
    pub arg_names: Vec<String>,
    pub template_args: Vec<String>,
    /// The trailing `{ ... }` envelope.
    pub body: Vec<Expr>,
    pub has_body: bool,
    pub is_binding: bool,
    pub is_method_call: bool,
    pub is_field_access: bool,
    pub transforms: Vec<Transform>,
}

impl Call {
    /// A plain call with positional arguments only.
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        let arg_names = vec![String::new(); args.len()];
        Self {
            name: name.into(),
            namespace: String::new(),
            args,
            arg_names,
            template_args: Vec::new(),
            body: Vec::new(),
            has_body: false,
            is_binding: false,
            is_method_call: false,
            is_field_access: false,
            transforms: Vec::new(),
        }
    }

    /// True when any argument is labeled.
    pub fn has_named_arguments(&self) -> bool {
        self.arg_names.iter().any(|n| !n.is_empty())
    }

    /// True for the envelope shape: no args, no template args, no labels,
    /// just a body.
    pub fn is_block_envelope(&self) -> bool {
        !self.is_binding
            && !self.is_method_call
            && self.args.is_empty()
            && self.template_args.is_empty()
            && !self.has_named_arguments()
            && (self.has_body || !self.body.is_empty())
    }

    /// Find a transform by name.
    pub fn transform(&self, name: &str) -> Option<&Transform> {
        self.transforms.iter().find(|t| t.name == name)
    }

    /// True when this is a plain (non-binding, non-method) call with the
    /// given name and no namespace prefix.
    pub fn is_simple_call(&self, name: &str) -> bool {
        !self.is_binding && !self.is_method_call && self.namespace.is_empty() && self.name == name
    }
}

/// An expression in a Prism program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int(IntLit),
    Float(FloatLit),
    Bool(bool),
    Str(StrLit),
    Name(NameRef),
    Call(Call),
}

impl Expr {
    /// The call payload, if this expression is a call.
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    /// True for a binding expression (`[T] name(init)`).
    pub fn is_binding(&self) -> bool {
        matches!(self, Expr::Call(call) if call.is_binding)
    }

    /// True when this is a plain (non-binding, non-method) call with the
    /// given name and no namespace prefix.
    pub fn is_simple_call(&self, name: &str) -> bool {
        match self {
            Expr::Call(call) => call.is_simple_call(name),
            _ => false,
        }
    }

    /// The transforms attached to this expression, if any.
    pub fn transforms(&self) -> &[Transform] {
        match self {
            Expr::Call(call) => &call.transforms,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_envelope_shape() {
        let mut call = Call::new("", vec![]);
        call.has_body = true;
        assert!(call.is_block_envelope());

        let mut with_args = Call::new("", vec![Expr::Bool(true)]);
        with_args.has_body = true;
        assert!(!with_args.is_block_envelope());
    }

    #[test]
    fn named_argument_sentinel() {
        let mut call = Call::new("sum3", vec![Expr::Bool(true), Expr::Bool(false)]);
        assert!(!call.has_named_arguments());
        call.arg_names[1] = "c".to_string();
        assert!(call.has_named_arguments());
    }

    #[test]
    fn simple_call_ignores_method_calls() {
        let mut call = Call::new("count", vec![]);
        call.is_method_call = true;
        assert!(!Expr::Call(call).is_simple_call("count"));
    }
}
