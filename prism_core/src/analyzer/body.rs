//! Statement and expression validation for definition bodies.
//!
//! Walks each body with a scope map, checking envelope shapes, builtin
//! arities, operand kinds (strict: no signedness, int/float, or width
//! mixing), name resolution, mutability, and the capability grants of the
//! enclosing definition.

use std::collections::HashSet;

use prism_ast::{Call, Expr};

use crate::builtins::{is_loop_name, required_capability, BUILTIN_ARITIES};
use crate::capability::Capability;
use crate::context::{BindingKind, LocalMap, SharedContext};
use crate::kinds::{check_operands, combine_numeric, comparison_kind, ValueKind};

use super::transforms::validate_shared_scope_marker;

pub(crate) struct BodyValidator<'c, 'p> {
    pub ctx: &'c SharedContext<'p>,
    /// Effective capability set of the enclosing definition or execution.
    pub caps: HashSet<Capability>,
    /// Set inside lifecycle helpers: returns must stay void.
    pub in_lifecycle: bool,
    /// Name of the entry argv binding when the enclosing definition is the
    /// entry and the driver advertises argv support.
    pub entry_args: Option<String>,
}

impl BodyValidator<'_, '_> {
    pub fn validate_body(&self, stmts: &[Expr], locals: &mut LocalMap) -> Result<(), String> {
        for stmt in stmts {
            self.validate_stmt(stmt, locals)?;
        }
        Ok(())
    }

    pub fn validate_stmt(&self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), String> {
        let Some(call) = stmt.as_call() else {
            // Bare literal or name statements evaluate and discard.
            self.validate_value(stmt, locals)?;
            return Ok(());
        };

        // shared_scope is a statement marker; everything else on a plain
        // statement is unexpected.
        let shared_scope = call.transforms.iter().find(|t| t.name == "shared_scope");
        if let Some(marker) = shared_scope {
            validate_shared_scope_marker(marker)?;
            if !matches!(call.name.as_str(), "loop" | "while" | "for") || call.is_binding {
                return Err("shared_scope is only valid on loop/while/for statements".to_string());
            }
        }

        if call.is_binding {
            return self.validate_binding_stmt(call, locals);
        }

        if call.namespace.is_empty() && !call.is_method_call {
            match call.name.as_str() {
                "loop" | "while" | "for" | "repeat" => {
                    return self.validate_loop_stmt(call, locals, shared_scope.is_some());
                }
                "if" => return self.validate_if_stmt(call, locals),
                "block" => {
                    if self.ctx.resolve_definition_call(call).is_none() {
                        if !call.args.is_empty()
                            || !call.template_args.is_empty()
                            || call.has_named_arguments()
                        {
                            return Err("block does not accept arguments".to_string());
                        }
                        if !call.has_body && call.body.is_empty() {
                            return Err("block requires block arguments".to_string());
                        }
                        let mut block_locals = locals.clone();
                        return self.validate_body(&call.body, &mut block_locals);
                    }
                }
                "return" => {
                    if call.args.len() > 1 {
                        return Err("argument count mismatch for builtin return".to_string());
                    }
                    if let Some(value) = call.args.first() {
                        if self.in_lifecycle {
                            return Err("lifecycle helpers must return void".to_string());
                        }
                        self.validate_value(value, locals)?;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        // A trailing block on any other call requires a definition target.
        if (call.has_body || !call.body.is_empty()) && !call.is_binding {
            let resolved = if call.is_method_call {
                let mut inner = call.clone();
                inner.body.clear();
                inner.has_body = false;
                self.validate_method_call(&inner, locals)?;
                true
            } else {
                self.ctx.resolve_definition_call(call).is_some()
            };
            if !resolved {
                return Err(format!(
                    "block arguments require a definition target: {}",
                    self.ctx.resolve_call_path(call)
                ));
            }
            if !call.is_method_call {
                let mut inner = call.clone();
                inner.body.clear();
                inner.has_body = false;
                self.validate_value(&Expr::Call(inner), locals)?;
            }
            let mut block_locals = locals.clone();
            return self.validate_body(&call.body, &mut block_locals);
        }

        self.validate_value(stmt, locals)?;
        Ok(())
    }

    fn validate_binding_stmt(&self, call: &Call, locals: &mut LocalMap) -> Result<(), String> {
        if call.args.len() != 1 && call.body.is_empty() {
            return Err("binding requires exactly one argument".to_string());
        }
        if locals.contains_key(&call.name) {
            return Err(format!("binding redefines existing name: {}", call.name));
        }
        if let Some(init) = call.args.first() {
            self.validate_value(init, locals)?;
        } else {
            // Brace-block initializer: validate as a value block.
            self.validate_value_block(&call.body, locals)?;
        }
        let info = self.ctx.classify_binding(call, locals, 0);
        locals.insert(call.name.clone(), info);
        Ok(())
    }

    fn validate_loop_stmt(
        &self,
        call: &Call,
        locals: &mut LocalMap,
        shared_scope: bool,
    ) -> Result<(), String> {
        let name = call.name.as_str();
        if !call.template_args.is_empty() {
            return Err(format!("{name} does not accept template arguments"));
        }
        if call.has_named_arguments() {
            return Err("named arguments not supported for builtin calls".to_string());
        }
        match name {
            "loop" => {
                if call.args.len() != 2 {
                    return Err("loop requires count and body".to_string());
                }
                let count = &call.args[0];
                self.validate_value(count, locals)?;
                let kind = self.ctx.infer_expr_kind(count, locals);
                if !kind.is_integer() {
                    return Err("loop count requires integer".to_string());
                }
                if let Expr::Int(lit) = count {
                    if !lit.unsigned && (lit.value as i64) < 0 {
                        return Err("loop count must be non-negative".to_string());
                    }
                }
                let body = self.loop_body_envelope(&call.args[1], name, shared_scope)?;
                let mut body_locals = locals.clone();
                self.validate_body(body, &mut body_locals)
            }
            "while" => {
                if call.args.len() != 2 {
                    return Err("while requires condition and body".to_string());
                }
                self.validate_value(&call.args[0], locals)?;
                if self.ctx.infer_expr_kind(&call.args[0], locals) != ValueKind::Bool {
                    return Err("while condition requires bool".to_string());
                }
                let body = self.loop_body_envelope(&call.args[1], name, shared_scope)?;
                let mut body_locals = locals.clone();
                self.validate_body(body, &mut body_locals)
            }
            "for" => {
                if call.args.len() != 4 {
                    return Err("for requires init, condition, step, and body".to_string());
                }
                let mut loop_locals = locals.clone();
                self.validate_stmt(&call.args[0], &mut loop_locals)?;
                let cond = &call.args[1];
                if let Some(binding) = cond.as_call().filter(|c| c.is_binding) {
                    self.validate_binding_stmt(binding, &mut loop_locals)?;
                    let kind = loop_locals
                        .get(&binding.name)
                        .map(|info| info.value_kind)
                        .unwrap_or(ValueKind::Unknown);
                    if kind != ValueKind::Bool {
                        return Err("for condition binding requires bool".to_string());
                    }
                } else {
                    self.validate_value(cond, &loop_locals)?;
                    if self.ctx.infer_expr_kind(cond, &loop_locals) != ValueKind::Bool {
                        return Err("for condition requires bool".to_string());
                    }
                }
                let body = self.loop_body_envelope(&call.args[3], name, shared_scope)?;
                let mut body_locals = loop_locals.clone();
                self.validate_body(body, &mut body_locals)?;
                self.validate_stmt(&call.args[2], &mut loop_locals)
            }
            "repeat" => {
                if call.args.len() != 1 {
                    return Err("repeat requires exactly one argument".to_string());
                }
                if !call.has_body && call.body.is_empty() {
                    return Err("repeat requires block arguments".to_string());
                }
                self.validate_value(&call.args[0], locals)?;
                let mut kind = self.ctx.infer_expr_kind(&call.args[0], locals);
                if kind == ValueKind::Bool {
                    kind = ValueKind::Int32;
                }
                if !kind.is_integer() {
                    return Err("repeat count requires integer or bool".to_string());
                }
                let mut body_locals = locals.clone();
                self.validate_body(&call.body, &mut body_locals)
            }
            _ => unreachable!("loop family"),
        }
    }

    fn loop_body_envelope<'e>(
        &self,
        body: &'e Expr,
        loop_name: &str,
        shared_scope: bool,
    ) -> Result<&'e [Expr], String> {
        match body.as_call().filter(|c| c.is_block_envelope()) {
            Some(envelope) => Ok(&envelope.body),
            None if shared_scope => Err("shared_scope requires loop body in do() { ... }".to_string()),
            None => Err(format!("{loop_name} body requires a block envelope")),
        }
    }

    fn validate_if_stmt(&self, call: &Call, locals: &mut LocalMap) -> Result<(), String> {
        if call.has_named_arguments() {
            return Err("named arguments not supported for builtin calls".to_string());
        }
        if call.has_body || !call.body.is_empty() {
            return Err("if does not accept trailing block arguments".to_string());
        }
        if call.args.len() < 2 {
            return Err("if requires condition".to_string());
        }
        if call.args.len() > 3 {
            return Err("argument count mismatch for builtin if".to_string());
        }
        self.validate_value(&call.args[0], locals)?;
        if self.ctx.infer_expr_kind(&call.args[0], locals) != ValueKind::Bool {
            return Err("if condition requires bool".to_string());
        }
        let branches = &call.args[1..];
        let envelopes: Vec<_> = branches
            .iter()
            .map(|b| b.as_call().filter(|c| c.is_block_envelope()))
            .collect();
        if envelopes.iter().all(|e| e.is_some()) {
            for envelope in envelopes.into_iter().flatten() {
                let mut branch_locals = locals.clone();
                self.validate_body(&envelope.body, &mut branch_locals)?;
            }
            return Ok(());
        }
        if envelopes.iter().any(|e| e.is_some()) {
            return Err("if branches require block envelopes".to_string());
        }
        // Both branches are plain values: an if expression in statement
        // position.
        self.validate_value(&Expr::Call(call.clone()), locals).map(|_| ())
    }

    // ── value contexts ────────────────────────────────────────────────────

    pub fn validate_value(&self, expr: &Expr, locals: &LocalMap) -> Result<ValueKind, String> {
        match expr {
            Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) | Expr::Str(_) => {
                Ok(self.ctx.infer_expr_kind(expr, locals))
            }
            Expr::Name(name) => {
                if locals.contains_key(&name.name) {
                    return Ok(self.ctx.infer_expr_kind(expr, locals));
                }
                if self.ctx.math_constant_of(&name.name).is_some() {
                    return Ok(ValueKind::Float64);
                }
                if self.entry_args.as_deref() == Some(name.name.as_str()) {
                    return Ok(ValueKind::Array);
                }
                Err(format!("unknown identifier: {}", name.name))
            }
            Expr::Call(call) => self.validate_call_value(call, locals),
        }
    }

    fn validate_call_value(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        if call.is_binding {
            return Err("binding not allowed in expression".to_string());
        }
        if call.is_field_access {
            return self.validate_field_access(call, locals);
        }
        if call.is_method_call {
            return self.validate_method_call(call, locals);
        }
        if is_loop_name(&call.name) && call.namespace.is_empty() && !call.name.is_empty() {
            // Loops never produce a value; `repeat` reaches here only
            // without its body.
            if call.name != "repeat" || call.has_body || !call.body.is_empty() {
                return Err(format!("{} is only supported as a statement", call.name));
            }
        }
        if call.is_block_envelope() && (call.name.is_empty() || call.name == "block") {
            if self.ctx.resolve_definition_call(call).is_none() {
                return self.validate_value_block(&call.body, locals);
            }
        }
        if call.name == "block" && call.namespace.is_empty() {
            if self.ctx.resolve_definition_call(call).is_none() {
                if !call.args.is_empty() || call.has_named_arguments() {
                    return Err("block expression does not accept arguments".to_string());
                }
                if !call.has_body && call.body.is_empty() {
                    return Err("block requires block arguments".to_string());
                }
                return self.validate_value_block(&call.body, locals);
            }
        }
        if let Some(math) = self.ctx.math_builtin_of(call) {
            return self.validate_math_builtin(&math, call, locals);
        }
        // The numeric family is part of the closed builtin surface even
        // without a /math import.
        if call.namespace.is_empty()
            && crate::builtins::MATH_BUILTINS.contains(call.name.as_str())
            && self.ctx.resolve_definition_call(call).is_none()
        {
            return self.validate_math_builtin(&call.name.clone(), call, locals);
        }
        if call.namespace.is_empty()
            && BUILTIN_ARITIES.contains_key(call.name.as_str())
            && !(call.name == "block" && self.ctx.resolve_definition_call(call).is_some())
        {
            // A user definition named `block` keeps its call semantics; every
            // other builtin name keeps its builtin meaning.
            return self.validate_builtin(call, locals);
        }
        self.validate_definition_call(call, locals)
    }

    fn validate_value_block(&self, body: &[Expr], locals: &LocalMap) -> Result<ValueKind, String> {
        if body.is_empty() {
            return Err("block expression requires a value".to_string());
        }
        let mut block_locals = locals.clone();
        for stmt in &body[..body.len() - 1] {
            if let Some(call) = stmt.as_call() {
                if is_loop_name(&call.name) && !call.is_binding && !call.is_method_call {
                    return Err(format!("{} is only supported as a statement", call.name));
                }
                if call.is_simple_call("return") && call.args.is_empty() {
                    return Err("return requires a value in block expression".to_string());
                }
            }
            self.validate_stmt(stmt, &mut block_locals)?;
        }
        let last = &body[body.len() - 1];
        if last.is_binding() {
            return Err("block expression must end with an expression".to_string());
        }
        if let Some(call) = last.as_call() {
            if is_loop_name(&call.name) && !call.is_method_call {
                return Err(format!("{} is only supported as a statement", call.name));
            }
        }
        let kind = self.validate_value(last, &block_locals)?;
        if kind == ValueKind::Void {
            return Err("block expression requires a value".to_string());
        }
        Ok(kind)
    }

    fn validate_math_builtin(
        &self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
    ) -> Result<ValueKind, String> {
        if call.has_named_arguments() {
            return Err("named arguments not supported for builtin calls".to_string());
        }
        let arity = BUILTIN_ARITIES
            .get(name)
            .copied()
            .ok_or_else(|| format!("unknown math builtin: {name}"))?;
        if call.args.len() < arity.min || call.args.len() > arity.max {
            return Err(format!("argument count mismatch for builtin {name}"));
        }
        let mut kinds = Vec::new();
        for arg in &call.args {
            kinds.push(self.validate_value(arg, locals)?);
        }
        match name {
            "is_nan" | "is_inf" | "is_finite" => Ok(ValueKind::Bool),
            "abs" | "sign" | "floor" | "ceil" | "round" | "trunc" | "fract" => {
                if !kinds[0].is_numeric() {
                    return Err(format!("{name} requires a numeric operand"));
                }
                Ok(kinds[0])
            }
            "saturate" | "sqrt" | "cbrt" | "exp" | "exp2" | "log" | "log2" | "log10" | "sin"
            | "cos" | "tan" | "asin" | "acos" | "atan" | "sinh" | "cosh" | "tanh" | "asinh"
            | "acosh" | "atanh" | "radians" | "degrees" => {
                if !kinds[0].is_float() {
                    return Err(format!("{name} requires a floating-point operand"));
                }
                Ok(kinds[0])
            }
            _ => {
                // Two- and three-operand numeric families combine strictly.
                let mut combined = kinds[0];
                for kind in &kinds[1..] {
                    combined = check_operands(name, combined, *kind)?;
                }
                if !combined.is_numeric() {
                    return Err(format!("{name} requires numeric arguments of the same type"));
                }
                Ok(combined)
            }
        }
    }

    fn validate_builtin(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        let name = call.name.as_str();
        if call.has_named_arguments() {
            return Err("named arguments not supported for builtin calls".to_string());
        }
        if is_loop_name(name) {
            return Err(format!("{name} is only supported as a statement"));
        }
        let arity = BUILTIN_ARITIES[name];
        if !matches!(name, "array" | "vector" | "map") {
            if call.args.len() < arity.min || call.args.len() > arity.max {
                return Err(format!("argument count mismatch for builtin {name}"));
            }
        }
        match name {
            "plus" | "minus" | "multiply" | "divide" | "modulo" => {
                let left = self.validate_value(&call.args[0], locals)?;
                let right = self.validate_value(&call.args[1], locals)?;
                if matches!(name, "plus" | "minus") && self.pointer_operand(&call.args[0], locals) {
                    if !right.is_integer() {
                        return Err(format!("pointer {name} requires an integer offset"));
                    }
                    return Ok(ValueKind::Unknown);
                }
                let combined = check_operands(name, left, right)?;
                if name == "modulo" && !combined.is_integer() {
                    return Err("modulo requires integer operands".to_string());
                }
                if !combined.is_numeric() {
                    return Err(format!("{name} requires numeric arguments of the same type"));
                }
                Ok(combined)
            }
            "negate" => {
                let kind = self.validate_value(&call.args[0], locals)?;
                if kind == ValueKind::UInt64 {
                    return Err("negate does not support unsigned operands".to_string());
                }
                if !kind.is_numeric() {
                    return Err("negate requires a numeric operand".to_string());
                }
                Ok(kind)
            }
            "equal" | "not_equal" | "greater_than" | "less_than" | "greater_equal"
            | "less_equal" => {
                let left = self.validate_value(&call.args[0], locals)?;
                let right = self.validate_value(&call.args[1], locals)?;
                if left == ValueKind::String && right == ValueKind::String {
                    return Ok(ValueKind::Bool);
                }
                let numericish = |k: ValueKind| k.is_numeric() || k == ValueKind::Bool;
                if !numericish(left) || !numericish(right) {
                    return Err("comparisons require numeric, bool, or string operands".to_string());
                }
                if comparison_kind(left, right) == ValueKind::Unknown {
                    let l = if left == ValueKind::Bool { ValueKind::Int32 } else { left };
                    let r = if right == ValueKind::Bool { ValueKind::Int32 } else { right };
                    check_operands(name, l, r)?;
                }
                Ok(ValueKind::Bool)
            }
            "and" | "or" | "not" => {
                for arg in &call.args {
                    let kind = self.validate_value(arg, locals)?;
                    if !kind.is_integer() && kind != ValueKind::Bool {
                        return Err(
                            "boolean operators require integer or bool operands".to_string()
                        );
                    }
                }
                Ok(ValueKind::Bool)
            }
            "if" => {
                if call.args.len() != 3 {
                    return Err("if requires condition, then, else".to_string());
                }
                if call.has_body || !call.body.is_empty() {
                    return Err("if does not accept trailing block arguments".to_string());
                }
                self.validate_value(&call.args[0], locals)?;
                if self.ctx.infer_expr_kind(&call.args[0], locals) != ValueKind::Bool {
                    return Err("if condition requires bool".to_string());
                }
                let then_kind = self.validate_value(&call.args[1], locals)?;
                let else_kind = self.validate_value(&call.args[2], locals)?;
                let combined = combine_numeric(then_kind, else_kind);
                Ok(combined)
            }
            "return" => {
                if self.in_lifecycle && !call.args.is_empty() {
                    return Err("lifecycle helpers must return void".to_string());
                }
                if let Some(value) = call.args.first() {
                    self.validate_value(value, locals)?;
                }
                Ok(ValueKind::Void)
            }
            "assign" => self.validate_assign(call, locals),
            "increment" | "decrement" => self.validate_increment(call, locals),
            "convert" => self.validate_convert(call, locals),
            "location" => {
                match &call.args[0] {
                    Expr::Name(target) if locals.contains_key(&target.name) => Ok(ValueKind::Unknown),
                    _ => Err("location requires a local binding".to_string()),
                }
            }
            "dereference" => {
                let pointer = &call.args[0];
                if let Expr::Name(target) = pointer {
                    match locals.get(&target.name) {
                        Some(info)
                            if matches!(
                                info.kind,
                                BindingKind::Pointer | BindingKind::Reference
                            ) => {}
                        Some(_) => {
                            return Err("dereference requires a pointer or reference".to_string())
                        }
                        None => return Err(format!("unknown identifier: {}", target.name)),
                    }
                } else {
                    self.validate_value(pointer, locals)?;
                }
                Ok(self.ctx.pointer_target_kind(pointer, locals))
            }
            "array" | "vector" | "map" => self.validate_collection_literal(call, locals),
            "at" | "at_unsafe" | "count" | "capacity" | "push" | "pop" | "reserve" | "clear"
            | "remove_at" | "remove_swap" => self.validate_collection_access(call, locals),
            "print" | "print_line" | "print_error" | "print_line_error" => {
                let cap = required_capability(name).expect("print builtins declare a capability");
                self.require_capability(name, cap)?;
                self.validate_value(&call.args[0], locals)?;
                Ok(ValueKind::Void)
            }
            "print_value" | "print_string" => {
                let stream = stream_selector(&call.args[0])
                    .ok_or_else(|| format!("{name} stream must be 1 (stdout) or 2 (stderr)"))?;
                let cap = if stream == 2 { Capability::IoErr } else { Capability::IoOut };
                self.require_capability(name, cap)?;
                let value_kind = self.validate_value(&call.args[1], locals)?;
                if name == "print_string" && value_kind != ValueKind::String {
                    return Err("print_string requires a string operand".to_string());
                }
                let newline = self.validate_value(&call.args[2], locals)?;
                if newline != ValueKind::Bool {
                    return Err(format!("{name} newline flag must be bool"));
                }
                Ok(ValueKind::Void)
            }
            "block" => Err("block requires block arguments".to_string()),
            _ => Err(format!("argument count mismatch for builtin {name}")),
        }
    }

    fn validate_assign(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        if call.args.len() != 2 {
            return Err("assign requires exactly two arguments".to_string());
        }
        let target = &call.args[0];
        let value_kind = self.validate_value(&call.args[1], locals)?;
        match target {
            Expr::Name(name) => {
                let info = locals
                    .get(&name.name)
                    .ok_or_else(|| format!("assign target must be a known binding: {}", name.name))?;
                if !info.mutable {
                    if self.in_lifecycle && name.name == "this" {
                        return Err("assign target must be a mutable binding".to_string());
                    }
                    return Err(format!("assign target must be mutable: {}", name.name));
                }
                match info.kind {
                    BindingKind::Value | BindingKind::Reference => {
                        let target_kind = info.value_kind;
                        if target_kind.is_numeric() && value_kind.is_numeric() && target_kind != value_kind
                        {
                            check_operands("assign", target_kind, value_kind)?;
                        }
                        Ok(target_kind)
                    }
                    BindingKind::Pointer => Ok(ValueKind::Unknown),
                    _ => Err("assign target must be a mutable binding".to_string()),
                }
            }
            Expr::Call(inner) if inner.is_simple_call("dereference") => {
                if inner.args.len() != 1 {
                    return Err("dereference requires exactly one argument".to_string());
                }
                if let Expr::Name(pointer) = &inner.args[0] {
                    match locals.get(&pointer.name) {
                        Some(info)
                            if matches!(info.kind, BindingKind::Pointer | BindingKind::Reference) =>
                        {
                            if !info.mutable {
                                return Err(
                                    "assign target must be a mutable pointer binding".to_string()
                                );
                            }
                        }
                        Some(_) => {
                            return Err("dereference requires a pointer or reference".to_string())
                        }
                        None => return Err(format!("unknown identifier: {}", pointer.name)),
                    }
                } else {
                    self.validate_value(&inner.args[0], locals)?;
                }
                Ok(self.ctx.pointer_target_kind(&inner.args[0], locals))
            }
            _ => Err("native backend only supports assign to local names or dereference".to_string()),
        }
    }

    fn validate_increment(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        let name = call.name.as_str();
        match &call.args[0] {
            Expr::Name(target) => {
                let info = locals
                    .get(&target.name)
                    .ok_or_else(|| format!("{name} target must be a known binding: {}", target.name))?;
                if !info.mutable {
                    return Err(format!("{name} target must be mutable: {}", target.name));
                }
                if !matches!(info.kind, BindingKind::Value | BindingKind::Reference) {
                    return Err(format!("{name} target must be a mutable binding"));
                }
                if !info.value_kind.is_numeric() {
                    return Err(format!("{name} requires numeric operand"));
                }
                Ok(info.value_kind)
            }
            Expr::Call(inner) if inner.is_simple_call("dereference") => {
                let kind = self.validate_value(&call.args[0], locals)?;
                if !kind.is_numeric() {
                    return Err(format!("{name} requires numeric operand"));
                }
                Ok(kind)
            }
            _ => Err(format!("{name} target must be a mutable binding")),
        }
    }

    fn validate_convert(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        if call.template_args.len() != 1 {
            return Err("convert requires exactly one template argument".to_string());
        }
        if call.args.len() != 1 {
            return Err("convert requires exactly one argument".to_string());
        }
        let target = ValueKind::from_type_name(&call.template_args[0]);
        if matches!(target, ValueKind::Unknown | ValueKind::Void | ValueKind::String) {
            return Err(
                "native backend only supports convert<int>, convert<i32>, convert<i64>, \
                 convert<u64>, convert<bool>, convert<f32>, or convert<f64>"
                    .to_string(),
            );
        }
        let source = self.validate_value(&call.args[0], locals)?;
        if !source.is_numeric() && source != ValueKind::Bool {
            return Err("convert requires numeric argument".to_string());
        }
        Ok(target)
    }

    fn validate_collection_literal(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        let name = call.name.as_str();
        if name == "map" {
            if call.template_args.len() != 2 {
                return Err("map literal requires exactly two template arguments".to_string());
            }
            if call.args.len() % 2 != 0 {
                return Err("map literal requires an even number of arguments".to_string());
            }
        } else if call.template_args.len() != 1 {
            return Err(format!("{name} literal requires exactly one template argument"));
        }
        for arg in &call.args {
            self.validate_value(arg, locals)?;
        }
        Ok(ValueKind::Unknown)
    }

    fn validate_collection_access(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        for arg in &call.args {
            self.validate_value(arg, locals)?;
        }
        match call.name.as_str() {
            "at" | "at_unsafe" => Ok(self.ctx.element_kind_of(&call.args[0], locals)),
            "count" | "capacity" => Ok(ValueKind::Int32),
            _ => Ok(ValueKind::Void),
        }
    }

    fn validate_method_call(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        if call.args.is_empty() {
            return Err("method call missing receiver".to_string());
        }
        let receiver = &call.args[0];
        match call.name.as_str() {
            "count" | "capacity" | "at" | "at_unsafe" | "push" | "pop" | "reserve" | "clear"
            | "remove_at" | "remove_swap" => {
                if self.collection_receiver(receiver, locals) {
                    for arg in &call.args[1..] {
                        self.validate_value(arg, locals)?;
                    }
                    return match call.name.as_str() {
                        "count" | "capacity" => Ok(ValueKind::Int32),
                        "at" | "at_unsafe" => Ok(self.ctx.element_kind_of(receiver, locals)),
                        _ => Ok(ValueKind::Void),
                    };
                }
            }
            _ => {}
        }
        if let Expr::Name(name) = receiver {
            match locals.get(&name.name) {
                Some(info)
                    if matches!(info.kind, BindingKind::Pointer | BindingKind::Reference)
                        && !info.reference_to_array
                        && info.struct_path.is_none() =>
                {
                    return Err(format!("unknown method target for {}", call.name));
                }
                Some(_) => {}
                None if self.entry_args.as_deref() == Some(name.name.as_str()) => {
                    return Err(format!("unknown method target for {}", call.name));
                }
                None => return Err(format!("unknown identifier: {}", name.name)),
            }
        }
        match self.ctx.method_target_path(call, locals) {
            Some(path) => {
                for arg in &call.args[1..] {
                    self.validate_value(arg, locals)?;
                }
                let info = self.ctx.return_info(&path)?;
                Ok(if info.returns_void { ValueKind::Void } else { info.kind })
            }
            None => {
                if self.ctx.receiver_struct_path(receiver, locals).is_some() {
                    Err(format!("unknown method: {}", call.name))
                } else {
                    Err(format!("unknown method target for {}", call.name))
                }
            }
        }
    }

    fn validate_field_access(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        let receiver = call
            .args
            .first()
            .ok_or_else(|| "field access missing receiver".to_string())?;
        self.validate_value(receiver, locals)?;
        match self.ctx.field_access_info(call, locals) {
            Some((_, kind)) => Ok(kind),
            None => Err(format!("unknown field: {}", call.name)),
        }
    }

    fn validate_definition_call(&self, call: &Call, locals: &LocalMap) -> Result<ValueKind, String> {
        let path = self.ctx.resolve_call_path(call);
        let Some(def) = self.ctx.definition(&path) else {
            return Err(format!("native backend cannot resolve definition: {path}"));
        };
        if self.ctx.is_struct_path(&path) {
            if !call.args.is_empty() {
                return Err(format!("struct constructors do not accept arguments: {path}"));
            }
            return Ok(ValueKind::Unknown);
        }
        // Match positional and labeled arguments against parameters.
        let param_names: Vec<&str> = def
            .params
            .iter()
            .filter_map(|p| p.as_call().map(|c| c.name.as_str()))
            .collect();
        if call.args.len() > def.params.len() {
            return Err(format!("too many arguments in call to {path}"));
        }
        let mut provided = vec![false; def.params.len()];
        let mut positional_done = false;
        for (index, arg) in call.args.iter().enumerate() {
            let label = &call.arg_names[index];
            let slot = if label.is_empty() {
                if positional_done {
                    return Err(format!("positional argument after labeled argument in call to {path}"));
                }
                index
            } else {
                positional_done = true;
                match param_names.iter().position(|p| p == label) {
                    Some(slot) => slot,
                    None => {
                        return Err(format!("unknown named argument: {label} in call to {path}"))
                    }
                }
            };
            provided[slot] = true;
            self.validate_value(arg, locals)?;
        }
        for (slot, param) in def.params.iter().enumerate() {
            if provided[slot] {
                continue;
            }
            let has_default = param.as_call().map(|c| !c.args.is_empty()).unwrap_or(false);
            if !has_default {
                let name = param_names.get(slot).copied().unwrap_or("?");
                return Err(format!("missing argument for parameter {name} in call to {path}"));
            }
        }
        let info = self.ctx.return_info(&path)?;
        Ok(if info.returns_void { ValueKind::Void } else { info.kind })
    }

    fn collection_receiver(&self, receiver: &Expr, locals: &LocalMap) -> bool {
        match receiver {
            Expr::Str(_) => true,
            Expr::Name(name) => {
                if self.entry_args.as_deref() == Some(name.name.as_str()) {
                    return true;
                }
                locals
                    .get(&name.name)
                    .map(|info| {
                        matches!(
                            info.kind,
                            BindingKind::Array | BindingKind::Vector | BindingKind::Map
                        ) || (info.kind == BindingKind::Reference && info.reference_to_array)
                            || info.value_kind == ValueKind::String
                    })
                    .unwrap_or(false)
            }
            Expr::Call(call) => matches!(call.name.as_str(), "array" | "vector" | "map"),
            _ => false,
        }
    }

    fn pointer_operand(&self, expr: &Expr, locals: &LocalMap) -> bool {
        match expr {
            Expr::Name(name) => locals
                .get(&name.name)
                .map(|info| matches!(info.kind, BindingKind::Pointer))
                .unwrap_or(false),
            Expr::Call(call) => call.is_simple_call("location"),
            _ => false,
        }
    }

    fn require_capability(&self, builtin: &str, cap: Capability) -> Result<(), String> {
        if self.caps.contains(&cap) {
            return Ok(());
        }
        Err(format!("{builtin} requires capability {}", cap.name()))
    }
}

fn stream_selector(expr: &Expr) -> Option<u8> {
    match expr {
        Expr::Int(lit) if lit.value == 1 => Some(1),
        Expr::Int(lit) if lit.value == 2 => Some(2),
        _ => None,
    }
}
