//! Expression lowering.
//!
//! `emit_expr` leaves exactly one value on the stack. Width selection uses
//! the promoting combiner (the analyzer has already rejected genuine
//! mixes); strings resolve to table indices at lower time.

use prism_ast::{Call, Expr, FloatWidth, IntWidth};

use crate::builtins::BUILTIN_ARITIES;
use crate::context::{BindingKind, LocalMap, StringSource};
use crate::ir::{encode_print_flags, encode_print_string_imm, encode_print_value_imm, IrOpcode};
use crate::kinds::{combine_numeric, comparison_kind, ValueKind};

use super::{FuncLowerer, LowerResult};

impl FuncLowerer<'_, '_> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr, locals: &LocalMap) -> LowerResult<()> {
        match expr {
            Expr::Int(lit) => {
                if lit.width == IntWidth::W32 && !lit.unsigned {
                    self.push_i32(lit.value as i64 as i32);
                } else {
                    self.emit_imm(IrOpcode::PushI64, lit.value);
                }
                Ok(())
            }
            Expr::Float(lit) => {
                if lit.width == FloatWidth::W64 {
                    self.push_f64_const(lit.value);
                } else {
                    self.push_f32_const(lit.value as f32);
                }
                Ok(())
            }
            Expr::Bool(value) => {
                self.push_i32(*value as i32);
                Ok(())
            }
            Expr::Str(lit) => {
                let index = self.intern(&lit.value);
                self.push_i32(index as i32);
                Ok(())
            }
            Expr::Name(name) => self.emit_name(&name.name, locals),
            Expr::Call(call) => self.emit_call_expr(call, locals),
        }
    }

    fn emit_name(&mut self, name: &str, locals: &LocalMap) -> LowerResult<()> {
        if let Some(info) = locals.get(name) {
            self.load(info.slot);
            return Ok(());
        }
        if let Some(value) = self.ctx.math_constant_of(name) {
            self.push_f64_const(value);
            return Ok(());
        }
        Err(format!("native backend does not know identifier: {name}"))
    }

    fn emit_call_expr(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        if call.is_binding {
            return Err("binding not allowed in expression".to_string());
        }
        if call.is_field_access {
            return self.emit_field_access(call, locals);
        }
        if call.is_method_call {
            self.emit_method_call(call, locals, true)?;
            return Ok(());
        }
        if call.is_block_envelope() && self.ctx.resolve_definition_call(call).is_none() {
            return self.emit_value_block(&call.body, locals);
        }
        if let Some(math) = self.ctx.math_builtin_of(call) {
            return self.emit_math_builtin(&math, call, locals);
        }
        if call.namespace.is_empty()
            && crate::builtins::MATH_BUILTINS.contains(call.name.as_str())
            && self.ctx.resolve_definition_call(call).is_none()
        {
            return self.emit_math_builtin(&call.name.clone(), call, locals);
        }
        if call.namespace.is_empty() {
            if let Some(handled) = self.emit_builtin_expr(call, locals)? {
                return Ok(handled);
            }
        }
        // Anything left is a definition call (inlined) or a struct
        // constructor.
        let path = self.ctx.resolve_call_path(call);
        if self.ctx.is_struct_path(&path) {
            return self.emit_struct_constructor(call, &path, locals);
        }
        let def = self
            .ctx
            .definition(&path)
            .ok_or_else(|| format!("native backend cannot resolve definition: {path}"))?;
        let info = self.ctx.return_info(&path)?;
        if info.returns_void {
            return Err(format!("void definition used as a value: {path}"));
        }
        if !info.exact {
            return Err(format!(
                "native backend return type inference requires explicit annotation on {path}"
            ));
        }
        self.emit_inline_definition_call(call, def, locals, true)?;
        Ok(())
    }

    /// Builtins that produce (or consume) values. Returns `Ok(None)` when
    /// the name is not a value-position builtin.
    fn emit_builtin_expr(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<Option<()>> {
        let name = call.name.as_str();
        if !BUILTIN_ARITIES.contains_key(name) {
            return Ok(None);
        }
        if name == "block" {
            if self.ctx.resolve_definition_call(call).is_some() {
                return Ok(None);
            }
            if !call.args.is_empty() || call.has_named_arguments() {
                return Err("block expression does not accept arguments".to_string());
            }
            if !call.has_body && call.body.is_empty() {
                return Err("block requires block arguments".to_string());
            }
            self.emit_value_block(&call.body, locals)?;
            return Ok(Some(()));
        }
        if call.has_named_arguments() {
            return Err("named arguments not supported for builtin calls".to_string());
        }
        match name {
            "plus" | "minus" | "multiply" | "divide" | "modulo" => {
                self.emit_arithmetic(call, locals)?;
            }
            "negate" => {
                if call.args.len() != 1 {
                    return Err("argument count mismatch for builtin negate".to_string());
                }
                self.emit_expr(&call.args[0], locals)?;
                let kind = self.ctx.infer_expr_kind(&call.args[0], locals);
                let op = match kind {
                    ValueKind::Int32 => IrOpcode::NegI32,
                    ValueKind::Int64 => IrOpcode::NegI64,
                    ValueKind::Float32 => IrOpcode::NegF32,
                    ValueKind::Float64 => IrOpcode::NegF64,
                    ValueKind::UInt64 => {
                        return Err("negate does not support unsigned operands".to_string())
                    }
                    _ => return Err("negate requires a numeric operand".to_string()),
                };
                self.emit(op);
            }
            "equal" | "not_equal" | "greater_than" | "less_than" | "greater_equal"
            | "less_equal" => {
                self.emit_comparison(call, locals)?;
            }
            "and" | "or" => self.emit_short_circuit(call, locals)?,
            "not" => {
                if call.args.len() != 1 {
                    return Err("argument count mismatch for builtin not".to_string());
                }
                self.emit_expr(&call.args[0], locals)?;
                let kind = self.ctx.infer_expr_kind(&call.args[0], locals);
                self.emit_compare_to_zero(kind, true)?;
            }
            "if" => self.emit_if_expr(call, locals)?,
            "assign" => self.emit_assign_expr(call, locals)?,
            "increment" | "decrement" => self.emit_increment(call, locals)?,
            "convert" => self.emit_convert(call, locals)?,
            "location" => {
                if call.args.len() != 1 {
                    return Err("location requires exactly one argument".to_string());
                }
                let Expr::Name(target) = &call.args[0] else {
                    return Err("location requires a local binding".to_string());
                };
                let info = locals
                    .get(&target.name)
                    .ok_or_else(|| "location requires a local binding".to_string())?;
                if info.kind == BindingKind::Reference {
                    self.load(info.slot);
                } else {
                    self.emit_imm(IrOpcode::AddressOfLocal, info.slot as u64);
                }
            }
            "dereference" => {
                if call.args.len() != 1 {
                    return Err("dereference requires exactly one argument".to_string());
                }
                self.emit_pointer_value(&call.args[0], locals)?;
                self.emit(IrOpcode::LoadIndirect);
            }
            "array" | "vector" | "map" => self.emit_collection_literal(call, locals)?,
            "at" | "at_unsafe" => {
                self.emit_element_access(call, locals, name == "at")?;
            }
            "count" => self.emit_count(call, locals)?,
            "capacity" => self.emit_capacity(call, locals)?,
            "print" | "print_line" | "print_error" | "print_line_error" => {
                let newline = matches!(name, "print_line" | "print_line_error");
                let to_stderr = matches!(name, "print_error" | "print_line_error");
                self.emit_print(&call.args[0], locals, newline, to_stderr)?;
            }
            "print_value" | "print_string" => {
                if call.args.len() != 3 {
                    return Err(format!("argument count mismatch for builtin {name}"));
                }
                let to_stderr = match &call.args[0] {
                    Expr::Int(lit) if lit.value == 1 => false,
                    Expr::Int(lit) if lit.value == 2 => true,
                    _ => return Err(format!("{name} stream must be 1 (stdout) or 2 (stderr)")),
                };
                let newline = match &call.args[2] {
                    Expr::Bool(value) => *value,
                    _ => return Err(format!("{name} requires a literal bool newline flag")),
                };
                self.emit_print(&call.args[1], locals, newline, to_stderr)?;
            }
            "return" => return Err("return is only supported as a statement".to_string()),
            "loop" | "while" | "for" | "repeat" => {
                return Err(format!("{name} is only supported as a statement"));
            }
            "push" | "pop" | "reserve" | "clear" | "remove_at" | "remove_swap" => {
                return Err(format!("{name} is only supported as a statement"));
            }
            _ => return Ok(None),
        }
        Ok(Some(()))
    }

    fn emit_arithmetic(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        let name = call.name.as_str();
        if call.args.len() != 2 {
            return Err(format!("argument count mismatch for builtin {name}"));
        }
        // Pointer arithmetic: raw byte offsets against the 16-byte slot
        // grid.
        if matches!(name, "plus" | "minus") && self.is_pointer_expr(&call.args[0], locals) {
            self.emit_expr(&call.args[0], locals)?;
            self.emit_expr(&call.args[1], locals)?;
            self.emit(if name == "plus" { IrOpcode::AddI64 } else { IrOpcode::SubI64 });
            return Ok(());
        }
        let left = self.ctx.infer_expr_kind(&call.args[0], locals);
        let right = self.ctx.infer_expr_kind(&call.args[1], locals);
        let combined = combine_numeric(left, right);
        let op = self.arith_opcode(name, combined)?;
        self.emit_expr(&call.args[0], locals)?;
        self.emit_expr(&call.args[1], locals)?;
        self.emit(op);
        Ok(())
    }

    fn emit_comparison(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        let name = call.name.as_str();
        if call.args.len() != 2 {
            return Err(format!("argument count mismatch for builtin {name}"));
        }
        let left = self.ctx.infer_expr_kind(&call.args[0], locals);
        let right = self.ctx.infer_expr_kind(&call.args[1], locals);
        if left == ValueKind::String || right == ValueKind::String {
            return Err("native backend does not support string comparisons".to_string());
        }
        let kind = comparison_kind(left, right);
        let op = self.compare_opcode(name, kind)?;
        self.emit_expr(&call.args[0], locals)?;
        self.emit_expr(&call.args[1], locals)?;
        self.emit(op);
        Ok(())
    }

    /// `and`/`or` with short-circuit evaluation; the result is always a
    /// bool materialized as 0/1.
    fn emit_short_circuit(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        let name = call.name.as_str();
        if call.args.len() != 2 {
            return Err(format!("argument count mismatch for builtin {name}"));
        }
        let right_kind = self.ctx.infer_expr_kind(&call.args[1], locals);

        self.emit_expr(&call.args[0], locals)?;
        if name == "and" {
            let jump_false = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.emit_expr(&call.args[1], locals)?;
            if right_kind != ValueKind::Bool {
                self.emit_compare_to_zero(right_kind, false)?;
            }
            let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
            self.patch_jump_here(jump_false);
            self.push_i32(0);
            self.patch_jump_here(jump_end);
        } else {
            let jump_right = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.push_i32(1);
            let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
            self.patch_jump_here(jump_right);
            self.emit_expr(&call.args[1], locals)?;
            if right_kind != ValueKind::Bool {
                self.emit_compare_to_zero(right_kind, false)?;
            }
            self.patch_jump_here(jump_end);
        }
        Ok(())
    }

    pub(crate) fn emit_if_expr(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        if call.args.len() != 3 {
            return Err("if requires condition, then, else".to_string());
        }
        if call.has_body || !call.body.is_empty() {
            return Err("if does not accept trailing block arguments".to_string());
        }
        self.emit_expr(&call.args[0], locals)?;
        let jump_else = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_expr(&call.args[1], locals)?;
        let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_else);
        self.emit_expr(&call.args[2], locals)?;
        self.patch_jump_here(jump_end);
        Ok(())
    }

    pub(crate) fn emit_assign_expr(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        if call.args.len() != 2 {
            return Err("assign requires exactly two arguments".to_string());
        }
        let target = &call.args[0];
        match target {
            Expr::Name(name) => {
                let info = locals
                    .get(&name.name)
                    .ok_or_else(|| format!("assign target must be a known binding: {}", name.name))?
                    .clone();
                if !info.mutable {
                    return Err(format!("assign target must be mutable: {}", name.name));
                }
                match info.kind {
                    BindingKind::Reference => {
                        let ptr_slot = self.alloc_temp();
                        self.load(info.slot);
                        self.store(ptr_slot);
                        let value_slot = self.alloc_temp();
                        self.emit_expr(&call.args[1], locals)?;
                        self.store(value_slot);
                        self.load(ptr_slot);
                        self.load(value_slot);
                        self.emit(IrOpcode::StoreIndirect);
                        self.load(value_slot);
                        Ok(())
                    }
                    _ => {
                        self.emit_expr(&call.args[1], locals)?;
                        self.emit(IrOpcode::Dup);
                        self.store(info.slot);
                        Ok(())
                    }
                }
            }
            Expr::Call(inner) if inner.is_simple_call("dereference") => {
                if inner.args.len() != 1 {
                    return Err("dereference requires exactly one argument".to_string());
                }
                if let Expr::Name(pointer) = &inner.args[0] {
                    let info = locals.get(&pointer.name).ok_or_else(|| {
                        format!("native backend does not know identifier: {}", pointer.name)
                    })?;
                    if !matches!(info.kind, BindingKind::Pointer | BindingKind::Reference) {
                        return Err("dereference requires a pointer or reference".to_string());
                    }
                    if !info.mutable {
                        return Err("assign target must be a mutable pointer binding".to_string());
                    }
                }
                let ptr_slot = self.alloc_temp();
                self.emit_pointer_value(&inner.args[0], locals)?;
                self.store(ptr_slot);
                let value_slot = self.alloc_temp();
                self.emit_expr(&call.args[1], locals)?;
                self.store(value_slot);
                self.load(ptr_slot);
                self.load(value_slot);
                self.emit(IrOpcode::StoreIndirect);
                self.load(value_slot);
                Ok(())
            }
            _ => Err("native backend only supports assign to local names or dereference".to_string()),
        }
    }

    fn emit_increment(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        let name = call.name.as_str();
        let is_increment = name == "increment";
        if call.args.len() != 1 {
            return Err(format!("{name} requires exactly one argument"));
        }
        let target = &call.args[0];
        match target {
            Expr::Name(target_name) => {
                let info = locals
                    .get(&target_name.name)
                    .ok_or_else(|| {
                        format!("{name} target must be a known binding: {}", target_name.name)
                    })?
                    .clone();
                if !info.mutable {
                    return Err(format!("{name} target must be mutable: {}", target_name.name));
                }
                match info.kind {
                    BindingKind::Reference => {
                        let ptr_slot = self.alloc_temp();
                        self.load(info.slot);
                        self.store(ptr_slot);
                        self.load(ptr_slot);
                        self.emit(IrOpcode::LoadIndirect);
                        self.emit_unit_delta(info.value_kind, is_increment, name)?;
                        let value_slot = self.alloc_temp();
                        self.store(value_slot);
                        self.load(ptr_slot);
                        self.load(value_slot);
                        self.emit(IrOpcode::StoreIndirect);
                        self.emit(IrOpcode::Pop);
                        self.load(value_slot);
                        Ok(())
                    }
                    BindingKind::Value => {
                        self.load(info.slot);
                        self.emit_unit_delta(info.value_kind, is_increment, name)?;
                        self.emit(IrOpcode::Dup);
                        self.store(info.slot);
                        Ok(())
                    }
                    _ => Err(format!("{name} target must be a mutable binding")),
                }
            }
            Expr::Call(inner) if inner.is_simple_call("dereference") => {
                if inner.args.len() != 1 {
                    return Err("dereference requires exactly one argument".to_string());
                }
                let kind = self.ctx.pointer_target_kind(&inner.args[0], locals);
                if !kind.is_numeric() {
                    return Err(format!("{name} requires numeric operand"));
                }
                if let Expr::Name(pointer) = &inner.args[0] {
                    let mutable = locals.get(&pointer.name).map(|i| i.mutable).unwrap_or(false);
                    if !mutable {
                        return Err(format!("{name} target must be a mutable binding"));
                    }
                }
                let ptr_slot = self.alloc_temp();
                self.emit_pointer_value(&inner.args[0], locals)?;
                self.store(ptr_slot);
                self.load(ptr_slot);
                self.emit(IrOpcode::LoadIndirect);
                self.emit_unit_delta(kind, is_increment, name)?;
                let value_slot = self.alloc_temp();
                self.store(value_slot);
                self.load(ptr_slot);
                self.load(value_slot);
                self.emit(IrOpcode::StoreIndirect);
                self.emit(IrOpcode::Pop);
                self.load(value_slot);
                Ok(())
            }
            _ => Err(format!("{name} target must be a mutable binding")),
        }
    }

    fn emit_unit_delta(
        &mut self,
        kind: ValueKind,
        is_increment: bool,
        name: &str,
    ) -> LowerResult<()> {
        match kind {
            ValueKind::Int32 => {
                self.push_i32(1);
                self.emit(if is_increment { IrOpcode::AddI32 } else { IrOpcode::SubI32 });
            }
            ValueKind::Int64 | ValueKind::UInt64 => {
                self.push_i64(1);
                self.emit(if is_increment { IrOpcode::AddI64 } else { IrOpcode::SubI64 });
            }
            ValueKind::Float64 => {
                self.push_f64_const(1.0);
                self.emit(if is_increment { IrOpcode::AddF64 } else { IrOpcode::SubF64 });
            }
            ValueKind::Float32 => {
                self.push_f32_const(1.0);
                self.emit(if is_increment { IrOpcode::AddF32 } else { IrOpcode::SubF32 });
            }
            _ => return Err(format!("{name} requires numeric operand")),
        }
        Ok(())
    }

    fn emit_convert(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
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

        // Converting a math constant folds to a pushed literal.
        if let Expr::Name(name) = &call.args[0] {
            if locals.get(&name.name).is_none() {
                if let Some(value) = self.ctx.math_constant_of(&name.name) {
                    match target {
                        ValueKind::Bool => self.push_i32((value != 0.0) as i32),
                        ValueKind::Int32 => self.push_i32(value as i32),
                        ValueKind::Int64 => self.push_i64(value as i64),
                        ValueKind::UInt64 => self.emit_imm(IrOpcode::PushI64, value as u64),
                        ValueKind::Float64 => self.push_f64_const(value),
                        _ => self.push_f32_const(value as f32),
                    }
                    return Ok(());
                }
            }
        }

        self.emit_expr(&call.args[0], locals)?;
        let mut source = self.ctx.infer_expr_kind(&call.args[0], locals);
        if target == ValueKind::Bool {
            return self.emit_compare_to_zero(source, false);
        }
        if source == ValueKind::Bool {
            source = ValueKind::Int32;
        }
        if !source.is_numeric() {
            return Err("convert requires numeric argument".to_string());
        }
        if source == target {
            return Ok(());
        }
        use IrOpcode::*;
        use ValueKind::*;
        let op = match (source, target) {
            (Int32, Float32) => Some(ConvertI32ToF32),
            (Int32, Float64) => Some(ConvertI32ToF64),
            (Int64, Float32) => Some(ConvertI64ToF32),
            (Int64, Float64) => Some(ConvertI64ToF64),
            (UInt64, Float32) => Some(ConvertU64ToF32),
            (UInt64, Float64) => Some(ConvertU64ToF64),
            (Float32, Int32) => Some(ConvertF32ToI32),
            (Float32, Int64) => Some(ConvertF32ToI64),
            (Float32, UInt64) => Some(ConvertF32ToU64),
            (Float32, Float64) => Some(ConvertF32ToF64),
            (Float64, Int32) => Some(ConvertF64ToI32),
            (Float64, Int64) => Some(ConvertF64ToI64),
            (Float64, UInt64) => Some(ConvertF64ToU64),
            (Float64, Float32) => Some(ConvertF64ToF32),
            // Integer widths share 64-bit slots, sign-extended on write.
            _ => None,
        };
        if let Some(op) = op {
            self.emit(op);
        }
        Ok(())
    }

    /// Evaluate a pointer-valued expression (a pointer/reference binding,
    /// `location(...)`, or pointer arithmetic).
    pub(crate) fn emit_pointer_value(&mut self, expr: &Expr, locals: &LocalMap) -> LowerResult<()> {
        match expr {
            Expr::Name(name) => {
                let info = locals.get(&name.name).ok_or_else(|| {
                    format!("native backend does not know identifier: {}", name.name)
                })?;
                if !matches!(
                    info.kind,
                    BindingKind::Pointer
                        | BindingKind::Reference
                        | BindingKind::Array
                        | BindingKind::Vector
                        | BindingKind::Map
                        | BindingKind::Struct
                ) {
                    return Err("dereference requires a pointer or reference".to_string());
                }
                self.load(info.slot);
                Ok(())
            }
            _ => self.emit_expr(expr, locals),
        }
    }

    pub(crate) fn is_pointer_expr(&self, expr: &Expr, locals: &LocalMap) -> bool {
        match expr {
            Expr::Name(name) => locals
                .get(&name.name)
                .map(|info| info.kind == BindingKind::Pointer)
                .unwrap_or(false),
            Expr::Call(call) => {
                call.is_simple_call("location")
                    || ((call.is_simple_call("plus") || call.is_simple_call("minus"))
                        && call.args.iter().any(|a| self.is_pointer_expr(a, locals)))
            }
            _ => false,
        }
    }

    /// A block envelope used as a value: run the leading statements, leave
    /// the final expression on the stack.
    pub(crate) fn emit_value_block(&mut self, body: &[Expr], locals: &LocalMap) -> LowerResult<()> {
        if body.is_empty() {
            return Err("block expression requires a value".to_string());
        }
        self.push_scope();
        let mut block_locals = locals.clone();
        for stmt in &body[..body.len() - 1] {
            if let Some(call) = stmt.as_call() {
                if matches!(call.name.as_str(), "loop" | "while" | "for" | "repeat")
                    && !call.is_binding
                    && !call.is_method_call
                {
                    return Err(format!("{} is only supported as a statement", call.name));
                }
                if call.is_simple_call("return") && call.args.is_empty() {
                    return Err("return requires a value in block expression".to_string());
                }
            }
            self.emit_statement(stmt, &mut block_locals)?;
        }
        let last = &body[body.len() - 1];
        if last.is_binding() {
            return Err("block expression must end with an expression".to_string());
        }
        let kind = self.ctx.infer_expr_kind(last, &block_locals);
        if kind == ValueKind::Void {
            return Err("block expression requires a value".to_string());
        }
        self.emit_expr(last, &block_locals)?;
        self.pop_scope()?;
        Ok(())
    }

    pub(crate) fn block_value_kind(&self, body: &[Expr], locals: &LocalMap) -> ValueKind {
        let mut block_locals = locals.clone();
        for stmt in &body[..body.len().saturating_sub(1)] {
            if let Some(call) = stmt.as_call().filter(|c| c.is_binding) {
                let info = self.ctx.classify_binding(call, &block_locals, 0);
                block_locals.insert(call.name.clone(), info);
            }
        }
        body.last()
            .map(|last| self.ctx.infer_expr_kind(last, &block_locals))
            .unwrap_or(ValueKind::Unknown)
    }

    // ── printing ──────────────────────────────────────────────────────────

    pub(crate) fn emit_print(
        &mut self,
        value: &Expr,
        locals: &LocalMap,
        newline: bool,
        to_stderr: bool,
    ) -> LowerResult<()> {
        let kind = self.ctx.infer_expr_kind(value, locals);
        if kind == ValueKind::String || self.is_argv_at(value, locals) {
            let index = self.resolve_print_string_index(value, locals)?;
            let flags = encode_print_flags(newline, to_stderr);
            self.emit_imm(
                IrOpcode::PrintString,
                encode_print_string_imm(index as u64, flags),
            );
            return Ok(());
        }
        if !kind.is_numeric() && kind != ValueKind::Bool {
            return Err("native backend only supports numeric/bool print values".to_string());
        }
        self.emit_expr(value, locals)?;
        self.emit_imm(
            IrOpcode::PrintValue,
            encode_print_value_imm(kind, newline, to_stderr),
        );
        Ok(())
    }

    fn is_argv_at(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.as_call()
            .filter(|c| matches!(c.name.as_str(), "at" | "at_unsafe"))
            .and_then(|c| c.args.first())
            .map(|receiver| self.is_entry_args_name(receiver, locals))
            .unwrap_or(false)
    }

    fn resolve_print_string_index(&mut self, value: &Expr, locals: &LocalMap) -> LowerResult<u32> {
        if let Some((index, _)) = self.static_string_index(value, locals) {
            return Ok(index);
        }
        // args[i] with a literal index resolves against the baked argv.
        if let Some(call) = value.as_call() {
            if matches!(call.name.as_str(), "at" | "at_unsafe") && call.args.len() == 2 {
                if self.is_entry_args_name(&call.args[0], locals) {
                    if let Expr::Int(lit) = &call.args[1] {
                        return self.argv_string_index(lit.value as i64).ok_or_else(|| {
                            "array index out of bounds".to_string()
                        });
                    }
                    return Err(
                        "native backend requires a literal index for argv strings".to_string()
                    );
                }
            }
        }
        if let Expr::Name(name) = value {
            if let Some(info) = locals.get(&name.name) {
                // Argv-backed bindings print fine; only map keys reject them.
                if info.string_source == StringSource::Argv && info.string_index >= 0 {
                    return Ok(info.string_index as u32);
                }
                if info.value_kind == ValueKind::String && info.string_source == StringSource::None {
                    return Err(format!(
                        "native backend missing string table data for: {}",
                        name.name
                    ));
                }
            }
        }
        Err("native backend requires string literals or literal-backed bindings for print"
            .to_string())
    }
}
