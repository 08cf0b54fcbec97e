//! Loop statement lowering.
//!
//! Every loop form shares the `CHECK: test; JumpIfZero END; BODY; step?;
//! Jump CHECK; END:` skeleton. `loop`/`repeat` drive a hidden counter that
//! counts down to zero; signed counts get a runtime guard against negative
//! values.

use prism_ast::{Call, Expr};

use crate::context::LocalMap;
use crate::ir::IrOpcode;
use crate::kinds::ValueKind;

use super::{FuncLowerer, LowerResult};

impl FuncLowerer<'_, '_> {
    pub(crate) fn emit_loop_stmt(
        &mut self,
        call: &Call,
        locals: &mut LocalMap,
        shared_scope: bool,
    ) -> LowerResult<()> {
        match call.name.as_str() {
            "loop" => self.emit_counted_loop(call, locals, shared_scope, false),
            "repeat" => self.emit_counted_loop(call, locals, shared_scope, true),
            "while" => self.emit_while_loop(call, locals, shared_scope),
            "for" => self.emit_for_loop(call, locals, shared_scope),
            other => Err(format!("{other} is only supported as a statement")),
        }
    }

    fn emit_counted_loop(
        &mut self,
        call: &Call,
        locals: &mut LocalMap,
        shared_scope: bool,
        is_repeat: bool,
    ) -> LowerResult<()> {
        let (count_expr, body): (&Expr, &[Expr]) = if is_repeat {
            if call.args.len() != 1 {
                return Err("repeat requires exactly one argument".to_string());
            }
            if !call.has_body && call.body.is_empty() {
                return Err("repeat requires block arguments".to_string());
            }
            (&call.args[0], &call.body)
        } else {
            if call.args.len() != 2 {
                return Err("loop requires count and body".to_string());
            }
            let envelope = call.args[1]
                .as_call()
                .filter(|c| c.is_block_envelope())
                .ok_or_else(|| {
                    if shared_scope {
                        "shared_scope requires loop body in do() { ... }".to_string()
                    } else {
                        "loop body requires a block envelope".to_string()
                    }
                })?;
            (&call.args[0], &envelope.body)
        };

        self.emit_expr(count_expr, locals)?;
        let mut count_kind = self.ctx.infer_expr_kind(count_expr, locals);
        if is_repeat && count_kind == ValueKind::Bool {
            count_kind = ValueKind::Int32;
        }
        if !count_kind.is_integer() {
            return Err(if is_repeat {
                "repeat count requires integer or bool".to_string()
            } else {
                "loop count requires integer".to_string()
            });
        }

        let counter = self.alloc_temp();
        self.store(counter);

        // Signed counts trap on negative values; repeat just skips.
        if !is_repeat && count_kind != ValueKind::UInt64 {
            self.load(counter);
            self.push_int_const(count_kind, 0);
            self.emit(if count_kind == ValueKind::Int32 {
                IrOpcode::CmpLtI32
            } else {
                IrOpcode::CmpLtI64
            });
            let jump_ok = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.emit_guard_failure("loop count must be non-negative");
            self.patch_jump_here(jump_ok);
        }

        let check = self.here();
        self.load(counter);
        match count_kind {
            ValueKind::Int32 => {
                self.push_i32(0);
                self.emit(IrOpcode::CmpGtI32);
            }
            ValueKind::Int64 => {
                self.push_i64(0);
                self.emit(IrOpcode::CmpGtI64);
            }
            _ => {
                self.push_i64(0);
                self.emit(IrOpcode::CmpNeI64);
            }
        }
        let jump_end = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        self.emit_loop_body(body, locals, shared_scope)?;

        self.load(counter);
        if count_kind == ValueKind::Int32 {
            self.push_i32(1);
            self.emit(IrOpcode::SubI32);
        } else {
            self.push_i64(1);
            self.emit(IrOpcode::SubI64);
        }
        self.store(counter);
        self.emit_imm(IrOpcode::Jump, check as u64);
        self.patch_jump_here(jump_end);
        Ok(())
    }

    fn emit_while_loop(
        &mut self,
        call: &Call,
        locals: &mut LocalMap,
        shared_scope: bool,
    ) -> LowerResult<()> {
        if call.args.len() != 2 {
            return Err("while requires condition and body".to_string());
        }
        let envelope = call.args[1]
            .as_call()
            .filter(|c| c.is_block_envelope())
            .ok_or_else(|| {
                if shared_scope {
                    "shared_scope requires loop body in do() { ... }".to_string()
                } else {
                    "while body requires a block envelope".to_string()
                }
            })?;

        let check = self.here();
        self.emit_expr(&call.args[0], locals)?;
        if self.ctx.infer_expr_kind(&call.args[0], locals) != ValueKind::Bool {
            return Err("while condition requires bool".to_string());
        }
        let jump_end = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_loop_body(&envelope.body, locals, shared_scope)?;
        self.emit_imm(IrOpcode::Jump, check as u64);
        self.patch_jump_here(jump_end);
        Ok(())
    }

    fn emit_for_loop(
        &mut self,
        call: &Call,
        locals: &mut LocalMap,
        shared_scope: bool,
    ) -> LowerResult<()> {
        if call.args.len() != 4 {
            return Err("for requires init, condition, step, and body".to_string());
        }
        let envelope = call.args[3]
            .as_call()
            .filter(|c| c.is_block_envelope())
            .ok_or_else(|| {
                if shared_scope {
                    "shared_scope requires loop body in do() { ... }".to_string()
                } else {
                    "for body requires a block envelope".to_string()
                }
            })?;

        // The init binding lives in the loop's own lexical scope.
        let mut loop_locals = locals.clone();
        self.emit_statement(&call.args[0], &mut loop_locals)?;

        let cond = &call.args[1];
        let cond_binding = cond.as_call().filter(|c| c.is_binding).cloned();
        if let Some(binding) = &cond_binding {
            if binding.args.len() != 1 {
                return Err("binding requires exactly one argument".to_string());
            }
            if loop_locals.contains_key(&binding.name) {
                return Err(format!("binding redefines existing name: {}", binding.name));
            }
            let info = self.declare_binding(binding, &loop_locals);
            loop_locals.insert(binding.name.clone(), info);
        }

        let check = self.here();
        let cond_kind = if let Some(binding) = &cond_binding {
            // The condition binding is re-evaluated on every iteration.
            let slot = loop_locals[&binding.name].slot;
            self.emit_expr(&binding.args[0], &loop_locals)?;
            self.store(slot);
            self.load(slot);
            loop_locals[&binding.name].value_kind
        } else {
            self.emit_expr(cond, &loop_locals)?;
            self.ctx.infer_expr_kind(cond, &loop_locals)
        };
        if cond_kind != ValueKind::Bool {
            return Err(if cond_binding.is_some() {
                "for condition binding requires bool".to_string()
            } else {
                "for condition requires bool".to_string()
            });
        }
        let jump_end = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        self.emit_loop_body(&envelope.body, &mut loop_locals, shared_scope)?;
        self.emit_statement(&call.args[2], &mut loop_locals)?;

        self.emit_imm(IrOpcode::Jump, check as u64);
        self.patch_jump_here(jump_end);
        Ok(())
    }

    fn emit_loop_body(
        &mut self,
        body: &[Expr],
        locals: &mut LocalMap,
        shared_scope: bool,
    ) -> LowerResult<()> {
        self.push_scope();
        let mut body_locals = locals.clone();
        for stmt in body {
            self.emit_statement(stmt, &mut body_locals)?;
        }
        if shared_scope {
            // Bindings persist across iterations: no per-iteration cleanup,
            // and the hoisted entries fall to the enclosing scope.
            self.pop_scope_hoisted();
            for (name, info) in body_locals {
                locals.entry(name).or_insert(info);
            }
            Ok(())
        } else {
            self.pop_scope()
        }
    }

    /// A statement call carrying a trailing block: inline the call, discard
    /// its value, then run the block as a nested scope.
    pub(crate) fn emit_call_with_body_stmt(
        &mut self,
        call: &Call,
        locals: &mut LocalMap,
    ) -> LowerResult<()> {
        let mut inner = call.clone();
        inner.body.clear();
        inner.has_body = false;

        if inner.is_method_call {
            let produced = self.emit_method_call(&inner, locals, false)?;
            if produced != ValueKind::Void {
                self.emit(IrOpcode::Pop);
            }
        } else {
            let def = self.ctx.resolve_definition_call(&inner).ok_or_else(|| {
                format!(
                    "block arguments require a definition target: {}",
                    self.ctx.resolve_call_path(&inner)
                )
            })?;
            let info = self.ctx.return_info(&def.full_path)?;
            self.emit_inline_definition_call(&inner, def, locals, false)?;
            if !info.returns_void {
                self.emit(IrOpcode::Pop);
            }
        }
        self.emit_body_scoped(&call.body, locals)
    }
}
