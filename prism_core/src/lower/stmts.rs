//! Statement lowering: bindings, returns, if statements, and expression
//! statements. Loop statements and trailing-block calls live in
//! `loops.rs`.

use prism_ast::{Call, Expr};

use crate::context::{BindingKind, LocalMap, StringSource};
use crate::ir::IrOpcode;
use crate::kinds::ValueKind;

use super::{FuncLowerer, LowerResult};

impl FuncLowerer<'_, '_> {
    pub(crate) fn emit_statement(&mut self, stmt: &Expr, locals: &mut LocalMap) -> LowerResult<()> {
        let Some(call) = stmt.as_call() else {
            // Bare literal/name statement: evaluate, discard.
            self.emit_expr(stmt, locals)?;
            self.emit(IrOpcode::Pop);
            return Ok(());
        };

        if call.is_binding {
            return self.emit_binding_stmt(call, locals);
        }

        let shared_scope = call.transforms.iter().any(|t| t.name == "shared_scope");

        if call.namespace.is_empty() && !call.is_method_call {
            match call.name.as_str() {
                "loop" | "while" | "for" | "repeat" => {
                    return self.emit_loop_stmt(call, locals, shared_scope);
                }
                "if" => return self.emit_if_stmt(call, locals),
                "return" => return self.emit_return_stmt(call, locals),
                "block" if self.ctx.resolve_definition_call(call).is_none() => {
                    return self.emit_block_stmt(call, locals);
                }
                "push" | "pop" | "reserve" | "clear" | "remove_at" | "remove_swap" => {
                    return self.emit_vector_mutator(call, locals);
                }
                _ => {}
            }
        }
        if call.is_method_call
            && matches!(
                call.name.as_str(),
                "push" | "pop" | "reserve" | "clear" | "remove_at" | "remove_swap"
            )
        {
            let mut plain = call.clone();
            plain.is_method_call = false;
            return self.emit_vector_mutator(&plain, locals);
        }

        if (call.has_body || !call.body.is_empty()) && call.name != "block" {
            return self.emit_call_with_body_stmt(call, locals);
        }

        // Method calls and definition calls in statement position discard
        // their value; void callees leave nothing to discard.
        if call.is_method_call {
            let kind = self.emit_method_call(call, locals, false)?;
            if kind != ValueKind::Void {
                self.emit(IrOpcode::Pop);
            }
            return Ok(());
        }
        if (!crate::builtins::BUILTIN_ARITIES.contains_key(call.name.as_str())
            || call.name == "block")
            && self.ctx.math_builtin_of(call).is_none()
        {
            if let Some(def) = self.ctx.resolve_definition_call(call) {
                if !self.ctx.is_struct_path(&def.full_path) {
                    let info = self.ctx.return_info(&def.full_path)?;
                    self.emit_inline_definition_call(call, def, locals, false)?;
                    if !info.returns_void {
                        self.emit(IrOpcode::Pop);
                    }
                    return Ok(());
                }
            }
        }

        // Plain expression statement: evaluate; discard any produced value.
        let kind = self.ctx.infer_expr_kind(stmt, locals);
        self.emit_expr(stmt, locals)?;
        if kind != ValueKind::Void {
            self.emit(IrOpcode::Pop);
        }
        Ok(())
    }

    pub(crate) fn emit_body_scoped(
        &mut self,
        body: &[Expr],
        locals: &LocalMap,
    ) -> LowerResult<()> {
        self.push_scope();
        let mut inner = locals.clone();
        for stmt in body {
            self.emit_statement(stmt, &mut inner)?;
        }
        self.pop_scope()
    }

    fn emit_binding_stmt(&mut self, call: &Call, locals: &mut LocalMap) -> LowerResult<()> {
        if call.args.len() != 1 && call.body.is_empty() {
            return Err("binding requires exactly one argument".to_string());
        }
        if locals.contains_key(&call.name) {
            return Err(format!("binding redefines existing name: {}", call.name));
        }
        let mut info = self.declare_binding(call, locals);

        let init = call.args.first();
        match info.kind {
            BindingKind::Reference => {
                // Reference bindings store the address of their target.
                match init {
                    Some(expr) => self.emit_expr(expr, locals)?,
                    None => return Err("binding requires exactly one argument".to_string()),
                }
                self.store(info.slot);
            }
            BindingKind::Struct => {
                // The constructor registered Destroy cleanup for the object
                // address; the binding just holds that address.
                let init = init.ok_or_else(|| "binding requires exactly one argument".to_string())?;
                self.emit_expr(init, locals)?;
                self.store(info.slot);
            }
            _ => {
                match init {
                    Some(expr) => {
                        // String-table provenance flows through bindings so
                        // later print/map-key sites can resolve indices.
                        if info.value_kind == ValueKind::String {
                            if let Some((index, _)) = self.static_string_index(expr, locals) {
                                info.string_source = StringSource::Table;
                                info.string_index = index as i64;
                            } else if self.is_argv_element(expr, locals) {
                                info.string_source = StringSource::Argv;
                                if let Some(index) = self.argv_element_index(expr) {
                                    info.string_index = index as i64;
                                } else {
                                    info.string_index = -1;
                                }
                            }
                        }
                        self.emit_expr(expr, locals)?;
                    }
                    None => {
                        // Brace-block initializer.
                        self.emit_value_block(&call.body, locals)?;
                        if info.value_kind == ValueKind::Unknown {
                            info.value_kind = self.block_value_kind(&call.body, locals);
                        }
                    }
                }
                self.store(info.slot);
            }
        }
        locals.insert(call.name.clone(), info);
        Ok(())
    }

    fn emit_return_stmt(&mut self, call: &Call, locals: &mut LocalMap) -> LowerResult<()> {
        if call.args.len() > 1 {
            return Err("argument count mismatch for builtin return".to_string());
        }
        if self.in_inline_frame() {
            let has_value = if let Some(value) = call.args.first() {
                self.emit_expr(value, locals)?;
                true
            } else {
                false
            };
            return self.emit_inline_return(has_value);
        }

        match call.args.first() {
            Some(value) => {
                self.emit_expr(value, locals)?;
                self.emit_cleanup_depth(0)?;
                self.emit_return_opcode()
            }
            None => {
                self.emit_cleanup_depth(0)?;
                self.emit(IrOpcode::ReturnVoid);
                Ok(())
            }
        }
    }

    pub(crate) fn emit_return_opcode(&mut self) -> LowerResult<()> {
        let op = match self.entry_return_kind() {
            ValueKind::Int32 | ValueKind::Bool => IrOpcode::ReturnI32,
            ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::ReturnI64,
            ValueKind::Float32 => IrOpcode::ReturnF32,
            ValueKind::Float64 => IrOpcode::ReturnF64,
            ValueKind::Void => IrOpcode::ReturnVoid,
            other => {
                return Err(format!(
                    "native backend cannot return values of kind {other:?}"
                ))
            }
        };
        self.emit(op);
        Ok(())
    }

    fn emit_if_stmt(&mut self, call: &Call, locals: &mut LocalMap) -> LowerResult<()> {
        if call.has_body || !call.body.is_empty() {
            return Err("if does not accept trailing block arguments".to_string());
        }
        if call.args.len() < 2 {
            return Err("if requires condition".to_string());
        }
        let branches = &call.args[1..];
        let envelopes: Vec<Option<&Call>> = branches
            .iter()
            .map(|b| b.as_call().filter(|c| c.is_block_envelope()))
            .collect();
        if envelopes.iter().all(|e| e.is_none()) {
            // Value form in statement position.
            let kind = self.ctx.infer_expr_kind(&Expr::Call(call.clone()), locals);
            self.emit_if_expr(call, locals)?;
            if kind != ValueKind::Void {
                self.emit(IrOpcode::Pop);
            }
            return Ok(());
        }
        if envelopes.iter().any(|e| e.is_none()) {
            return Err("if branches require block envelopes".to_string());
        }

        self.emit_expr(&call.args[0], locals)?;
        let jump_else = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_body_scoped(&envelopes[0].expect("envelope").body, locals)?;
        if let Some(else_envelope) = envelopes.get(1).and_then(|e| *e) {
            let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
            self.patch_jump_here(jump_else);
            self.emit_body_scoped(&else_envelope.body, locals)?;
            self.patch_jump_here(jump_end);
        } else {
            self.patch_jump_here(jump_else);
        }
        Ok(())
    }

    fn emit_block_stmt(&mut self, call: &Call, locals: &mut LocalMap) -> LowerResult<()> {
        if !call.args.is_empty() || !call.template_args.is_empty() || call.has_named_arguments() {
            return Err("block does not accept arguments".to_string());
        }
        self.emit_body_scoped(&call.body, locals)
    }

    fn is_argv_element(&self, expr: &Expr, locals: &LocalMap) -> bool {
        let Some(call) = expr.as_call() else {
            return false;
        };
        if !matches!(call.name.as_str(), "at" | "at_unsafe") {
            return false;
        }
        call.args
            .first()
            .map(|receiver| self.is_entry_args_name(receiver, locals))
            .unwrap_or(false)
    }

    /// Table index of an `args[i]` initializer when `i` is a literal.
    fn argv_element_index(&self, expr: &Expr) -> Option<u32> {
        let call = expr.as_call()?;
        match call.args.get(1) {
            Some(Expr::Int(lit)) => self.argv_string_index(lit.value as i64),
            _ => None,
        }
    }

    fn entry_return_kind(&self) -> ValueKind {
        if self.returns_void {
            ValueKind::Void
        } else {
            self.return_kind
        }
    }
}
