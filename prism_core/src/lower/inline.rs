//! Definition-call inlining.
//!
//! There are no call opcodes: every resolved call splices a fresh copy of
//! the callee body with parameters renamed into temporaries. `return`
//! inside the spliced body stores into a result slot and jumps to the
//! frame end. A call that transitively reaches itself is rejected.

use prism_ast::{Call, Definition, Expr};

use crate::context::{BindingKind, LocalInfo, LocalMap, StringSource};
use crate::kinds::ValueKind;

use super::{FuncLowerer, LowerResult};

impl FuncLowerer<'_, '_> {
    /// Inline one definition call. Leaves the result value on the stack for
    /// non-void callees.
    pub(crate) fn emit_inline_definition_call(
        &mut self,
        call: &Call,
        def: &Definition,
        locals: &LocalMap,
        as_value: bool,
    ) -> LowerResult<()> {
        let path = def.full_path.clone();
        if self.inline_stack_contains(&path) {
            return Err(format!(
                "native backend does not support recursive definition calls: {path}"
            ));
        }

        let info = self.ctx.return_info(&path)?;
        if as_value && info.returns_void {
            return Err(format!("void definition used as a value: {path}"));
        }
        if as_value && !info.returns_void && !info.exact {
            return Err(format!(
                "native backend return type inference requires explicit annotation on {path}"
            ));
        }

        // Match arguments by position and label; missing parameters fall
        // back to their default expressions, evaluated in the caller's
        // scope.
        if call.args.len() > def.params.len() {
            return Err(format!("too many arguments in call to {path}"));
        }
        let param_calls: Vec<&Call> = def
            .params
            .iter()
            .map(|p| {
                p.as_call()
                    .filter(|c| c.is_binding)
                    .ok_or_else(|| format!("invalid parameter list on {path}"))
            })
            .collect::<Result<_, _>>()?;
        let mut slot_args: Vec<Option<&Expr>> = vec![None; def.params.len()];
        for (index, arg) in call.args.iter().enumerate() {
            let label = call
                .arg_names
                .get(index)
                .map(String::as_str)
                .unwrap_or_default();
            let slot = if label.is_empty() {
                index
            } else {
                param_calls
                    .iter()
                    .position(|p| p.name == label)
                    .ok_or_else(|| format!("unknown named argument: {label} in call to {path}"))?
            };
            slot_args[slot] = Some(arg);
        }

        let mut callee_locals = LocalMap::new();
        for (index, param) in param_calls.iter().enumerate() {
            let arg = match slot_args[index] {
                Some(arg) => arg,
                None => param.args.first().ok_or_else(|| {
                    format!(
                        "missing argument for parameter {} in call to {path}",
                        param.name
                    )
                })?,
            };
            let mut param_info = self.declare_binding(param, locals);
            if !self.ctx.has_explicit_type_transform(param)
                && param_info.kind == BindingKind::Value
            {
                param_info.value_kind = self.ctx.infer_expr_kind(arg, locals);
                if param_info.value_kind == ValueKind::Unknown {
                    param_info.value_kind = ValueKind::Int32;
                }
            }
            if param_info.value_kind == ValueKind::String {
                if let Some((string_index, _)) = self.static_string_index(arg, locals) {
                    param_info.string_source = StringSource::Table;
                    param_info.string_index = string_index as i64;
                }
            }
            if param_info.kind == BindingKind::Value {
                if let Some(struct_path) = self.ctx.receiver_struct_path(arg, locals) {
                    // Struct-typed parameters carry the object address.
                    if param_info.struct_path.is_none()
                        && self.ctx.is_struct_path(&struct_path)
                        && self
                            .ctx
                            .binding_kind(param)
                            == BindingKind::Value
                    {
                        param_info.kind = BindingKind::Struct;
                        param_info.struct_path = Some(struct_path);
                    }
                }
            }
            self.emit_expr(arg, locals)?;
            self.store(param_info.slot);
            callee_locals.insert(param.name.clone(), param_info);
        }

        let result_slot = (!info.returns_void).then(|| self.alloc_temp());

        self.push_inline_frame_for(result_slot);
        self.inline_stack_push(&path);
        self.push_scope();
        let mut body_locals = callee_locals;
        for stmt in &def.body {
            self.emit_statement(stmt, &mut body_locals)?;
        }
        if let Some(ret) = &def.return_expr {
            let ret_stmt = Expr::Call(Call::new("return", vec![ret.clone()]));
            self.emit_statement(&ret_stmt, &mut body_locals)?;
        }
        self.pop_scope()?;
        self.finish_inline_frame();
        self.inline_stack_pop();

        if let Some(slot) = result_slot {
            self.load(slot);
        }
        Ok(())
    }

    /// A dotted call `receiver.m(args)`: collection accessors keep their
    /// builtin meaning; everything else resolves under the receiver's
    /// struct path and inlines like a plain call with the receiver as the
    /// leading argument.
    pub(crate) fn emit_method_call(
        &mut self,
        call: &Call,
        locals: &LocalMap,
        as_value: bool,
    ) -> LowerResult<ValueKind> {
        if call.args.is_empty() {
            return Err("method call missing receiver".to_string());
        }
        match call.name.as_str() {
            "count" => {
                let mut plain = call.clone();
                plain.is_method_call = false;
                self.emit_count(&plain, locals)?;
                return Ok(ValueKind::Int32);
            }
            "capacity" => {
                let mut plain = call.clone();
                plain.is_method_call = false;
                self.emit_capacity(&plain, locals)?;
                return Ok(ValueKind::Int32);
            }
            "at" | "at_unsafe" => {
                let mut plain = call.clone();
                plain.is_method_call = false;
                self.emit_element_access(&plain, locals, call.name == "at")?;
                return Ok(self.ctx.element_kind_of(&call.args[0], locals));
            }
            _ => {}
        }

        let receiver = &call.args[0];
        if let Expr::Name(name) = receiver {
            if let Some(info) = locals.get(&name.name) {
                if matches!(info.kind, BindingKind::Pointer | BindingKind::Reference)
                    && !info.reference_to_array
                    && info.struct_path.is_none()
                {
                    return Err(format!("unknown method target for {}", call.name));
                }
            }
        }

        let Some(path) = self.ctx.method_target_path(call, locals) else {
            if self.ctx.receiver_struct_path(receiver, locals).is_some() {
                return Err(format!("unknown method: {}", call.name));
            }
            return Err(format!("unknown method target for {}", call.name));
        };
        let def = self
            .ctx
            .definition(&path)
            .ok_or_else(|| format!("native backend cannot resolve definition: {path}"))?;
        let info = self.ctx.return_info(&path)?;

        let mut plain = call.clone();
        plain.is_method_call = false;
        self.emit_inline_definition_call(&plain, def, locals, as_value)?;
        Ok(if info.returns_void { ValueKind::Void } else { info.kind })
    }

    /// Inline a `Create`/`Destroy` helper against an object address held in
    /// a local slot. Helpers take no parameters and return void; `this`
    /// aliases the injected self reference.
    pub(crate) fn emit_lifecycle_call(
        &mut self,
        helper_path: &str,
        struct_path: &str,
        address_slot: u32,
    ) -> LowerResult<()> {
        let Some(def) = self.ctx.definition(helper_path) else {
            return Ok(());
        };
        if self.inline_stack_contains(helper_path) {
            return Err(format!(
                "native backend does not support recursive definition calls: {helper_path}"
            ));
        }

        let this = LocalInfo {
            slot: address_slot,
            mutable: def.transform("mut").is_some(),
            kind: BindingKind::Reference,
            value_kind: ValueKind::Unknown,
            struct_path: Some(struct_path.to_string()),
            ..LocalInfo::default()
        };
        let mut body_locals = LocalMap::new();
        body_locals.insert("this".to_string(), this);

        self.push_inline_frame_for(None);
        self.inline_stack_push(helper_path);
        self.push_scope();
        for stmt in &def.body {
            self.emit_statement(stmt, &mut body_locals)?;
        }
        self.pop_scope()?;
        self.finish_inline_frame();
        self.inline_stack_pop();
        Ok(())
    }
}
