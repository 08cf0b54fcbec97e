//! Semantic analysis.
//!
//! `SemanticAnalyzer::validate` walks a parsed program and rejects any rule
//! violation with a single descriptive sentence. Validation happens before
//! lowering; the lowerer assumes a validated tree and only re-checks what
//! it needs for code selection.

mod body;
mod transforms;

use std::collections::HashSet;

use prism_ast::{Definition, Expr, Program};

use crate::capability::Capability;
use crate::config::CoreOptions;
use crate::context::{BindingKind, LocalInfo, LocalMap, SharedContext};
use crate::error::SemanticError;
use crate::kinds::ValueKind;

use body::BodyValidator;
use transforms::{
    collect_declared_capabilities, validate_definition_transforms, validate_execution_transforms,
};

/// Validates one program against the language rules.
#[derive(Debug, Clone, Default)]
pub struct SemanticAnalyzer {
    options: CoreOptions,
}

impl SemanticAnalyzer {
    pub fn new(options: CoreOptions) -> Self {
        Self { options }
    }

    /// Validate the whole program with `entry_path` as the designated entry
    /// definition. The first violation stops validation.
    pub fn validate(&self, program: &Program, entry_path: &str) -> Result<(), SemanticError> {
        self.validate_inner(program, entry_path).map_err(SemanticError::new)
    }

    fn validate_inner(&self, program: &Program, entry_path: &str) -> Result<(), String> {
        let ctx = SharedContext::build(program, &self.options)?;
        if ctx.definition(entry_path).is_none() {
            return Err(format!("native backend cannot resolve definition: {entry_path}"));
        }

        for def in &program.definitions {
            self.validate_definition(&ctx, def, entry_path)?;
        }

        for execution in &program.executions {
            validate_execution_transforms(&execution.transforms)?;
            let Some(call) = execution.call.as_call() else {
                return Err("execution requires a call".to_string());
            };
            if call.is_binding {
                return Err("binding transforms are not allowed on executions: binding".to_string());
            }
            let path = ctx.resolve_call_path(call);
            if ctx.definition(&path).is_none() {
                return Err(format!("native backend cannot resolve definition: {path}"));
            }
            let mut caps: HashSet<Capability> =
                collect_declared_capabilities(&execution.transforms)?;
            caps.extend(self.options.default_effects_for(&path));
            let validator = BodyValidator {
                ctx: &ctx,
                caps,
                in_lifecycle: false,
                entry_args: None,
            };
            validator.validate_value(&execution.call, &LocalMap::new())?;
        }
        Ok(())
    }

    fn validate_definition(
        &self,
        ctx: &SharedContext<'_>,
        def: &Definition,
        entry_path: &str,
    ) -> Result<(), String> {
        validate_definition_transforms(ctx, def)?;

        if ctx.is_misplaced_lifecycle(def) {
            return Err("lifecycle helper must be nested inside a struct".to_string());
        }

        if ctx.is_struct_path(&def.full_path) {
            return validate_struct_definition(def);
        }

        let is_helper = ctx.is_lifecycle_helper(def);
        if is_helper {
            if !def.params.is_empty() {
                return Err("lifecycle helpers do not accept parameters".to_string());
            }
            if let Some(ret) = def.transform("return") {
                if ret.template_args.first().map(String::as_str) != Some("void") {
                    return Err("lifecycle helpers must return void".to_string());
                }
            }
        }

        let mut caps: HashSet<Capability> = collect_declared_capabilities(&def.transforms)?;
        caps.extend(self.options.default_effects_for(&def.full_path));

        let entry_args = if def.full_path == entry_path && self.options.entry_args.is_some() {
            def.params
                .first()
                .and_then(|p| p.as_call())
                .map(|c| c.name.clone())
        } else {
            None
        };

        let validator = BodyValidator {
            ctx,
            caps,
            in_lifecycle: is_helper,
            entry_args,
        };

        let mut locals = LocalMap::new();
        for (index, param) in def.params.iter().enumerate() {
            let Some(param_call) = param.as_call().filter(|c| c.is_binding) else {
                return Err(format!("parameter {index} of {} is not a binding", def.full_path));
            };
            if param_call.args.len() > 1 {
                return Err("binding requires exactly one argument".to_string());
            }
            if let Some(default) = param_call.args.first() {
                validator.validate_value(default, &locals)?;
            }
            let info = ctx.classify_binding(param_call, &locals, 0);
            locals.insert(param_call.name.clone(), info);
        }

        if is_helper {
            // Lifecycle helpers receive `this`, a reference to the parent
            // struct, mutable only under `mut`.
            let this = LocalInfo {
                mutable: def.transform("mut").is_some(),
                kind: BindingKind::Reference,
                value_kind: ValueKind::Unknown,
                struct_path: Some(def.parent().to_string()),
                ..LocalInfo::default()
            };
            locals.insert("this".to_string(), this);
        }

        validator.validate_body(&def.body, &mut locals)?;
        if let Some(ret) = &def.return_expr {
            validator.validate_value(ret, &locals)?;
        }
        Ok(())
    }
}

fn validate_struct_definition(def: &Definition) -> Result<(), String> {
    if !def.params.is_empty() {
        return Err("struct definitions cannot declare parameters".to_string());
    }
    let is_pod = def.transforms.iter().any(|t| t.name == "pod");
    for stmt in &def.body {
        let Some(field) = stmt.as_call() else {
            return Err("struct definitions may only contain field bindings".to_string());
        };
        if field.is_simple_call("return") {
            return Err("struct definitions cannot contain return statements".to_string());
        }
        if !field.is_binding {
            return Err("struct definitions may only contain field bindings".to_string());
        }
        if field.args.is_empty() {
            return Err("struct definitions require field initializers".to_string());
        }
        let tagged = |name: &str| field.transforms.iter().any(|t| t.name == name);
        if tagged("handle") && tagged("gpu_lane") {
            return Err("fields cannot be tagged as handle and gpu_lane".to_string());
        }
        if is_pod && (tagged("handle") || tagged("gpu_lane")) {
            return Err("pod definitions cannot contain handle or gpu_lane fields".to_string());
        }
        for init in &field.args {
            if let Expr::Call(inner) = init {
                if inner.is_binding {
                    return Err("struct definitions may only contain field bindings".to_string());
                }
            }
        }
    }
    Ok(())
}
