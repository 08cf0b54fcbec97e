//! Shared per-compilation state: definition map, import aliases, struct
//! set, binding classification, expression kind inference, and cached
//! return-kind inference.
//!
//! Both the analyzer and the lowerer own one `SharedContext`. All state is
//! per-compilation; nothing global.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use prism_ast::{path_leaf, path_parent, Call, Definition, Expr, Program};

use crate::builtins::{is_lifecycle_name, MATH_BUILTINS, MATH_CONSTANTS};
use crate::config::CoreOptions;
use crate::kinds::{combine_numeric, merge_return_kinds, ValueKind};

/// How a binding is represented in a function frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BindingKind {
    #[default]
    Value,
    Pointer,
    Reference,
    Array,
    Vector,
    Map,
    Struct,
}

/// Where a string-kinded binding got its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StringSource {
    #[default]
    None,
    /// Interned in the module string table.
    Table,
    /// Derived from entry argv (rejected for map keys).
    Argv,
}

/// Everything the lowerer and analyzer track per binding.
#[derive(Debug, Clone, Default)]
pub(crate) struct LocalInfo {
    pub slot: u32,
    pub mutable: bool,
    pub kind: BindingKind,
    pub value_kind: ValueKind,
    pub map_key_kind: ValueKind,
    pub map_value_kind: ValueKind,
    pub string_source: StringSource,
    pub string_index: i64,
    pub reference_to_array: bool,
    pub struct_path: Option<String>,
}

pub(crate) type LocalMap = HashMap<String, LocalInfo>;

/// Return-kind record for one definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReturnInfo {
    pub returns_void: bool,
    pub kind: ValueKind,
    /// False when the kind was assumed (inconsistent or unresolvable
    /// returns); value contexts that need a specific kind must then demand
    /// an explicit annotation.
    pub exact: bool,
}

impl ReturnInfo {
    fn void() -> Self {
        Self {
            returns_void: true,
            kind: ValueKind::Void,
            exact: true,
        }
    }
}

pub(crate) struct SharedContext<'p> {
    pub program: &'p Program,
    pub options: &'p CoreOptions,
    pub def_map: HashMap<String, usize>,
    pub import_aliases: HashMap<String, String>,
    pub struct_paths: HashSet<String>,
    pub has_math_import: bool,
    return_cache: RefCell<HashMap<String, ReturnInfo>>,
    return_stack: RefCell<HashSet<String>>,
}

impl std::fmt::Debug for SharedContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("definitions", &self.def_map.len())
            .field("imports", &self.import_aliases.len())
            .finish()
    }
}

/// Qualifier transforms valid on bindings alongside a type tag.
pub(crate) fn is_qualifier_name(name: &str) -> bool {
    matches!(
        name,
        "public"
            | "private"
            | "package"
            | "static"
            | "mut"
            | "copy"
            | "restrict"
            | "align_bytes"
            | "align_kbytes"
    )
}

/// Struct-family transforms on a definition.
pub(crate) fn is_struct_family_name(name: &str) -> bool {
    matches!(
        name,
        "struct" | "pod" | "handle" | "gpu_lane" | "no_padding" | "platform_independent_padding"
    )
}

/// Placement transforms (out of scope, always rejected).
pub(crate) fn is_placement_name(name: &str) -> bool {
    matches!(name, "stack" | "heap" | "buffer" | "placement")
}

/// Split `base<arg>` into its parts.
pub(crate) fn split_template_type(name: &str) -> Option<(&str, &str)> {
    let open = name.find('<')?;
    if !name.ends_with('>') {
        return None;
    }
    Some((&name[..open], name[open + 1..name.len() - 1].trim()))
}

impl<'p> SharedContext<'p> {
    pub fn build(program: &'p Program, options: &'p CoreOptions) -> Result<Self, String> {
        let mut def_map = HashMap::new();
        for (index, def) in program.definitions.iter().enumerate() {
            if def_map.insert(def.full_path.clone(), index).is_some() {
                return Err(format!("duplicate definition path: {}", def.full_path));
            }
        }

        let mut struct_paths = HashSet::new();
        for def in &program.definitions {
            if def.transforms.iter().any(|t| is_struct_family_name(&t.name)) {
                struct_paths.insert(def.full_path.clone());
            }
        }

        let has_math_import = program.imports.iter().any(|path| {
            path == "/math/*" || (path.starts_with("/math/") && path.len() > "/math/".len())
        });

        let mut import_aliases = HashMap::new();
        for import in &program.imports {
            if let Some(prefix) = import.strip_suffix("/*") {
                // Wildcards bind immediate children only, and never shadow a
                // top-level leaf.
                for def in &program.definitions {
                    if path_parent(&def.full_path) != prefix {
                        continue;
                    }
                    let leaf = path_leaf(&def.full_path);
                    if def_map.contains_key(&format!("/{leaf}")) {
                        continue;
                    }
                    import_aliases
                        .entry(leaf.to_string())
                        .or_insert_with(|| def.full_path.clone());
                }
            } else if def_map.contains_key(import) {
                let leaf = path_leaf(import);
                if !def_map.contains_key(&format!("/{leaf}")) {
                    import_aliases
                        .entry(leaf.to_string())
                        .or_insert_with(|| import.clone());
                }
            }
        }

        Ok(Self {
            program,
            options,
            def_map,
            import_aliases,
            struct_paths,
            has_math_import,
            return_cache: RefCell::new(HashMap::new()),
            return_stack: RefCell::new(HashSet::new()),
        })
    }

    pub fn definition(&self, path: &str) -> Option<&'p Definition> {
        self.def_map.get(path).map(|&i| &self.program.definitions[i])
    }

    /// Resolution order: absolute path, namespace-scoped path, import
    /// alias, top-level leaf.
    pub fn resolve_path(&self, name: &str, namespace: &str) -> String {
        if name.starts_with('/') {
            return name.to_string();
        }
        if !namespace.is_empty() {
            let scoped = format!("{namespace}/{name}");
            if self.def_map.contains_key(&scoped) {
                return scoped;
            }
            if let Some(target) = self.import_aliases.get(name) {
                return target.clone();
            }
            return scoped;
        }
        if let Some(target) = self.import_aliases.get(name) {
            return target.clone();
        }
        format!("/{name}")
    }

    pub fn resolve_call_path(&self, call: &Call) -> String {
        self.resolve_path(&call.name, &call.namespace)
    }

    /// Resolve a bare type-transform name to a definition path.
    pub fn resolve_type_path(&self, name: &str) -> String {
        self.resolve_path(name, "")
    }

    pub fn is_struct_path(&self, path: &str) -> bool {
        self.struct_paths.contains(path)
    }

    /// A definition named like a lifecycle helper nested under a
    /// struct-family parent.
    pub fn is_lifecycle_helper(&self, def: &Definition) -> bool {
        is_lifecycle_name(def.leaf()) && self.is_struct_path(def.parent())
    }

    /// Names a lifecycle helper but sits outside a struct parent. Still an
    /// error for top-level `Create` and friends.
    pub fn is_misplaced_lifecycle(&self, def: &Definition) -> bool {
        is_lifecycle_name(def.leaf()) && !self.is_struct_path(def.parent())
    }

    /// `/math/...` name, or a bare name after a `/math/*` import.
    pub fn parse_math_name(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let normalized = name.strip_prefix('/').unwrap_or(name);
        if let Some(rest) = normalized.strip_prefix("math/") {
            return Some(rest.to_string());
        }
        if normalized.contains('/') {
            return None;
        }
        if !self.has_math_import {
            return None;
        }
        Some(normalized.to_string())
    }

    /// The math builtin a call names, if any.
    pub fn math_builtin_of(&self, call: &Call) -> Option<String> {
        if call.is_binding || call.is_method_call || !call.namespace.is_empty() {
            return None;
        }
        let name = self.parse_math_name(&call.name)?;
        MATH_BUILTINS.contains(name.as_str()).then_some(name)
    }

    /// The value of a math constant a name refers to, if any.
    pub fn math_constant_of(&self, name: &str) -> Option<f64> {
        let parsed = self.parse_math_name(name)?;
        MATH_CONSTANTS.get(parsed.as_str()).copied()
    }

    /// Resolve a non-builtin call to its definition, if one exists.
    pub fn resolve_definition_call(&self, call: &Call) -> Option<&'p Definition> {
        if call.is_binding || call.is_method_call {
            return None;
        }
        self.definition(&self.resolve_call_path(call))
    }

    // ── binding classification ────────────────────────────────────────────

    pub fn binding_is_mutable(&self, call: &Call) -> bool {
        call.transforms.iter().any(|t| t.name == "mut")
    }

    pub fn binding_kind(&self, call: &Call) -> BindingKind {
        for transform in &call.transforms {
            match transform.name.as_str() {
                "Reference" => return BindingKind::Reference,
                "Pointer" => return BindingKind::Pointer,
                "array" => return BindingKind::Array,
                "vector" => return BindingKind::Vector,
                "map" => return BindingKind::Map,
                name => {
                    if !is_qualifier_name(name)
                        && transform.args.is_empty()
                        && transform.template_args.is_empty()
                        && self.is_struct_path(&self.resolve_type_path(name))
                    {
                        return BindingKind::Struct;
                    }
                }
            }
        }
        BindingKind::Value
    }

    /// True when the binding carries a type transform (as opposed to
    /// inferring its kind from the initializer).
    pub fn has_explicit_type_transform(&self, call: &Call) -> bool {
        call.transforms.iter().any(|t| {
            t.name != "effects"
                && t.name != "capabilities"
                && !is_qualifier_name(&t.name)
                && t.args.is_empty()
        })
    }

    pub fn binding_value_kind(&self, call: &Call, kind: BindingKind) -> ValueKind {
        for transform in &call.transforms {
            if is_qualifier_name(&transform.name) {
                continue;
            }
            match transform.name.as_str() {
                "Pointer" | "Reference" => {
                    if transform.template_args.len() == 1 {
                        let arg = &transform.template_args[0];
                        if let Some((base, inner)) = split_template_type(arg) {
                            if base == "array" {
                                return ValueKind::from_type_name(inner);
                            }
                        }
                        return ValueKind::from_type_name(arg);
                    }
                    return ValueKind::Unknown;
                }
                "array" | "vector" => {
                    if transform.template_args.len() == 1 {
                        return ValueKind::from_type_name(&transform.template_args[0]);
                    }
                    return ValueKind::Unknown;
                }
                "map" => {
                    if transform.template_args.len() == 2 {
                        return ValueKind::from_type_name(&transform.template_args[1]);
                    }
                    return ValueKind::Unknown;
                }
                name => {
                    let value = ValueKind::from_type_name(name);
                    if value != ValueKind::Unknown && value != ValueKind::Void {
                        return value;
                    }
                }
            }
        }
        if kind != BindingKind::Value {
            return ValueKind::Unknown;
        }
        ValueKind::Int32
    }

    fn binding_map_kinds(&self, call: &Call) -> (ValueKind, ValueKind) {
        for transform in &call.transforms {
            if transform.name == "map" && transform.template_args.len() == 2 {
                return (
                    ValueKind::from_type_name(&transform.template_args[0]),
                    ValueKind::from_type_name(&transform.template_args[1]),
                );
            }
        }
        (ValueKind::Unknown, ValueKind::Unknown)
    }

    fn binding_struct_path(&self, call: &Call) -> Option<String> {
        for transform in &call.transforms {
            if is_qualifier_name(&transform.name) || !transform.args.is_empty() {
                continue;
            }
            let resolved = self.resolve_type_path(&transform.name);
            if self.is_struct_path(&resolved) {
                return Some(resolved);
            }
        }
        None
    }

    fn binding_is_string(&self, call: &Call) -> bool {
        call.transforms.iter().any(|t| {
            if is_qualifier_name(&t.name) {
                return false;
            }
            if t.name == "string" {
                return true;
            }
            (t.name == "Pointer" || t.name == "Reference")
                && t.template_args.len() == 1
                && t.template_args[0] == "string"
        })
    }

    /// Classify a binding into its frame record. `slot` comes from the
    /// caller (real allocation in the lowerer, zero in the analyzer).
    pub fn classify_binding(&self, call: &Call, locals: &LocalMap, slot: u32) -> LocalInfo {
        let mut kind = self.binding_kind(call);
        let mut info = LocalInfo {
            slot,
            mutable: self.binding_is_mutable(call),
            kind,
            ..LocalInfo::default()
        };
        if self.has_explicit_type_transform(call) {
            info.value_kind = self.binding_value_kind(call, kind);
        } else if kind == BindingKind::Value {
            // Untyped bindings take their shape from the initializer:
            // collection literals and struct constructors carry it along.
            if let Some(init) = call.args.first().and_then(|e| e.as_call()) {
                if !init.is_binding && !init.is_method_call {
                    match init.name.as_str() {
                        "array" if init.template_args.len() == 1 => {
                            kind = BindingKind::Array;
                            info.value_kind = ValueKind::from_type_name(&init.template_args[0]);
                        }
                        "vector" if init.template_args.len() == 1 => {
                            kind = BindingKind::Vector;
                            info.value_kind = ValueKind::from_type_name(&init.template_args[0]);
                        }
                        "map" if init.template_args.len() == 2 => {
                            kind = BindingKind::Map;
                            info.map_key_kind = ValueKind::from_type_name(&init.template_args[0]);
                            info.map_value_kind = ValueKind::from_type_name(&init.template_args[1]);
                            info.value_kind = info.map_value_kind;
                        }
                        _ => {
                            let resolved = self.resolve_call_path(init);
                            if self.is_struct_path(&resolved) {
                                kind = BindingKind::Struct;
                                info.struct_path = Some(resolved);
                            }
                        }
                    }
                }
                info.kind = kind;
            }
            if kind == BindingKind::Value {
                info.value_kind = self.infer_expr_kind(
                    call.args.first().unwrap_or(&Expr::Bool(false)),
                    locals,
                );
                if info.value_kind == ValueKind::Unknown {
                    info.value_kind = ValueKind::Int32;
                }
            }
        }
        if self.binding_is_string(call) {
            info.value_kind = ValueKind::String;
        }
        let (key_kind, value_kind) = self.binding_map_kinds(call);
        if key_kind != ValueKind::Unknown || value_kind != ValueKind::Unknown {
            info.map_key_kind = key_kind;
            info.map_value_kind = value_kind;
        }
        if kind == BindingKind::Struct && info.struct_path.is_none() {
            info.struct_path = self.binding_struct_path(call);
        }
        if kind == BindingKind::Reference {
            for transform in &call.transforms {
                if transform.name != "Reference" || transform.template_args.len() != 1 {
                    continue;
                }
                if let Some((base, inner)) = split_template_type(&transform.template_args[0]) {
                    if base == "array" {
                        info.reference_to_array = true;
                        if info.value_kind == ValueKind::Unknown {
                            info.value_kind = ValueKind::from_type_name(inner);
                        }
                    }
                }
            }
        }
        if kind == BindingKind::Map {
            // Map value kind doubles as the lookup result kind.
            info.value_kind = info.map_value_kind;
        }
        info
    }

    // ── struct queries ────────────────────────────────────────────────────

    /// Field bindings of a struct definition, in declaration order.
    pub fn struct_fields(&self, path: &str) -> Vec<&'p Call> {
        let Some(def) = self.definition(path) else {
            return Vec::new();
        };
        def.body
            .iter()
            .filter_map(|stmt| stmt.as_call().filter(|c| c.is_binding))
            .collect()
    }

    /// Index and kind of a struct field.
    pub fn struct_field_info(&self, path: &str, field: &str) -> Option<(usize, ValueKind)> {
        let fields = self.struct_fields(path);
        let index = fields.iter().position(|f| f.name == field)?;
        let call = fields[index];
        let kind = if self.has_explicit_type_transform(call) {
            self.binding_value_kind(call, BindingKind::Value)
        } else {
            self.infer_expr_kind(call.args.first()?, &LocalMap::new())
        };
        Some((index, kind))
    }

    // ── return-kind inference ─────────────────────────────────────────────

    /// Return-kind record for a definition, cached; re-entry during
    /// inference yields `Unknown` to break cycles.
    pub fn return_info(&self, path: &str) -> Result<ReturnInfo, String> {
        if let Some(info) = self.return_cache.borrow().get(path) {
            return Ok(*info);
        }
        if self.return_stack.borrow().contains(path) {
            return Ok(ReturnInfo {
                returns_void: false,
                kind: ValueKind::Unknown,
                exact: false,
            });
        }
        let def = self
            .definition(path)
            .ok_or_else(|| format!("native backend cannot resolve definition: {path}"))?;

        let annotated = def
            .transform("return")
            .and_then(|t| t.template_args.first())
            .map(String::as_str)
            .or_else(|| {
                // Under single_type_to_return, a bare type tag is the
                // `return<T>` shorthand.
                if def.transform("single_type_to_return").is_none() {
                    return None;
                }
                def.transforms.iter().find_map(|t| {
                    let kind = ValueKind::from_type_name(&t.name);
                    (kind != ValueKind::Unknown).then_some(t.name.as_str())
                })
            });
        if let Some(name) = annotated {
            let info = if name == "void" {
                ReturnInfo::void()
            } else {
                let kind = ValueKind::from_type_name(name);
                ReturnInfo {
                    returns_void: false,
                    kind,
                    exact: kind != ValueKind::Unknown,
                }
            };
            self.return_cache.borrow_mut().insert(path.to_string(), info);
            return Ok(info);
        }
        if def.transform("return").is_some() {
            // `return` without a template argument never resolves.
            let info = ReturnInfo {
                returns_void: false,
                kind: ValueKind::Unknown,
                exact: false,
            };
            self.return_cache.borrow_mut().insert(path.to_string(), info);
            return Ok(info);
        }

        self.return_stack.borrow_mut().insert(path.to_string());
        let mut locals = LocalMap::new();
        for param in &def.params {
            if let Some(call) = param.as_call() {
                let info = self.classify_binding(call, &locals, 0);
                locals.insert(call.name.clone(), info);
            }
        }
        let mut kinds = Vec::new();
        let mut saw_void = false;
        self.scan_returns(&def.body, &mut locals, &mut kinds, &mut saw_void);
        if let Some(ret) = &def.return_expr {
            kinds.push(self.infer_expr_kind(ret, &locals));
        }
        self.return_stack.borrow_mut().remove(path);

        let info = if kinds.is_empty() {
            ReturnInfo::void()
        } else {
            let mut merged = kinds[0];
            for kind in &kinds[1..] {
                merged = merge_return_kinds(merged, *kind);
            }
            if saw_void || merged == ValueKind::Unknown {
                // Int is assumed for backward compatibility; value contexts
                // that need a specific kind demand an annotation.
                ReturnInfo {
                    returns_void: false,
                    kind: ValueKind::Int32,
                    exact: false,
                }
            } else {
                ReturnInfo {
                    returns_void: false,
                    kind: merged,
                    exact: true,
                }
            }
        };
        self.return_cache.borrow_mut().insert(path.to_string(), info);
        Ok(info)
    }

    fn scan_returns(
        &self,
        stmts: &[Expr],
        locals: &mut LocalMap,
        kinds: &mut Vec<ValueKind>,
        saw_void: &mut bool,
    ) {
        for stmt in stmts {
            let Some(call) = stmt.as_call() else { continue };
            if call.is_binding {
                let info = self.classify_binding(call, locals, 0);
                locals.insert(call.name.clone(), info);
                continue;
            }
            if stmt.is_simple_call("return") {
                match call.args.first() {
                    Some(expr) => kinds.push(self.infer_expr_kind(expr, locals)),
                    None => *saw_void = true,
                }
                continue;
            }
            // Both branches of an if, loop bodies, blocks, and trailing call
            // bodies all contribute return sites.
            if stmt.is_simple_call("if") {
                for arg in &call.args[1.min(call.args.len())..] {
                    if let Some(envelope) = arg.as_call().filter(|c| c.is_block_envelope()) {
                        let mut branch = locals.clone();
                        self.scan_returns(&envelope.body, &mut branch, kinds, saw_void);
                    }
                }
                continue;
            }
            for arg in &call.args {
                if let Some(envelope) = arg.as_call().filter(|c| c.is_block_envelope()) {
                    let mut inner = locals.clone();
                    self.scan_returns(&envelope.body, &mut inner, kinds, saw_void);
                }
            }
            if call.has_body || !call.body.is_empty() {
                let mut inner = locals.clone();
                self.scan_returns(&call.body, &mut inner, kinds, saw_void);
            }
        }
    }

    // ── expression kind inference ─────────────────────────────────────────

    pub fn infer_expr_kind(&self, expr: &Expr, locals: &LocalMap) -> ValueKind {
        match expr {
            Expr::Int(lit) => {
                if lit.unsigned {
                    ValueKind::UInt64
                } else if lit.width == prism_ast::IntWidth::W64 {
                    ValueKind::Int64
                } else {
                    ValueKind::Int32
                }
            }
            Expr::Float(lit) => {
                if lit.width == prism_ast::FloatWidth::W64 {
                    ValueKind::Float64
                } else {
                    ValueKind::Float32
                }
            }
            Expr::Bool(_) => ValueKind::Bool,
            Expr::Str(_) => ValueKind::String,
            Expr::Name(name) => {
                if let Some(info) = locals.get(&name.name) {
                    return match info.kind {
                        BindingKind::Value | BindingKind::Reference if !info.reference_to_array => {
                            info.value_kind
                        }
                        _ => ValueKind::Unknown,
                    };
                }
                if self.math_constant_of(&name.name).is_some() {
                    return ValueKind::Float64;
                }
                ValueKind::Unknown
            }
            Expr::Call(call) => self.infer_call_kind(call, locals),
        }
    }

    fn infer_call_kind(&self, call: &Call, locals: &LocalMap) -> ValueKind {
        if call.is_binding {
            return ValueKind::Unknown;
        }
        if call.is_field_access {
            return self
                .field_access_info(call, locals)
                .map(|(_, kind)| kind)
                .unwrap_or(ValueKind::Unknown);
        }
        if call.is_method_call {
            return self.infer_method_kind(call, locals);
        }
        if let Some(math) = self.math_builtin_of(call) {
            return self.infer_math_kind(&math, call, locals);
        }
        if call.namespace.is_empty()
            && MATH_BUILTINS.contains(call.name.as_str())
            && self.resolve_definition_call(call).is_none()
        {
            return self.infer_math_kind(&call.name.clone(), call, locals);
        }
        if call.namespace.is_empty() {
            if let Some(kind) = self.infer_builtin_kind(call, locals) {
                return kind;
            }
        }
        if let Some(def) = self.resolve_definition_call(call) {
            if self.is_struct_path(&def.full_path) {
                return ValueKind::Unknown;
            }
            return match self.return_info(&def.full_path) {
                Ok(info) if info.returns_void => ValueKind::Void,
                Ok(info) => info.kind,
                Err(_) => ValueKind::Unknown,
            };
        }
        ValueKind::Unknown
    }

    fn infer_method_kind(&self, call: &Call, locals: &LocalMap) -> ValueKind {
        match call.name.as_str() {
            "count" | "capacity" => return ValueKind::Int32,
            "at" | "at_unsafe" => {
                if let Some(receiver) = call.args.first() {
                    return self.element_kind_of(receiver, locals);
                }
                return ValueKind::Unknown;
            }
            _ => {}
        }
        if let Some(def_path) = self.method_target_path(call, locals) {
            if let Ok(info) = self.return_info(&def_path) {
                return if info.returns_void { ValueKind::Void } else { info.kind };
            }
        }
        ValueKind::Unknown
    }

    /// The struct-method path a dotted call resolves to, if the receiver has
    /// a struct type and the method exists.
    pub fn method_target_path(&self, call: &Call, locals: &LocalMap) -> Option<String> {
        let receiver = call.args.first()?;
        let struct_path = self.receiver_struct_path(receiver, locals)?;
        let candidate = format!("{struct_path}/{}", call.name);
        self.def_map.contains_key(&candidate).then_some(candidate)
    }

    /// Struct path of a method receiver: a struct-typed binding or a
    /// constructor call.
    pub fn receiver_struct_path(&self, receiver: &Expr, locals: &LocalMap) -> Option<String> {
        match receiver {
            Expr::Name(name) => locals.get(&name.name).and_then(|info| info.struct_path.clone()),
            Expr::Call(call) if !call.is_binding && !call.is_method_call => {
                let resolved = self.resolve_call_path(call);
                self.is_struct_path(&resolved).then_some(resolved)
            }
            _ => None,
        }
    }

    /// Field index and kind for a field-access expression.
    pub fn field_access_info(&self, call: &Call, locals: &LocalMap) -> Option<(usize, ValueKind)> {
        let receiver = call.args.first()?;
        let struct_path = self.receiver_struct_path(receiver, locals)?;
        self.struct_field_info(&struct_path, &call.name)
    }

    /// Element kind for `at`/`at_unsafe` on a receiver.
    pub fn element_kind_of(&self, receiver: &Expr, locals: &LocalMap) -> ValueKind {
        match receiver {
            Expr::Str(_) => ValueKind::Int32,
            Expr::Name(name) => match locals.get(&name.name) {
                Some(info) => match info.kind {
                    BindingKind::Array | BindingKind::Vector => info.value_kind,
                    BindingKind::Map => info.map_value_kind,
                    BindingKind::Reference if info.reference_to_array => info.value_kind,
                    BindingKind::Value if info.value_kind == ValueKind::String => ValueKind::Int32,
                    _ => ValueKind::Unknown,
                },
                None => ValueKind::Unknown,
            },
            Expr::Call(call) => {
                if call.name == "array" || call.name == "vector" {
                    if call.template_args.len() == 1 {
                        return ValueKind::from_type_name(&call.template_args[0]);
                    }
                } else if call.name == "map" && call.template_args.len() == 2 {
                    return ValueKind::from_type_name(&call.template_args[1]);
                }
                ValueKind::Unknown
            }
            _ => ValueKind::Unknown,
        }
    }

    fn infer_math_kind(&self, name: &str, call: &Call, locals: &LocalMap) -> ValueKind {
        match name {
            "is_nan" | "is_inf" | "is_finite" => ValueKind::Bool,
            "abs" | "sign" | "saturate" | "floor" | "ceil" | "round" | "trunc" | "fract"
            | "sqrt" | "cbrt" | "exp" | "exp2" | "log" | "log2" | "log10" | "sin" | "cos"
            | "tan" | "asin" | "acos" | "atan" | "sinh" | "cosh" | "tanh" | "asinh" | "acosh"
            | "atanh" | "radians" | "degrees" => call
                .args
                .first()
                .map(|a| self.infer_expr_kind(a, locals))
                .unwrap_or(ValueKind::Unknown),
            _ => {
                let mut kind = match call.args.first() {
                    Some(arg) => self.infer_expr_kind(arg, locals),
                    None => return ValueKind::Unknown,
                };
                for arg in &call.args[1..] {
                    kind = combine_numeric(kind, self.infer_expr_kind(arg, locals));
                }
                kind
            }
        }
    }

    fn infer_builtin_kind(&self, call: &Call, locals: &LocalMap) -> Option<ValueKind> {
        let kind = match call.name.as_str() {
            "plus" | "minus" | "multiply" | "divide" | "modulo" => {
                if call.args.len() != 2 {
                    ValueKind::Unknown
                } else if self.is_pointer_operand(&call.args[0], locals)
                    || self.is_pointer_operand(&call.args[1], locals)
                {
                    ValueKind::Unknown
                } else {
                    combine_numeric(
                        self.infer_expr_kind(&call.args[0], locals),
                        self.infer_expr_kind(&call.args[1], locals),
                    )
                }
            }
            "negate" => call
                .args
                .first()
                .map(|a| self.infer_expr_kind(a, locals))
                .unwrap_or(ValueKind::Unknown),
            "equal" | "not_equal" | "greater_than" | "less_than" | "greater_equal"
            | "less_equal" | "and" | "or" | "not" => ValueKind::Bool,
            "if" => {
                if call.args.len() == 3 {
                    let then_kind = self.infer_expr_kind(&call.args[1], locals);
                    let else_kind = self.infer_expr_kind(&call.args[2], locals);
                    combine_numeric(then_kind, else_kind)
                } else {
                    ValueKind::Void
                }
            }
            "block" => match call.body.last() {
                Some(last) => self.infer_expr_kind(last, locals),
                None => ValueKind::Unknown,
            },
            "assign" => {
                if call.args.len() != 2 {
                    return Some(ValueKind::Unknown);
                }
                match &call.args[0] {
                    Expr::Name(name) => match locals.get(&name.name) {
                        Some(info)
                            if matches!(info.kind, BindingKind::Value | BindingKind::Reference) =>
                        {
                            info.value_kind
                        }
                        _ => ValueKind::Unknown,
                    },
                    Expr::Call(target) if target.name == "dereference" => {
                        match target.args.first() {
                            Some(pointer) => self.pointer_target_kind(pointer, locals),
                            None => ValueKind::Unknown,
                        }
                    }
                    _ => ValueKind::Unknown,
                }
            }
            "convert" => {
                if call.template_args.len() == 1 {
                    ValueKind::from_type_name(&call.template_args[0])
                } else {
                    ValueKind::Unknown
                }
            }
            "at" | "at_unsafe" => match call.args.first() {
                Some(receiver) => self.element_kind_of(receiver, locals),
                None => ValueKind::Unknown,
            },
            "count" | "capacity" => ValueKind::Int32,
            "location" => ValueKind::Unknown,
            "dereference" => match call.args.first() {
                Some(pointer) => self.pointer_target_kind(pointer, locals),
                None => ValueKind::Unknown,
            },
            "increment" | "decrement" => match call.args.first() {
                Some(target) => self.infer_expr_kind(target, locals),
                None => ValueKind::Unknown,
            },
            "loop" | "while" | "for" | "repeat" | "return" | "push" | "pop" | "reserve"
            | "clear" | "remove_at" | "remove_swap" | "print" | "print_line" | "print_error"
            | "print_line_error" | "print_value" | "print_string" => ValueKind::Void,
            "array" | "vector" | "map" => ValueKind::Unknown,
            _ => return None,
        };
        Some(kind)
    }

    fn is_pointer_operand(&self, expr: &Expr, locals: &LocalMap) -> bool {
        match expr {
            Expr::Name(name) => locals
                .get(&name.name)
                .map(|info| {
                    matches!(
                        info.kind,
                        BindingKind::Pointer
                            | BindingKind::Array
                            | BindingKind::Vector
                            | BindingKind::Map
                            | BindingKind::Struct
                    ) || (info.kind == BindingKind::Reference && info.reference_to_array)
                })
                .unwrap_or(false),
            Expr::Call(call) => {
                call.is_simple_call("location")
                    || (call.is_simple_call("plus") || call.is_simple_call("minus"))
                        && call
                            .args
                            .iter()
                            .any(|arg| self.is_pointer_operand(arg, locals))
            }
            _ => false,
        }
    }

    /// The kind a pointer expression points at.
    pub fn pointer_target_kind(&self, expr: &Expr, locals: &LocalMap) -> ValueKind {
        match expr {
            Expr::Name(name) => match locals.get(&name.name) {
                Some(info)
                    if matches!(info.kind, BindingKind::Pointer | BindingKind::Reference) =>
                {
                    info.value_kind
                }
                _ => ValueKind::Unknown,
            },
            Expr::Call(call) => {
                if call.is_simple_call("location") {
                    return match call.args.first() {
                        Some(Expr::Name(name)) => locals
                            .get(&name.name)
                            .map(|info| info.value_kind)
                            .unwrap_or(ValueKind::Unknown),
                        _ => ValueKind::Unknown,
                    };
                }
                if call.is_simple_call("plus") || call.is_simple_call("minus") {
                    for arg in &call.args {
                        let kind = self.pointer_target_kind(arg, locals);
                        if kind != ValueKind::Unknown {
                            return kind;
                        }
                    }
                }
                ValueKind::Unknown
            }
            _ => ValueKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_ast::builder::*;

    #[test]
    fn wildcard_imports_bind_immediate_children_only() {
        let program = program_full(
            vec![
                def("/ns/leaf", vec![return_transform("int")], vec![], vec![ret(lit_i32(1))]),
                def("/ns/nested/deep", vec![return_transform("int")], vec![], vec![ret(lit_i32(1))]),
                def("/main", vec![return_transform("int")], vec![], vec![ret(lit_i32(1))]),
            ],
            vec!["/ns/*"],
            vec![],
        );
        let options = CoreOptions::default();
        let ctx = SharedContext::build(&program, &options).unwrap();
        assert_eq!(ctx.import_aliases.get("leaf").map(String::as_str), Some("/ns/leaf"));
        assert!(!ctx.import_aliases.contains_key("deep"));
    }

    #[test]
    fn wildcard_import_never_shadows_top_level() {
        let program = program_full(
            vec![
                def("/ns/main", vec![return_transform("int")], vec![], vec![ret(lit_i32(2))]),
                def("/main", vec![return_transform("int")], vec![], vec![ret(lit_i32(1))]),
            ],
            vec!["/ns/*"],
            vec![],
        );
        let options = CoreOptions::default();
        let ctx = SharedContext::build(&program, &options).unwrap();
        assert!(!ctx.import_aliases.contains_key("main"));
        assert_eq!(ctx.resolve_path("main", ""), "/main");
    }

    #[test]
    fn return_inference_merges_branches() {
        let program = program(vec![def(
            "/pick",
            vec![],
            vec![],
            vec![if_stmt(
                lit_bool(true),
                vec![ret(lit_i32(1))],
                vec![ret(lit_i64(2))],
            )],
        )]);
        let options = CoreOptions::default();
        let ctx = SharedContext::build(&program, &options).unwrap();
        let info = ctx.return_info("/pick").unwrap();
        assert!(!info.returns_void);
        assert_eq!(info.kind, ValueKind::Int64);
        assert!(info.exact);
    }

    #[test]
    fn return_inference_defaults_to_void() {
        let program = program(vec![def(
            "/quiet",
            vec![],
            vec![],
            vec![binding(&["i32"], "value", lit_i32(1))],
        )]);
        let options = CoreOptions::default();
        let ctx = SharedContext::build(&program, &options).unwrap();
        assert!(ctx.return_info("/quiet").unwrap().returns_void);
    }

    #[test]
    fn recursive_inference_breaks_cycle_with_assumed_int() {
        let program = program(vec![def(
            "/looped",
            vec![],
            vec![],
            vec![ret(call("looped", vec![]))],
        )]);
        let options = CoreOptions::default();
        let ctx = SharedContext::build(&program, &options).unwrap();
        let info = ctx.return_info("/looped").unwrap();
        assert!(!info.returns_void);
        assert_eq!(info.kind, ValueKind::Int32);
        assert!(!info.exact);
    }

    #[test]
    fn math_names_need_import_or_path() {
        let bare = program(vec![def("/main", vec![], vec![], vec![])]);
        let options = CoreOptions::default();
        let ctx = SharedContext::build(&bare, &options).unwrap();
        assert!(ctx.parse_math_name("sqrt").is_none());
        assert_eq!(ctx.parse_math_name("/math/sqrt").as_deref(), Some("sqrt"));

        let imported = program_full(vec![def("/main", vec![], vec![], vec![])], vec!["/math/*"], vec![]);
        let ctx = SharedContext::build(&imported, &options).unwrap();
        assert_eq!(ctx.parse_math_name("sqrt").as_deref(), Some("sqrt"));
        assert_eq!(ctx.math_constant_of("pi"), Some(std::f64::consts::PI));
    }
}
