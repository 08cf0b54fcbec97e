//! Collection lowering: array/vector/map literals, element access with
//! bounds and key guards, `count`/`capacity`, vector mutators, struct
//! constructors, and field access.
//!
//! Layout in locals memory (16 bytes per slot): arrays use one header slot
//! (count), vectors two (count, capacity), maps one (pair count) followed
//! by interleaved key/value slots. Elements live at
//! `base + 16 * (headerSlots + index)`.

use prism_ast::{Call, Expr};

use crate::context::{BindingKind, LocalMap, StringSource};
use crate::ir::IrOpcode;
use crate::kinds::ValueKind;

use super::{FuncLowerer, LowerResult};

const MAX_LITERAL_LEN: usize = i32::MAX as usize;

/// What an element access targets.
enum AccessTarget {
    Array { header: i64 },
    Vector { header: i64 },
    Map,
    StaticString { index: u32 },
    Argv,
}

impl FuncLowerer<'_, '_> {
    pub(crate) fn emit_collection_literal(
        &mut self,
        call: &Call,
        locals: &LocalMap,
    ) -> LowerResult<()> {
        let name = call.name.as_str();
        if name == "map" {
            return self.emit_map_literal(call, locals);
        }
        if call.template_args.len() != 1 {
            return Err(format!("{name} literal requires exactly one template argument"));
        }
        let elem_kind = ValueKind::from_type_name(&call.template_args[0]);
        if matches!(elem_kind, ValueKind::Unknown | ValueKind::Void | ValueKind::String) {
            return Err(format!("native backend only supports numeric/bool {name} literals"));
        }
        if call.args.len() > MAX_LITERAL_LEN {
            return Err(format!("{name} literal too large for native backend"));
        }

        let is_vector = name == "vector";
        let header_slots: u32 = if is_vector { 2 } else { 1 };
        let base = self.alloc_block(header_slots + call.args.len() as u32);

        self.push_i32(call.args.len() as i32);
        self.store(base);
        if is_vector {
            self.push_i32(call.args.len() as i32);
            self.store(base + 1);
        }

        for (index, arg) in call.args.iter().enumerate() {
            let arg_kind = self.ctx.infer_expr_kind(arg, locals);
            if matches!(arg_kind, ValueKind::Unknown | ValueKind::String) {
                return Err(format!(
                    "native backend requires {name} literal elements to be numeric/bool values"
                ));
            }
            if arg_kind != elem_kind {
                return Err(format!("{name} literal element type mismatch"));
            }
            self.emit_expr(arg, locals)?;
            self.store(base + header_slots + index as u32);
        }

        self.emit_imm(IrOpcode::AddressOfLocal, base as u64);
        Ok(())
    }

    fn emit_map_literal(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        if call.template_args.len() != 2 {
            return Err("map literal requires exactly two template arguments".to_string());
        }
        if call.args.len() % 2 != 0 {
            return Err("map literal requires an even number of arguments".to_string());
        }
        let key_kind = ValueKind::from_type_name(&call.template_args[0]);
        let value_kind = ValueKind::from_type_name(&call.template_args[1]);
        if key_kind == ValueKind::Unknown
            || value_kind == ValueKind::Unknown
            || value_kind == ValueKind::String
        {
            return Err("native backend only supports numeric/bool map values".to_string());
        }
        if call.args.len() > MAX_LITERAL_LEN {
            return Err("map literal too large for native backend".to_string());
        }

        let base = self.alloc_block(1 + call.args.len() as u32);
        self.push_i32((call.args.len() / 2) as i32);
        self.store(base);

        for (index, arg) in call.args.iter().enumerate() {
            let slot = base + 1 + index as u32;
            let is_key = index % 2 == 0;
            if is_key && key_kind == ValueKind::String {
                let (string_index, _) = self.static_string_index(arg, locals).ok_or_else(|| {
                    "native backend requires map literal string keys to be string literals or \
                     bindings backed by literals"
                        .to_string()
                })?;
                self.push_i32(string_index as i32);
                self.store(slot);
                continue;
            }
            let arg_kind = self.ctx.infer_expr_kind(arg, locals);
            if matches!(arg_kind, ValueKind::Unknown | ValueKind::String) {
                return Err(
                    "native backend requires map literal arguments to be numeric/bool values"
                        .to_string(),
                );
            }
            let expected = if is_key { key_kind } else { value_kind };
            if arg_kind != expected {
                return Err(if is_key {
                    "map literal key type mismatch".to_string()
                } else {
                    "map literal value type mismatch".to_string()
                });
            }
            self.emit_expr(arg, locals)?;
            self.store(slot);
        }

        self.emit_imm(IrOpcode::AddressOfLocal, base as u64);
        Ok(())
    }

    // ── element access ────────────────────────────────────────────────────

    pub(crate) fn emit_element_access(
        &mut self,
        call: &Call,
        locals: &LocalMap,
        checked: bool,
    ) -> LowerResult<()> {
        if call.args.len() != 2 {
            return Err(format!("argument count mismatch for builtin {}", call.name));
        }
        let receiver = &call.args[0];
        let index = &call.args[1];
        match self.classify_access_target(receiver, locals)? {
            AccessTarget::StaticString { index: string_index } => {
                self.emit_string_byte_access(string_index, index, locals, checked)
            }
            AccessTarget::Argv => self.emit_argv_access(index, locals, checked),
            AccessTarget::Map => self.emit_map_lookup(receiver, index, locals, checked),
            AccessTarget::Array { header } | AccessTarget::Vector { header } => {
                let message = if header == 2 {
                    "vector index out of bounds"
                } else {
                    "array index out of bounds"
                };
                self.emit_indexed_load(receiver, index, locals, header, checked, message)
            }
        }
    }

    fn classify_access_target(
        &mut self,
        receiver: &Expr,
        locals: &LocalMap,
    ) -> LowerResult<AccessTarget> {
        if self.is_entry_args_name(receiver, locals) {
            return Ok(AccessTarget::Argv);
        }
        if let Some((index, _)) = self.static_string_index(receiver, locals) {
            return Ok(AccessTarget::StaticString { index });
        }
        match receiver {
            Expr::Name(name) => {
                let info = locals.get(&name.name).ok_or_else(|| {
                    format!("native backend does not know identifier: {}", name.name)
                })?;
                match info.kind {
                    BindingKind::Array => Ok(AccessTarget::Array { header: 1 }),
                    BindingKind::Vector => Ok(AccessTarget::Vector { header: 2 }),
                    BindingKind::Map => Ok(AccessTarget::Map),
                    BindingKind::Reference if info.reference_to_array => {
                        Ok(AccessTarget::Array { header: 1 })
                    }
                    _ if info.value_kind == ValueKind::String => {
                        if info.string_source == StringSource::Argv {
                            Err("native backend does not support argv-derived strings here"
                                .to_string())
                        } else {
                            Err(format!(
                                "native backend missing string table data for: {}",
                                name.name
                            ))
                        }
                    }
                    _ => Err(format!("unknown method target for {}", name.name)),
                }
            }
            Expr::Call(inner) => match inner.name.as_str() {
                "array" => Ok(AccessTarget::Array { header: 1 }),
                "vector" => Ok(AccessTarget::Vector { header: 2 }),
                "map" => Ok(AccessTarget::Map),
                _ => Err("at requires an array, vector, map, or string receiver".to_string()),
            },
            _ => Err("at requires an array, vector, map, or string receiver".to_string()),
        }
    }

    /// Base address of a collection receiver (binding slot or literal).
    fn emit_collection_base(&mut self, receiver: &Expr, locals: &LocalMap) -> LowerResult<()> {
        match receiver {
            Expr::Name(name) => {
                let info = locals.get(&name.name).ok_or_else(|| {
                    format!("native backend does not know identifier: {}", name.name)
                })?;
                self.load(info.slot);
                Ok(())
            }
            _ => self.emit_expr(receiver, locals),
        }
    }

    fn index_kind(&self, index: &Expr, locals: &LocalMap, verb: &str) -> LowerResult<ValueKind> {
        let mut kind = self.ctx.infer_expr_kind(index, locals);
        if kind == ValueKind::Bool {
            kind = ValueKind::Int32;
        }
        if !kind.is_integer() {
            return Err(format!("{verb} requires integer index"));
        }
        Ok(kind)
    }

    fn emit_indexed_load(
        &mut self,
        receiver: &Expr,
        index: &Expr,
        locals: &LocalMap,
        header: i64,
        checked: bool,
        message: &str,
    ) -> LowerResult<()> {
        let index_kind = self.index_kind(index, locals, "at")?;

        let base_slot = self.alloc_temp();
        self.emit_collection_base(receiver, locals)?;
        self.store(base_slot);

        let index_slot = self.alloc_temp();
        self.emit_expr(index, locals)?;
        self.store(index_slot);

        if checked {
            self.emit_index_bounds_guard(base_slot, index_slot, index_kind, message);
        }

        self.emit_element_address(base_slot, index_slot, index_kind, header);
        self.emit(IrOpcode::LoadIndirect);
        Ok(())
    }

    /// Guard `0 <= index < count`; the count sits in the header slot.
    fn emit_index_bounds_guard(
        &mut self,
        base_slot: u32,
        index_slot: u32,
        index_kind: ValueKind,
        message: &str,
    ) {
        if index_kind != ValueKind::UInt64 {
            self.load(index_slot);
            self.push_int_const(index_kind, 0);
            self.emit(if index_kind == ValueKind::Int32 {
                IrOpcode::CmpLtI32
            } else {
                IrOpcode::CmpLtI64
            });
            let jump_ok = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.emit_guard_failure(message);
            self.patch_jump_here(jump_ok);
        }

        self.load(index_slot);
        self.load(base_slot);
        self.emit(IrOpcode::LoadIndirect);
        self.emit(match index_kind {
            ValueKind::Int32 => IrOpcode::CmpGeI32,
            ValueKind::Int64 => IrOpcode::CmpGeI64,
            _ => IrOpcode::CmpGeU64,
        });
        let jump_in_range = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_guard_failure(message);
        self.patch_jump_here(jump_in_range);
    }

    /// Push `base + 16 * (header + index)`.
    fn emit_element_address(
        &mut self,
        base_slot: u32,
        index_slot: u32,
        index_kind: ValueKind,
        header: i64,
    ) {
        self.load(base_slot);
        self.load(index_slot);
        self.push_int_const(index_kind, header);
        self.emit(if index_kind == ValueKind::Int32 {
            IrOpcode::AddI32
        } else {
            IrOpcode::AddI64
        });
        self.push_int_const(index_kind, 16);
        self.emit(if index_kind == ValueKind::Int32 {
            IrOpcode::MulI32
        } else {
            IrOpcode::MulI64
        });
        self.emit(IrOpcode::AddI64);
    }

    fn emit_map_lookup(
        &mut self,
        receiver: &Expr,
        key: &Expr,
        locals: &LocalMap,
        checked: bool,
    ) -> LowerResult<()> {
        // String keys resolve to table indices; argv-derived strings are
        // rejected for map keys and lookups.
        let key_is_string = self.ctx.infer_expr_kind(key, locals) == ValueKind::String;
        let key_slot = self.alloc_temp();
        if key_is_string {
            if self.is_argv_string(key, locals) {
                return Err(
                    "native backend does not support argv-derived strings as map keys".to_string(),
                );
            }
            let (index, _) = self.static_string_index(key, locals).ok_or_else(|| {
                "native backend requires map literal string keys to be string literals or \
                 bindings backed by literals"
                    .to_string()
            })?;
            self.push_i32(index as i32);
        } else {
            self.emit_expr(key, locals)?;
        }
        self.store(key_slot);

        let base_slot = self.alloc_temp();
        self.emit_collection_base(receiver, locals)?;
        self.store(base_slot);

        let count_slot = self.alloc_temp();
        self.load(base_slot);
        self.emit(IrOpcode::LoadIndirect);
        self.store(count_slot);

        let cursor_slot = self.alloc_temp();
        self.push_i32(0);
        self.store(cursor_slot);

        let result_slot = self.alloc_temp();

        let loop_start = self.here();
        self.load(cursor_slot);
        self.load(count_slot);
        self.emit(IrOpcode::CmpLtI32);
        let jump_missing = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        // key address = base + 16 * (1 + 2 * cursor)
        let key_addr_slot = self.alloc_temp();
        self.load(base_slot);
        self.load(cursor_slot);
        self.push_i32(2);
        self.emit(IrOpcode::MulI32);
        self.push_i32(1);
        self.emit(IrOpcode::AddI32);
        self.push_i32(16);
        self.emit(IrOpcode::MulI32);
        self.emit(IrOpcode::AddI64);
        self.store(key_addr_slot);

        self.load(key_addr_slot);
        self.emit(IrOpcode::LoadIndirect);
        self.load(key_slot);
        self.emit(IrOpcode::CmpEqI64);
        let jump_next = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        self.load(key_addr_slot);
        self.push_i64(16);
        self.emit(IrOpcode::AddI64);
        self.emit(IrOpcode::LoadIndirect);
        self.store(result_slot);
        let jump_found = self.emit_jump_placeholder(IrOpcode::Jump);

        self.patch_jump_here(jump_next);
        self.load(cursor_slot);
        self.push_i32(1);
        self.emit(IrOpcode::AddI32);
        self.store(cursor_slot);
        self.emit_imm(IrOpcode::Jump, loop_start as u64);

        self.patch_jump_here(jump_missing);
        if checked {
            self.emit_guard_failure("map key not found");
        }
        self.patch_jump_here(jump_found);
        self.load(result_slot);
        Ok(())
    }

    fn is_argv_string(&self, expr: &Expr, locals: &LocalMap) -> bool {
        match expr {
            Expr::Name(name) => locals
                .get(&name.name)
                .map(|info| info.string_source == StringSource::Argv)
                .unwrap_or(false),
            Expr::Call(call) => call
                .args
                .first()
                .map(|receiver| self.is_entry_args_name(receiver, locals))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Byte access into a lower-time-known string: bounds guard plus a
    /// compare/select chain over the interned bytes.
    fn emit_string_byte_access(
        &mut self,
        string_index: u32,
        index: &Expr,
        locals: &LocalMap,
        checked: bool,
    ) -> LowerResult<()> {
        let index_kind = self.index_kind(index, locals, "at")?;
        let bytes: Vec<u8> = self.strings[string_index as usize].bytes().collect();

        let index_slot = self.alloc_temp();
        self.emit_expr(index, locals)?;
        self.store(index_slot);

        if checked {
            if index_kind != ValueKind::UInt64 {
                self.load(index_slot);
                self.push_int_const(index_kind, 0);
                self.emit(if index_kind == ValueKind::Int32 {
                    IrOpcode::CmpLtI32
                } else {
                    IrOpcode::CmpLtI64
                });
                let jump_ok = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
                self.emit_guard_failure("string index out of bounds");
                self.patch_jump_here(jump_ok);
            }
            self.load(index_slot);
            self.push_int_const(index_kind, bytes.len() as i64);
            self.emit(match index_kind {
                ValueKind::Int32 => IrOpcode::CmpGeI32,
                ValueKind::Int64 => IrOpcode::CmpGeI64,
                _ => IrOpcode::CmpGeU64,
            });
            let jump_in_range = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.emit_guard_failure("string index out of bounds");
            self.patch_jump_here(jump_in_range);
        }

        let result_slot = self.alloc_temp();
        self.push_i32(0);
        self.store(result_slot);
        let mut end_patches = Vec::new();
        for (position, byte) in bytes.iter().enumerate() {
            self.load(index_slot);
            self.push_int_const(index_kind, position as i64);
            self.emit(if index_kind == ValueKind::Int32 {
                IrOpcode::CmpEqI32
            } else {
                IrOpcode::CmpEqI64
            });
            let jump_next = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.push_i32(*byte as i32);
            self.store(result_slot);
            end_patches.push(self.emit_jump_placeholder(IrOpcode::Jump));
            self.patch_jump_here(jump_next);
        }
        for patch in end_patches {
            self.patch_jump_here(patch);
        }
        self.load(result_slot);
        Ok(())
    }

    /// `args[i]` yields the table index of the baked argv string.
    fn emit_argv_access(
        &mut self,
        index: &Expr,
        locals: &LocalMap,
        checked: bool,
    ) -> LowerResult<()> {
        let indices: Vec<u32> = match &self.entry_args {
            Some((_, indices)) => indices.clone(),
            None => return Err("native backend entry parameter requires argv support".to_string()),
        };
        if let Expr::Int(lit) = index {
            let position = lit.value as i64;
            match self.argv_string_index(position) {
                Some(table_index) => {
                    self.push_i32(table_index as i32);
                    return Ok(());
                }
                None if checked => {
                    self.emit_guard_failure("array index out of bounds");
                    self.push_i32(0);
                    return Ok(());
                }
                None => {
                    self.push_i32(0);
                    return Ok(());
                }
            }
        }
        let index_kind = self.index_kind(index, locals, "at")?;
        let index_slot = self.alloc_temp();
        self.emit_expr(index, locals)?;
        self.store(index_slot);

        if checked {
            self.load(index_slot);
            self.push_int_const(index_kind, indices.len() as i64);
            self.emit(match index_kind {
                ValueKind::Int32 => IrOpcode::CmpGeI32,
                ValueKind::Int64 => IrOpcode::CmpGeI64,
                _ => IrOpcode::CmpGeU64,
            });
            let jump_in_range = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.emit_guard_failure("array index out of bounds");
            self.patch_jump_here(jump_in_range);
        }

        let result_slot = self.alloc_temp();
        self.push_i32(0);
        self.store(result_slot);
        let mut end_patches = Vec::new();
        for (position, table_index) in indices.iter().enumerate() {
            self.load(index_slot);
            self.push_int_const(index_kind, position as i64);
            self.emit(if index_kind == ValueKind::Int32 {
                IrOpcode::CmpEqI32
            } else {
                IrOpcode::CmpEqI64
            });
            let jump_next = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.push_i32(*table_index as i32);
            self.store(result_slot);
            end_patches.push(self.emit_jump_placeholder(IrOpcode::Jump));
            self.patch_jump_here(jump_next);
        }
        for patch in end_patches {
            self.patch_jump_here(patch);
        }
        self.load(result_slot);
        Ok(())
    }

    // ── count / capacity ──────────────────────────────────────────────────

    pub(crate) fn emit_count(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        if call.args.len() != 1 {
            return Err("argument count mismatch for builtin count".to_string());
        }
        let receiver = &call.args[0];
        if self.is_entry_args_name(receiver, locals) {
            let argc = self
                .entry_args_count()
                .ok_or_else(|| "native backend entry parameter requires argv support".to_string())?;
            self.push_i32(argc);
            return Ok(());
        }
        if let Some((_, length)) = self.static_string_index(receiver, locals) {
            self.push_i32(length as i32);
            return Ok(());
        }
        self.emit_collection_base(receiver, locals)?;
        self.emit(IrOpcode::LoadIndirect);
        Ok(())
    }

    pub(crate) fn emit_capacity(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        if call.args.len() != 1 {
            return Err("argument count mismatch for builtin capacity".to_string());
        }
        let receiver = &call.args[0];
        let is_vector = match receiver {
            Expr::Name(name) => locals
                .get(&name.name)
                .map(|info| info.kind == BindingKind::Vector)
                .unwrap_or(false),
            Expr::Call(inner) => inner.name == "vector",
            _ => false,
        };
        if !is_vector {
            return Err("capacity requires a vector receiver".to_string());
        }
        self.emit_collection_base(receiver, locals)?;
        self.push_i64(16);
        self.emit(IrOpcode::AddI64);
        self.emit(IrOpcode::LoadIndirect);
        Ok(())
    }

    // ── vector mutators ───────────────────────────────────────────────────

    pub(crate) fn emit_vector_mutator(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        let helper = call.name.as_str();
        if !call.template_args.is_empty() {
            return Err(format!("{helper} does not accept template arguments"));
        }
        if call.has_body || !call.body.is_empty() {
            return Err(format!("{helper} does not accept block arguments"));
        }
        let expected_args = if matches!(helper, "pop" | "clear") { 1 } else { 2 };
        if call.args.len() != expected_args {
            return Err(if expected_args == 1 {
                format!("{helper} requires exactly one argument")
            } else {
                format!("{helper} requires exactly two arguments")
            });
        }

        let target = &call.args[0];
        let Expr::Name(target_name) = target else {
            return Err(format!("{helper} requires mutable vector binding"));
        };
        let info = locals
            .get(&target_name.name)
            .filter(|info| info.kind == BindingKind::Vector && info.mutable)
            .ok_or_else(|| format!("{helper} requires mutable vector binding"))?
            .clone();

        const ELEMENT_OFFSET: i64 = 2;
        let ptr_slot = self.alloc_temp();
        self.load(info.slot);
        self.store(ptr_slot);

        if helper == "clear" {
            self.load(ptr_slot);
            self.push_i32(0);
            self.emit(IrOpcode::StoreIndirect);
            self.emit(IrOpcode::Pop);
            return Ok(());
        }

        let count_slot = self.alloc_temp();
        self.load(ptr_slot);
        self.emit(IrOpcode::LoadIndirect);
        self.store(count_slot);

        let capacity_slot = if matches!(helper, "push" | "reserve") {
            let slot = self.alloc_temp();
            self.load(ptr_slot);
            self.push_i64(16);
            self.emit(IrOpcode::AddI64);
            self.emit(IrOpcode::LoadIndirect);
            self.store(slot);
            Some(slot)
        } else {
            None
        };

        match helper {
            "reserve" => {
                let capacity_slot = capacity_slot.expect("reserve capacity");
                let desired_kind = self.index_kind(&call.args[1], locals, "reserve").map_err(|_| {
                    "reserve requires integer capacity".to_string()
                })?;
                let desired_slot = self.alloc_temp();
                self.emit_expr(&call.args[1], locals)?;
                self.store(desired_slot);

                if desired_kind != ValueKind::UInt64 {
                    self.load(desired_slot);
                    self.push_int_const(desired_kind, 0);
                    self.emit(if desired_kind == ValueKind::Int32 {
                        IrOpcode::CmpLtI32
                    } else {
                        IrOpcode::CmpLtI64
                    });
                    let jump_ok = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
                    self.emit_guard_failure("vector reserve expects non-negative capacity");
                    self.patch_jump_here(jump_ok);
                }

                self.load(capacity_slot);
                self.load(desired_slot);
                self.emit(match desired_kind {
                    ValueKind::Int32 => IrOpcode::CmpLtI32,
                    ValueKind::Int64 => IrOpcode::CmpLtI64,
                    _ => IrOpcode::CmpLtU64,
                });
                let jump_within = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
                self.emit_guard_failure("vector reserve exceeds capacity");
                self.patch_jump_here(jump_within);
                Ok(())
            }
            "push" => {
                let capacity_slot = capacity_slot.expect("push capacity");
                self.load(count_slot);
                self.load(capacity_slot);
                self.emit(IrOpcode::CmpLtI32);
                let jump_has_space = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

                let value_slot = self.alloc_temp();
                self.emit_expr(&call.args[1], locals)?;
                self.store(value_slot);

                let dest_slot = self.alloc_temp();
                self.load(ptr_slot);
                self.load(count_slot);
                self.push_i32(ELEMENT_OFFSET as i32);
                self.emit(IrOpcode::AddI32);
                self.push_i32(16);
                self.emit(IrOpcode::MulI32);
                self.emit(IrOpcode::AddI64);
                self.store(dest_slot);

                self.load(dest_slot);
                self.load(value_slot);
                self.emit(IrOpcode::StoreIndirect);
                self.emit(IrOpcode::Pop);

                self.load(count_slot);
                self.push_i32(1);
                self.emit(IrOpcode::AddI32);
                self.store(count_slot);

                self.load(ptr_slot);
                self.load(count_slot);
                self.emit(IrOpcode::StoreIndirect);
                self.emit(IrOpcode::Pop);

                let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
                self.patch_jump_here(jump_has_space);
                self.emit_guard_failure("vector capacity exceeded");
                self.patch_jump_here(jump_end);
                Ok(())
            }
            "pop" => {
                self.load(count_slot);
                self.push_i32(0);
                self.emit(IrOpcode::CmpEqI32);
                let jump_non_empty = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
                self.emit_guard_failure("vector pop on empty");
                self.patch_jump_here(jump_non_empty);

                self.load(count_slot);
                self.push_i32(1);
                self.emit(IrOpcode::SubI32);
                self.store(count_slot);

                self.load(ptr_slot);
                self.load(count_slot);
                self.emit(IrOpcode::StoreIndirect);
                self.emit(IrOpcode::Pop);
                Ok(())
            }
            "remove_at" | "remove_swap" => self.emit_vector_remove(
                helper,
                &call.args[1],
                locals,
                ptr_slot,
                count_slot,
                ELEMENT_OFFSET,
            ),
            _ => unreachable!("vector helper set"),
        }
    }

    fn emit_vector_remove(
        &mut self,
        helper: &str,
        index: &Expr,
        locals: &LocalMap,
        ptr_slot: u32,
        count_slot: u32,
        element_offset: i64,
    ) -> LowerResult<()> {
        let index_kind = self
            .index_kind(index, locals, helper)
            .map_err(|_| format!("{helper} requires integer index"))?;

        let index_slot = self.alloc_temp();
        self.emit_expr(index, locals)?;
        self.store(index_slot);

        if index_kind != ValueKind::UInt64 {
            self.load(index_slot);
            self.push_int_const(index_kind, 0);
            self.emit(if index_kind == ValueKind::Int32 {
                IrOpcode::CmpLtI32
            } else {
                IrOpcode::CmpLtI64
            });
            let jump_ok = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.emit_guard_failure("vector index out of bounds");
            self.patch_jump_here(jump_ok);
        }

        self.load(index_slot);
        self.load(count_slot);
        self.emit(match index_kind {
            ValueKind::Int32 => IrOpcode::CmpGeI32,
            ValueKind::Int64 => IrOpcode::CmpGeI64,
            _ => IrOpcode::CmpGeU64,
        });
        let jump_in_range = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_guard_failure("vector index out of bounds");
        self.patch_jump_here(jump_in_range);

        let add_op = if index_kind == ValueKind::Int32 { IrOpcode::AddI32 } else { IrOpcode::AddI64 };
        let sub_op = if index_kind == ValueKind::Int32 { IrOpcode::SubI32 } else { IrOpcode::SubI64 };
        let mul_op = if index_kind == ValueKind::Int32 { IrOpcode::MulI32 } else { IrOpcode::MulI64 };

        let last_slot = self.alloc_temp();
        self.load(count_slot);
        self.push_int_const(index_kind, 1);
        self.emit(sub_op);
        self.store(last_slot);

        let element_address = |lowerer: &mut Self, cursor_slot: u32, extra: i64| {
            lowerer.load(ptr_slot);
            lowerer.load(cursor_slot);
            lowerer.push_int_const(index_kind, element_offset + extra);
            lowerer.emit(add_op);
            lowerer.push_int_const(index_kind, 16);
            lowerer.emit(mul_op);
            lowerer.emit(IrOpcode::AddI64);
        };

        if helper == "remove_swap" {
            let dest_slot = self.alloc_temp();
            let src_slot = self.alloc_temp();
            let value_slot = self.alloc_temp();

            element_address(self, index_slot, 0);
            self.store(dest_slot);
            element_address(self, last_slot, 0);
            self.store(src_slot);

            self.load(src_slot);
            self.emit(IrOpcode::LoadIndirect);
            self.store(value_slot);

            self.load(dest_slot);
            self.load(value_slot);
            self.emit(IrOpcode::StoreIndirect);
            self.emit(IrOpcode::Pop);
        } else {
            // remove_at: shift everything after the index down one slot.
            let dest_slot = self.alloc_temp();
            let src_slot = self.alloc_temp();
            let value_slot = self.alloc_temp();
            let cmp_lt = if index_kind == ValueKind::Int32 {
                IrOpcode::CmpLtI32
            } else if index_kind == ValueKind::Int64 {
                IrOpcode::CmpLtI64
            } else {
                IrOpcode::CmpLtU64
            };

            let loop_start = self.here();
            self.load(index_slot);
            self.load(last_slot);
            self.emit(cmp_lt);
            let jump_loop_end = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

            element_address(self, index_slot, 0);
            self.store(dest_slot);
            element_address(self, index_slot, 1);
            self.store(src_slot);

            self.load(src_slot);
            self.emit(IrOpcode::LoadIndirect);
            self.store(value_slot);

            self.load(dest_slot);
            self.load(value_slot);
            self.emit(IrOpcode::StoreIndirect);
            self.emit(IrOpcode::Pop);

            self.load(index_slot);
            self.push_int_const(index_kind, 1);
            self.emit(add_op);
            self.store(index_slot);
            self.emit_imm(IrOpcode::Jump, loop_start as u64);

            self.patch_jump_here(jump_loop_end);
        }

        self.load(count_slot);
        self.push_i32(1);
        self.emit(IrOpcode::SubI32);
        self.store(count_slot);

        self.load(ptr_slot);
        self.load(count_slot);
        self.emit(IrOpcode::StoreIndirect);
        self.emit(IrOpcode::Pop);
        Ok(())
    }

    // ── structs ───────────────────────────────────────────────────────────

    /// Materialize a struct literal: field initializers land in consecutive
    /// locals, `Create` runs if defined, and the value is the base address.
    pub(crate) fn emit_struct_constructor(
        &mut self,
        call: &Call,
        struct_path: &str,
        _locals: &LocalMap,
    ) -> LowerResult<()> {
        if !call.args.is_empty() {
            return Err(format!("struct constructors do not accept arguments: {struct_path}"));
        }
        let fields: Vec<Call> = self
            .ctx
            .struct_fields(struct_path)
            .into_iter()
            .cloned()
            .collect();
        let base = self.alloc_block(fields.len().max(1) as u32);
        let field_locals = LocalMap::new();
        for (index, field) in fields.iter().enumerate() {
            let init = field
                .args
                .first()
                .ok_or_else(|| "struct definitions require field initializers".to_string())?;
            self.emit_expr(init, &field_locals)?;
            self.store(base + index as u32);
        }

        let address_slot = self.alloc_temp();
        self.emit_imm(IrOpcode::AddressOfLocal, base as u64);
        self.store(address_slot);

        let create_path = format!("{struct_path}/Create");
        if self.ctx.def_map.contains_key(&create_path) {
            self.emit_lifecycle_call(&create_path, struct_path, address_slot)?;
        }
        self.register_struct_cleanup(struct_path, address_slot);

        self.load(address_slot);
        Ok(())
    }

    /// `receiver.field`: load through the struct address at the field
    /// offset.
    pub(crate) fn emit_field_access(&mut self, call: &Call, locals: &LocalMap) -> LowerResult<()> {
        let receiver = call
            .args
            .first()
            .ok_or_else(|| "field access missing receiver".to_string())?;
        let (index, _) = self
            .ctx
            .field_access_info(call, locals)
            .ok_or_else(|| format!("unknown field: {}", call.name))?;
        self.emit_pointer_value(receiver, locals)?;
        if index > 0 {
            self.push_i64(16 * index as i64);
            self.emit(IrOpcode::AddI64);
        }
        self.emit(IrOpcode::LoadIndirect);
        Ok(())
    }
}
