//! IR lowering.
//!
//! `IrLowerer::lower` turns a validated program plus an entry path into a
//! single-function PSIR module: definition calls are fully inlined,
//! builtins expand to instruction sequences, control flow becomes jumps,
//! and runtime guards are compiled into stderr diagnostics plus
//! `ReturnI32 3`.

mod collections;
mod exprs;
mod inline;
mod loops;
mod math;
mod stmts;

use prism_ast::{Call, Expr, Program};

use crate::config::CoreOptions;
use crate::context::{LocalInfo, LocalMap, SharedContext, StringSource};
use crate::error::LowerError;
use crate::ir::{
    encode_print_flags, encode_print_string_imm, IrFunction, IrInstruction, IrModule, IrOpcode,
};
use crate::kinds::ValueKind;

pub(crate) type LowerResult<T> = Result<T, String>;

/// Lowers validated programs into PSIR modules.
#[derive(Debug, Clone, Default)]
pub struct IrLowerer {
    options: CoreOptions,
}

impl IrLowerer {
    pub fn new(options: CoreOptions) -> Self {
        Self { options }
    }

    /// Lower `entry_path` and everything it reaches into one PSIR module.
    pub fn lower(&self, program: &Program, entry_path: &str) -> Result<IrModule, LowerError> {
        let ctx = SharedContext::build(program, &self.options).map_err(LowerError::new)?;
        let mut lowerer = FuncLowerer::new(&ctx, &self.options);
        lowerer.lower_entry(entry_path).map_err(LowerError::new)
    }
}

/// One inline-expansion frame: `return` statements inside the frame store
/// into the result slot and jump to the frame end instead of emitting a
/// `Return*` opcode.
struct InlineFrame {
    result_slot: Option<u32>,
    end_patches: Vec<usize>,
    scope_depth: usize,
}

/// Struct bindings registered for `Destroy` at scope exit.
#[derive(Clone)]
struct CleanupEntry {
    struct_path: String,
    address_slot: u32,
}

pub(crate) struct FuncLowerer<'c, 'p> {
    pub(crate) ctx: &'c SharedContext<'p>,
    pub(crate) options: &'c CoreOptions,
    code: Vec<IrInstruction>,
    strings: Vec<String>,
    next_local: u32,
    inline_stack: Vec<String>,
    inline_frames: Vec<InlineFrame>,
    scopes: Vec<Vec<CleanupEntry>>,
    /// Entry argv binding name and the table indices of the baked argv
    /// strings.
    entry_args: Option<(String, Vec<u32>)>,
    return_kind: ValueKind,
    returns_void: bool,
}

impl<'c, 'p> FuncLowerer<'c, 'p> {
    fn new(ctx: &'c SharedContext<'p>, options: &'c CoreOptions) -> Self {
        Self {
            ctx,
            options,
            code: Vec::with_capacity(64),
            strings: Vec::new(),
            next_local: 0,
            inline_stack: Vec::new(),
            inline_frames: Vec::new(),
            scopes: vec![Vec::new()],
            entry_args: None,
            return_kind: ValueKind::Void,
            returns_void: true,
        }
    }

    fn lower_entry(&mut self, entry_path: &str) -> LowerResult<IrModule> {
        let entry = self
            .ctx
            .definition(entry_path)
            .ok_or_else(|| format!("native backend cannot resolve definition: {entry_path}"))?;

        let info = self.ctx.return_info(entry_path)?;
        self.returns_void = info.returns_void;
        self.return_kind = if info.returns_void { ValueKind::Void } else { info.kind };

        let mut locals = LocalMap::new();
        if !entry.params.is_empty() {
            if entry.params.len() != 1 {
                return Err(
                    "native backend only supports a single array<string> entry parameter".to_string(),
                );
            }
            let param = entry.params[0]
                .as_call()
                .filter(|c| c.is_binding)
                .ok_or_else(|| "native backend entry parameter must be array<string>".to_string())?;
            if !is_entry_args_param(param) {
                return Err("native backend entry parameter must be array<string>".to_string());
            }
            if !param.args.is_empty() {
                return Err("native backend does not allow entry parameter defaults".to_string());
            }
            let argv = self
                .options
                .entry_args
                .clone()
                .ok_or_else(|| "native backend entry parameter requires argv support".to_string())?;
            let indices = argv.iter().map(|arg| self.intern(arg)).collect();
            self.entry_args = Some((param.name.clone(), indices));
        }

        self.inline_stack.push(entry.full_path.clone());
        for stmt in &entry.body {
            self.emit_statement(stmt, &mut locals)?;
        }
        if let Some(ret) = &entry.return_expr {
            let ret_stmt = Expr::Call(Call::new("return", vec![ret.clone()]));
            self.emit_statement(&ret_stmt, &mut locals)?;
        }
        self.inline_stack.pop();

        let falls_through = !matches!(
            self.code.last().map(|i| i.op),
            Some(
                IrOpcode::ReturnI32
                    | IrOpcode::ReturnI64
                    | IrOpcode::ReturnF32
                    | IrOpcode::ReturnF64
                    | IrOpcode::ReturnVoid
            )
        );
        if falls_through {
            self.emit_cleanup_depth(0)?;
            if self.returns_void {
                self.emit(IrOpcode::ReturnVoid);
            }
        }

        let function = IrFunction {
            name: entry.full_path.clone(),
            local_count: self.next_local,
            return_kind: if self.returns_void { ValueKind::Void } else { self.return_kind },
            instructions: std::mem::take(&mut self.code),
        };
        Ok(IrModule {
            functions: vec![function],
            strings: std::mem::take(&mut self.strings),
        })
    }

    // ── emission primitives ───────────────────────────────────────────────

    pub(crate) fn emit(&mut self, op: IrOpcode) {
        self.code.push(IrInstruction::op(op));
    }

    pub(crate) fn emit_imm(&mut self, op: IrOpcode, imm: u64) {
        self.code.push(IrInstruction::new(op, imm));
    }

    pub(crate) fn here(&self) -> usize {
        self.code.len()
    }

    /// Reserve a jump whose target is patched later.
    pub(crate) fn emit_jump_placeholder(&mut self, op: IrOpcode) -> usize {
        let at = self.code.len();
        self.code.push(IrInstruction::new(op, 0));
        at
    }

    pub(crate) fn patch_jump(&mut self, at: usize, target: usize) {
        debug_assert!(matches!(
            self.code[at].op,
            IrOpcode::Jump | IrOpcode::JumpIfZero
        ));
        self.code[at].imm = target as u64;
    }

    pub(crate) fn patch_jump_here(&mut self, at: usize) {
        let target = self.here();
        self.patch_jump(at, target);
    }

    pub(crate) fn alloc_temp(&mut self) -> u32 {
        let slot = self.next_local;
        self.next_local += 1;
        slot
    }

    /// Reserve a contiguous run of slots (collection storage).
    pub(crate) fn alloc_block(&mut self, count: u32) -> u32 {
        let base = self.next_local;
        self.next_local += count;
        base
    }

    pub(crate) fn load(&mut self, slot: u32) {
        self.emit_imm(IrOpcode::LoadLocal, slot as u64);
    }

    pub(crate) fn store(&mut self, slot: u32) {
        self.emit_imm(IrOpcode::StoreLocal, slot as u64);
    }

    pub(crate) fn intern(&mut self, text: &str) -> u32 {
        if let Some(index) = self.strings.iter().position(|s| s == text) {
            return index as u32;
        }
        self.strings.push(text.to_string());
        (self.strings.len() - 1) as u32
    }

    pub(crate) fn push_i32(&mut self, value: i32) {
        self.emit_imm(IrOpcode::PushI32, value as i64 as u64);
    }

    pub(crate) fn push_i64(&mut self, value: i64) {
        self.emit_imm(IrOpcode::PushI64, value as u64);
    }

    pub(crate) fn push_f64_const(&mut self, value: f64) {
        self.emit_imm(IrOpcode::PushF64, value.to_bits());
    }

    pub(crate) fn push_f32_const(&mut self, value: f32) {
        self.emit_imm(IrOpcode::PushF32, value.to_bits() as u64);
    }

    /// Push an integer constant in the width of `kind`.
    pub(crate) fn push_int_const(&mut self, kind: ValueKind, value: i64) {
        if kind == ValueKind::Int32 {
            self.push_i32(value as i32);
        } else {
            self.push_i64(value);
        }
    }

    // ── runtime guards ────────────────────────────────────────────────────

    /// Print a fixed diagnostic to stderr and exit the function with 3.
    pub(crate) fn emit_guard_failure(&mut self, message: &str) {
        let index = self.intern(message);
        let flags = encode_print_flags(true, true);
        self.emit_imm(
            IrOpcode::PrintString,
            encode_print_string_imm(index as u64, flags),
        );
        self.push_i32(3);
        self.emit(IrOpcode::ReturnI32);
    }

    // ── scopes and struct cleanup ─────────────────────────────────────────

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Emit cleanup for the innermost scope, then drop it.
    pub(crate) fn pop_scope(&mut self) -> LowerResult<()> {
        let entries = self.scopes.last().cloned().unwrap_or_default();
        self.emit_cleanup_entries(&entries)?;
        self.scopes.pop();
        Ok(())
    }

    /// Drop the innermost scope without cleanup (entries hoisted by
    /// `shared_scope` move to the parent scope).
    pub(crate) fn pop_scope_hoisted(&mut self) {
        if let Some(entries) = self.scopes.pop() {
            if let Some(parent) = self.scopes.last_mut() {
                parent.extend(entries);
            }
        }
    }

    pub(crate) fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub(crate) fn register_struct_cleanup(&mut self, struct_path: &str, address_slot: u32) {
        let destroy = format!("{struct_path}/Destroy");
        if self.ctx.def_map.contains_key(&destroy) {
            if let Some(scope) = self.scopes.last_mut() {
                scope.push(CleanupEntry {
                    struct_path: struct_path.to_string(),
                    address_slot,
                });
            }
        }
    }

    /// Emit cleanup for every scope deeper than `depth` (used by returns,
    /// which exit all of them at once). Scopes stay on the stack.
    pub(crate) fn emit_cleanup_depth(&mut self, depth: usize) -> LowerResult<()> {
        let pending: Vec<CleanupEntry> = self.scopes[depth.min(self.scopes.len())..]
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev().cloned())
            .collect();
        self.emit_cleanup_entries(&pending)
    }

    fn emit_cleanup_entries(&mut self, entries: &[CleanupEntry]) -> LowerResult<()> {
        for entry in entries.iter().rev() {
            let destroy = format!("{}/Destroy", entry.struct_path);
            self.emit_lifecycle_call(&destroy, &entry.struct_path, entry.address_slot)?;
        }
        Ok(())
    }

    /// Map a binding to its frame record with a freshly allocated slot.
    pub(crate) fn declare_binding(&mut self, call: &Call, locals: &LocalMap) -> LocalInfo {
        let slot = self.alloc_temp();
        self.ctx.classify_binding(call, locals, slot)
    }

    // ── string sources ────────────────────────────────────────────────────

    /// Resolve an expression to a lower-time string-table index: a string
    /// literal, or a binding backed by one.
    pub(crate) fn static_string_index(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Option<(u32, usize)> {
        match expr {
            Expr::Str(lit) => {
                let index = self.intern(&lit.value);
                Some((index, lit.value.len()))
            }
            Expr::Name(name) => {
                let info = locals.get(&name.name)?;
                if info.value_kind != ValueKind::String || info.string_source != StringSource::Table
                {
                    return None;
                }
                let index = u32::try_from(info.string_index).ok()?;
                let length = self.strings.get(index as usize)?.len();
                Some((index, length))
            }
            _ => None,
        }
    }

    /// The argv table index for `args[i]` with a literal index.
    pub(crate) fn argv_string_index(&self, index: i64) -> Option<u32> {
        let (_, indices) = self.entry_args.as_ref()?;
        indices.get(usize::try_from(index).ok()?).copied()
    }

    pub(crate) fn is_entry_args_name(&self, expr: &Expr, locals: &LocalMap) -> bool {
        match (expr, &self.entry_args) {
            (Expr::Name(name), Some((args_name, _))) => {
                name.name == *args_name && !locals.contains_key(&name.name)
            }
            _ => false,
        }
    }

    pub(crate) fn entry_args_count(&self) -> Option<i32> {
        self.entry_args.as_ref().map(|(_, v)| v.len() as i32)
    }

    // ── inline frame plumbing (details in inline.rs) ──────────────────────

    pub(crate) fn in_inline_frame(&self) -> bool {
        !self.inline_frames.is_empty()
    }

    /// Open an inline frame. Must be called before the callee's scope is
    /// pushed so frame returns clean up the callee's scopes.
    pub(crate) fn push_inline_frame_for(&mut self, result_slot: Option<u32>) {
        self.inline_frames.push(InlineFrame {
            result_slot,
            end_patches: Vec::new(),
            scope_depth: self.scope_depth(),
        });
    }

    /// Close the innermost inline frame, landing its return jumps here.
    pub(crate) fn finish_inline_frame(&mut self) {
        let frame = self.inline_frames.pop().expect("inline frame underflow");
        for patch in frame.end_patches {
            self.patch_jump_here(patch);
        }
    }

    /// Route a `return` through the innermost inline frame: store the value
    /// (already on the stack, if any) and jump to the frame end.
    pub(crate) fn emit_inline_return(&mut self, has_value: bool) -> LowerResult<()> {
        let depth = self
            .inline_frames
            .last()
            .map(|f| f.scope_depth)
            .unwrap_or(0);
        let result_slot = self.inline_frames.last().and_then(|f| f.result_slot);
        if has_value {
            match result_slot {
                Some(slot) => self.store(slot),
                None => self.emit(IrOpcode::Pop),
            }
        }
        self.emit_cleanup_depth(depth)?;
        let patch = self.emit_jump_placeholder(IrOpcode::Jump);
        if let Some(frame) = self.inline_frames.last_mut() {
            frame.end_patches.push(patch);
        }
        Ok(())
    }

    pub(crate) fn inline_stack_contains(&self, path: &str) -> bool {
        self.inline_stack.iter().any(|p| p == path)
    }

    pub(crate) fn inline_stack_push(&mut self, path: &str) {
        self.inline_stack.push(path.to_string());
    }

    pub(crate) fn inline_stack_pop(&mut self) {
        self.inline_stack.pop();
    }

    // ── opcode selection tables ───────────────────────────────────────────

    pub(crate) fn arith_opcode(&self, name: &str, kind: ValueKind) -> LowerResult<IrOpcode> {
        use IrOpcode::*;
        let op = match (name, kind) {
            ("plus", ValueKind::Int32) => AddI32,
            ("plus", ValueKind::Int64 | ValueKind::UInt64) => AddI64,
            ("plus", ValueKind::Float32) => AddF32,
            ("plus", ValueKind::Float64) => AddF64,
            ("minus", ValueKind::Int32) => SubI32,
            ("minus", ValueKind::Int64 | ValueKind::UInt64) => SubI64,
            ("minus", ValueKind::Float32) => SubF32,
            ("minus", ValueKind::Float64) => SubF64,
            ("multiply", ValueKind::Int32) => MulI32,
            ("multiply", ValueKind::Int64 | ValueKind::UInt64) => MulI64,
            ("multiply", ValueKind::Float32) => MulF32,
            ("multiply", ValueKind::Float64) => MulF64,
            ("divide", ValueKind::Int32) => DivI32,
            ("divide", ValueKind::Int64) => DivI64,
            ("divide", ValueKind::UInt64) => DivU64,
            ("divide", ValueKind::Float32) => DivF32,
            ("divide", ValueKind::Float64) => DivF64,
            ("modulo", ValueKind::Int32) => ModI32,
            ("modulo", ValueKind::Int64) => ModI64,
            ("modulo", ValueKind::UInt64) => ModU64,
            _ => return Err(format!("{name} requires numeric arguments of the same type")),
        };
        Ok(op)
    }

    pub(crate) fn compare_opcode(&self, name: &str, kind: ValueKind) -> LowerResult<IrOpcode> {
        use IrOpcode::*;
        let op = match (name, kind) {
            ("equal", ValueKind::Int32) => CmpEqI32,
            ("not_equal", ValueKind::Int32) => CmpNeI32,
            ("less_than", ValueKind::Int32) => CmpLtI32,
            ("less_equal", ValueKind::Int32) => CmpLeI32,
            ("greater_than", ValueKind::Int32) => CmpGtI32,
            ("greater_equal", ValueKind::Int32) => CmpGeI32,
            // UInt64 equality reuses the I64 opcodes; ordered comparisons
            // get the unsigned forms.
            ("equal", ValueKind::Int64 | ValueKind::UInt64) => CmpEqI64,
            ("not_equal", ValueKind::Int64 | ValueKind::UInt64) => CmpNeI64,
            ("less_than", ValueKind::Int64) => CmpLtI64,
            ("less_equal", ValueKind::Int64) => CmpLeI64,
            ("greater_than", ValueKind::Int64) => CmpGtI64,
            ("greater_equal", ValueKind::Int64) => CmpGeI64,
            ("less_than", ValueKind::UInt64) => CmpLtU64,
            ("less_equal", ValueKind::UInt64) => CmpLeU64,
            ("greater_than", ValueKind::UInt64) => CmpGtU64,
            ("greater_equal", ValueKind::UInt64) => CmpGeU64,
            ("equal", ValueKind::Float32) => CmpEqF32,
            ("not_equal", ValueKind::Float32) => CmpNeF32,
            ("less_than", ValueKind::Float32) => CmpLtF32,
            ("less_equal", ValueKind::Float32) => CmpLeF32,
            ("greater_than", ValueKind::Float32) => CmpGtF32,
            ("greater_equal", ValueKind::Float32) => CmpGeF32,
            ("equal", ValueKind::Float64) => CmpEqF64,
            ("not_equal", ValueKind::Float64) => CmpNeF64,
            ("less_than", ValueKind::Float64) => CmpLtF64,
            ("less_equal", ValueKind::Float64) => CmpLeF64,
            ("greater_than", ValueKind::Float64) => CmpGtF64,
            ("greater_equal", ValueKind::Float64) => CmpGeF64,
            _ => return Err("comparisons require numeric, bool, or string operands".to_string()),
        };
        Ok(op)
    }

    /// Compare the top of stack against zero in the given kind, pushing a
    /// bool. `negate` selects `== 0`, otherwise `!= 0`.
    pub(crate) fn emit_compare_to_zero(&mut self, kind: ValueKind, negate: bool) -> LowerResult<()> {
        use IrOpcode::*;
        match kind {
            ValueKind::Int32 | ValueKind::Bool => {
                self.push_i32(0);
                self.emit(if negate { CmpEqI32 } else { CmpNeI32 });
            }
            ValueKind::Int64 | ValueKind::UInt64 => {
                self.push_i64(0);
                self.emit(if negate { CmpEqI64 } else { CmpNeI64 });
            }
            ValueKind::Float32 => {
                self.push_f32_const(0.0);
                self.emit(if negate { CmpEqF32 } else { CmpNeF32 });
            }
            ValueKind::Float64 => {
                self.push_f64_const(0.0);
                self.emit(if negate { CmpEqF64 } else { CmpNeF64 });
            }
            _ => return Err("boolean operators require integer or bool operands".to_string()),
        }
        Ok(())
    }
}

/// Entry parameters must be exactly `array<string>`.
fn is_entry_args_param(param: &Call) -> bool {
    let mut type_name: Option<(&str, Option<&str>)> = None;
    for transform in &param.transforms {
        if crate::context::is_qualifier_name(&transform.name) || !transform.args.is_empty() {
            continue;
        }
        let template = if transform.template_args.len() == 1 {
            Some(transform.template_args[0].as_str())
        } else {
            None
        };
        type_name = Some((transform.name.as_str(), template));
    }
    matches!(type_name, Some(("array", Some("string"))))
}
