//! Math builtin expansion.
//!
//! Every math builtin lowers to an inline instruction sequence over temp
//! locals: compare-and-select families for min/max/clamp/abs/sign, counted
//! loops for the integer `pow`, Newton iteration for roots, and
//! Taylor/atanh series (after range reduction) for the transcendentals.
//! Float32 runs the same shapes through the F32 opcodes with fewer
//! iterations.

use prism_ast::{Call, Expr};

use crate::context::LocalMap;
use crate::ir::IrOpcode;
use crate::kinds::{combine_numeric, ValueKind};

use super::{FuncLowerer, LowerResult};

const LN2: f64 = std::f64::consts::LN_2;
const LN10: f64 = std::f64::consts::LN_10;
const PI: f64 = std::f64::consts::PI;
const TAU: f64 = std::f64::consts::TAU;

/// Width-selected float opcodes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FloatOps {
    kind: ValueKind,
    add: IrOpcode,
    sub: IrOpcode,
    mul: IrOpcode,
    div: IrOpcode,
    neg: IrOpcode,
    cmp_lt: IrOpcode,
    cmp_le: IrOpcode,
    cmp_gt: IrOpcode,
    cmp_ge: IrOpcode,
    cmp_eq: IrOpcode,
    cmp_ne: IrOpcode,
    to_i64: IrOpcode,
    from_i64: IrOpcode,
}

fn float_ops(kind: ValueKind) -> FloatOps {
    use IrOpcode::*;
    if kind == ValueKind::Float32 {
        FloatOps {
            kind,
            add: AddF32,
            sub: SubF32,
            mul: MulF32,
            div: DivF32,
            neg: NegF32,
            cmp_lt: CmpLtF32,
            cmp_le: CmpLeF32,
            cmp_gt: CmpGtF32,
            cmp_ge: CmpGeF32,
            cmp_eq: CmpEqF32,
            cmp_ne: CmpNeF32,
            to_i64: ConvertF32ToI64,
            from_i64: ConvertI64ToF32,
        }
    } else {
        FloatOps {
            kind,
            add: AddF64,
            sub: SubF64,
            mul: MulF64,
            div: DivF64,
            neg: NegF64,
            cmp_lt: CmpLtF64,
            cmp_le: CmpLeF64,
            cmp_gt: CmpGtF64,
            cmp_ge: CmpGeF64,
            cmp_eq: CmpEqF64,
            cmp_ne: CmpNeF64,
            to_i64: ConvertF64ToI64,
            from_i64: ConvertI64ToF64,
        }
    }
}

impl FuncLowerer<'_, '_> {
    pub(crate) fn emit_math_builtin(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
    ) -> LowerResult<()> {
        if call.has_named_arguments() {
            return Err("named arguments not supported for builtin calls".to_string());
        }
        let combined = self.combined_math_kind(name, call, locals)?;
        match name {
            "min" | "max" => self.emit_min_max(name, call, locals, combined),
            "clamp" => self.emit_clamp(call, locals, combined),
            "abs" => self.emit_abs(call, locals, combined),
            "sign" => self.emit_sign(call, locals, combined),
            "saturate" => self.emit_saturate(call, locals, combined),
            "lerp" => self.emit_lerp(call, locals, combined),
            "pow" => self.emit_pow(call, locals, combined),
            "sqrt" | "cbrt" => self.emit_root(name, call, locals, combined),
            "exp" | "exp2" | "log" | "log2" | "log10" => {
                self.emit_exp_log(name, call, locals, combined)
            }
            "sin" | "cos" | "tan" => self.emit_trig(name, call, locals, combined),
            "asin" | "acos" | "atan" => self.emit_inverse_trig(name, call, locals, combined),
            "atan2" => self.emit_atan2(call, locals, combined),
            "sinh" | "cosh" | "tanh" => self.emit_hyperbolic(name, call, locals, combined),
            "asinh" | "acosh" | "atanh" => {
                self.emit_inverse_hyperbolic(name, call, locals, combined)
            }
            "floor" | "ceil" | "round" | "trunc" | "fract" => {
                self.emit_rounding(name, call, locals, combined)
            }
            "hypot" => self.emit_hypot(call, locals, combined),
            "fma" => self.emit_fma(call, locals, combined),
            "copysign" => self.emit_copysign(call, locals, combined),
            "radians" | "degrees" => self.emit_angle_scale(name, call, locals, combined),
            "is_nan" | "is_inf" | "is_finite" => self.emit_float_predicate(name, call, locals, combined),
            _ => Err(format!("unknown math builtin: {name}")),
        }
    }

    fn combined_math_kind(
        &self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
    ) -> LowerResult<ValueKind> {
        let mut kind = match call.args.first() {
            Some(arg) => self.ctx.infer_expr_kind(arg, locals),
            None => return Err(format!("argument count mismatch for builtin {name}")),
        };
        for arg in &call.args[1..] {
            kind = combine_numeric(kind, self.ctx.infer_expr_kind(arg, locals));
        }
        if kind == ValueKind::Bool || kind == ValueKind::String || kind == ValueKind::Unknown {
            return Err(format!("{name} requires numeric arguments of the same type"));
        }
        Ok(kind)
    }

    fn require_float(&self, name: &str, kind: ValueKind) -> LowerResult<FloatOps> {
        if !kind.is_float() {
            return Err(format!("{name} requires a floating-point operand"));
        }
        Ok(float_ops(kind))
    }

    /// Evaluate an argument into a fresh temp slot.
    fn arg_to_slot(&mut self, arg: &Expr, locals: &LocalMap) -> LowerResult<u32> {
        let slot = self.alloc_temp();
        self.emit_expr(arg, locals)?;
        self.store(slot);
        Ok(slot)
    }

    fn push_float_const(&mut self, ops: FloatOps, value: f64) {
        if ops.kind == ValueKind::Float32 {
            self.push_f32_const(value as f32);
        } else {
            self.push_f64_const(value);
        }
    }

    // ── compare-and-select families ───────────────────────────────────────

    fn select_cmp(&self, name: &str, kind: ValueKind) -> LowerResult<IrOpcode> {
        let builtin = if name == "min" { "less_than" } else { "greater_than" };
        self.compare_opcode(builtin, kind)
    }

    fn emit_min_max(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let cmp = self.select_cmp(name, kind)?;
        let left = self.arg_to_slot(&call.args[0], locals)?;
        let right = self.arg_to_slot(&call.args[1], locals)?;
        self.emit_select(left, right, cmp);
        Ok(())
    }

    /// Push `left` when `left cmp right`, else `right`.
    fn emit_select(&mut self, left: u32, right: u32, cmp: IrOpcode) {
        self.load(left);
        self.load(right);
        self.emit(cmp);
        let jump_other = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(left);
        let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_other);
        self.load(right);
        self.patch_jump_here(jump_end);
    }

    fn emit_clamp(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        // clamp(v, lo, hi) = max(lo, min(v, hi))
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let lo = self.arg_to_slot(&call.args[1], locals)?;
        let hi = self.arg_to_slot(&call.args[2], locals)?;
        let min_cmp = self.select_cmp("min", kind)?;
        let max_cmp = self.select_cmp("max", kind)?;
        let inner = self.alloc_temp();
        self.emit_select(value, hi, min_cmp);
        self.store(inner);
        self.emit_select(lo, inner, max_cmp);
        Ok(())
    }

    fn emit_abs(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        let value = self.arg_to_slot(&call.args[0], locals)?;
        if kind == ValueKind::UInt64 {
            self.load(value);
            return Ok(());
        }
        self.load(value);
        match kind {
            ValueKind::Int32 => {
                self.push_i32(0);
                self.emit(IrOpcode::CmpLtI32);
            }
            ValueKind::Int64 => {
                self.push_i64(0);
                self.emit(IrOpcode::CmpLtI64);
            }
            _ => {
                let ops = float_ops(kind);
                self.push_float_const(ops, 0.0);
                self.emit(ops.cmp_lt);
            }
        }
        let jump_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(value);
        self.emit(match kind {
            ValueKind::Int32 => IrOpcode::NegI32,
            ValueKind::Int64 => IrOpcode::NegI64,
            ValueKind::Float32 => IrOpcode::NegF32,
            _ => IrOpcode::NegF64,
        });
        let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_positive);
        self.load(value);
        self.patch_jump_here(jump_end);
        Ok(())
    }

    fn emit_sign(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let push_unit = |lowerer: &mut Self, unit: i64| match kind {
            ValueKind::Int32 => lowerer.push_i32(unit as i32),
            ValueKind::Int64 | ValueKind::UInt64 => lowerer.push_i64(unit),
            other => {
                let ops = float_ops(other);
                lowerer.push_float_const(ops, unit as f64);
            }
        };
        if kind == ValueKind::UInt64 {
            // Unsigned sign is 0 or 1.
            self.load(value);
            self.push_i64(0);
            self.emit(IrOpcode::CmpNeI64);
            let jump_zero = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            push_unit(self, 1);
            let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
            self.patch_jump_here(jump_zero);
            push_unit(self, 0);
            self.patch_jump_here(jump_end);
            return Ok(());
        }
        let (cmp_gt, cmp_lt) = match kind {
            ValueKind::Int32 => (IrOpcode::CmpGtI32, IrOpcode::CmpLtI32),
            ValueKind::Int64 => (IrOpcode::CmpGtI64, IrOpcode::CmpLtI64),
            other => {
                let ops = float_ops(other);
                (ops.cmp_gt, ops.cmp_lt)
            }
        };
        let push_zero = |lowerer: &mut Self| match kind {
            ValueKind::Int32 => lowerer.push_i32(0),
            ValueKind::Int64 => lowerer.push_i64(0),
            other => {
                let ops = float_ops(other);
                lowerer.push_float_const(ops, 0.0);
            }
        };

        self.load(value);
        push_zero(self);
        self.emit(cmp_gt);
        let jump_not_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        push_unit(self, 1);
        let jump_end_a = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_not_positive);
        self.load(value);
        push_zero(self);
        self.emit(cmp_lt);
        let jump_zero = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        push_unit(self, -1);
        let jump_end_b = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_zero);
        push_unit(self, 0);
        self.patch_jump_here(jump_end_a);
        self.patch_jump_here(jump_end_b);
        Ok(())
    }

    fn emit_saturate(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        let ops = self.require_float("saturate", kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let zero = self.alloc_temp();
        self.push_float_const(ops, 0.0);
        self.store(zero);
        let one = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.store(one);
        let inner = self.alloc_temp();
        self.emit_select(value, one, ops.cmp_lt);
        self.store(inner);
        self.emit_select(zero, inner, ops.cmp_gt);
        Ok(())
    }

    fn emit_lerp(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        // lerp(a, b, t) = a + (b - a) * t
        let a = self.arg_to_slot(&call.args[0], locals)?;
        let b = self.arg_to_slot(&call.args[1], locals)?;
        let t = self.arg_to_slot(&call.args[2], locals)?;
        let sub = self.arith_opcode("minus", kind)?;
        let mul = self.arith_opcode("multiply", kind)?;
        let add = self.arith_opcode("plus", kind)?;
        self.load(a);
        self.load(b);
        self.load(a);
        self.emit(sub);
        self.load(t);
        self.emit(mul);
        self.emit(add);
        Ok(())
    }

    // ── pow ───────────────────────────────────────────────────────────────

    fn emit_pow(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        if kind.is_float() {
            return self.emit_pow_float(call, locals, float_ops(kind));
        }
        let base = self.arg_to_slot(&call.args[0], locals)?;
        let exponent = self.arg_to_slot(&call.args[1], locals)?;
        let out = self.alloc_temp();

        if kind != ValueKind::UInt64 {
            self.load(exponent);
            self.push_int_const(kind, 0);
            self.emit(if kind == ValueKind::Int32 {
                IrOpcode::CmpLtI32
            } else {
                IrOpcode::CmpLtI64
            });
            let jump_ok = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
            self.emit_guard_failure("pow exponent must be non-negative");
            self.patch_jump_here(jump_ok);
        }

        self.push_int_const(kind, 1);
        self.store(out);
        let mul = self.arith_opcode("multiply", kind)?;
        let loop_start = self.here();
        self.load(exponent);
        self.push_int_const(kind, 0);
        self.emit(match kind {
            ValueKind::Int32 => IrOpcode::CmpGtI32,
            ValueKind::Int64 => IrOpcode::CmpGtI64,
            _ => IrOpcode::CmpNeI64,
        });
        let jump_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(out);
        self.load(base);
        self.emit(mul);
        self.store(out);
        self.load(exponent);
        self.push_int_const(kind, 1);
        self.emit(if kind == ValueKind::Int32 { IrOpcode::SubI32 } else { IrOpcode::SubI64 });
        self.store(exponent);
        self.emit_imm(IrOpcode::Jump, loop_start as u64);
        self.patch_jump_here(jump_done);
        self.load(out);
        Ok(())
    }

    fn emit_pow_float(&mut self, call: &Call, locals: &LocalMap, ops: FloatOps) -> LowerResult<()> {
        let base = self.arg_to_slot(&call.args[0], locals)?;
        let exponent = self.arg_to_slot(&call.args[1], locals)?;
        let out = self.alloc_temp();

        // base < 0 -> NaN
        self.load(base);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_non_negative = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_nan(ops);
        self.store(out);
        let jump_end_nan = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_non_negative);

        // base == 0 -> 1, +inf, or 0 depending on the exponent sign
        self.load(base);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_regular = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        self.load(exponent);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_exp_nonzero = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, 1.0);
        self.store(out);
        let jump_end_one = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_exp_nonzero);

        self.load(exponent);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_exp_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, 1.0);
        self.push_float_const(ops, 0.0);
        self.emit(ops.div);
        self.store(out);
        let jump_end_inf = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_exp_positive);
        self.push_float_const(ops, 0.0);
        self.store(out);
        let jump_end_zero = self.emit_jump_placeholder(IrOpcode::Jump);

        // regular path: exp(e * log(b))
        self.patch_jump_here(jump_regular);
        let log_out = self.alloc_temp();
        self.emit_log_core(ops, base, log_out)?;
        let scaled = self.alloc_temp();
        self.load(exponent);
        self.load(log_out);
        self.emit(ops.mul);
        self.store(scaled);
        self.emit_exp_core(ops, scaled, out)?;

        self.patch_jump_here(jump_end_nan);
        self.patch_jump_here(jump_end_one);
        self.patch_jump_here(jump_end_inf);
        self.patch_jump_here(jump_end_zero);
        self.load(out);
        Ok(())
    }

    // ── roots ─────────────────────────────────────────────────────────────

    fn emit_root(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let out = self.alloc_temp();
        if name == "sqrt" {
            self.emit_sqrt_core(ops, value, out)?;
        } else {
            self.emit_cbrt_core(ops, value, out)?;
        }
        self.load(out);
        Ok(())
    }

    /// Newton iteration after power-of-four range reduction; negative
    /// inputs produce NaN.
    fn emit_sqrt_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        self.load(value);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_non_negative = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_nan(ops);
        self.store(out);
        let jump_end_nan = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_non_negative);

        self.load(value);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_nonzero = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, 0.0);
        self.store(out);
        let jump_end_zero = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_nonzero);

        // m in [1, 4), scale holds sqrt of the removed factor.
        let m = self.alloc_temp();
        let scale = self.alloc_temp();
        self.load(value);
        self.store(m);
        self.push_float_const(ops, 1.0);
        self.store(scale);

        let shrink_start = self.here();
        self.load(m);
        self.push_float_const(ops, 4.0);
        self.emit(ops.cmp_ge);
        let jump_shrunk = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(m);
        self.push_float_const(ops, 0.25);
        self.emit(ops.mul);
        self.store(m);
        self.load(scale);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.store(scale);
        self.emit_imm(IrOpcode::Jump, shrink_start as u64);
        self.patch_jump_here(jump_shrunk);

        let grow_start = self.here();
        self.load(m);
        self.push_float_const(ops, 1.0);
        self.emit(ops.cmp_lt);
        let jump_grown = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(m);
        self.push_float_const(ops, 4.0);
        self.emit(ops.mul);
        self.store(m);
        self.load(scale);
        self.push_float_const(ops, 0.5);
        self.emit(ops.mul);
        self.store(scale);
        self.emit_imm(IrOpcode::Jump, grow_start as u64);
        self.patch_jump_here(jump_grown);

        // y = (1 + m) / 2, then y = (y + m/y) / 2
        let y = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.load(m);
        self.emit(ops.add);
        self.push_float_const(ops, 0.5);
        self.emit(ops.mul);
        self.store(y);
        let iterations = if ops.kind == ValueKind::Float32 { 6 } else { 8 };
        for _ in 0..iterations {
            self.load(y);
            self.load(m);
            self.load(y);
            self.emit(ops.div);
            self.emit(ops.add);
            self.push_float_const(ops, 0.5);
            self.emit(ops.mul);
            self.store(y);
        }
        self.load(y);
        self.load(scale);
        self.emit(ops.mul);
        self.store(out);

        self.patch_jump_here(jump_end_nan);
        self.patch_jump_here(jump_end_zero);
        Ok(())
    }

    fn emit_cbrt_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        // cbrt(-x) = -cbrt(x): strip the sign first.
        let magnitude = self.alloc_temp();
        let sign = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.store(sign);
        self.load(value);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, -1.0);
        self.store(sign);
        self.load(value);
        self.emit(ops.neg);
        self.store(magnitude);
        let jump_stored = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_positive);
        self.load(value);
        self.store(magnitude);
        self.patch_jump_here(jump_stored);

        self.load(magnitude);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_nonzero = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, 0.0);
        self.store(out);
        let jump_end_zero = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_nonzero);

        let m = self.alloc_temp();
        let scale = self.alloc_temp();
        self.load(magnitude);
        self.store(m);
        self.push_float_const(ops, 1.0);
        self.store(scale);

        let shrink_start = self.here();
        self.load(m);
        self.push_float_const(ops, 8.0);
        self.emit(ops.cmp_ge);
        let jump_shrunk = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(m);
        self.push_float_const(ops, 0.125);
        self.emit(ops.mul);
        self.store(m);
        self.load(scale);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.store(scale);
        self.emit_imm(IrOpcode::Jump, shrink_start as u64);
        self.patch_jump_here(jump_shrunk);

        let grow_start = self.here();
        self.load(m);
        self.push_float_const(ops, 1.0);
        self.emit(ops.cmp_lt);
        let jump_grown = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(m);
        self.push_float_const(ops, 8.0);
        self.emit(ops.mul);
        self.store(m);
        self.load(scale);
        self.push_float_const(ops, 0.5);
        self.emit(ops.mul);
        self.store(scale);
        self.emit_imm(IrOpcode::Jump, grow_start as u64);
        self.patch_jump_here(jump_grown);

        // y = (2y + m/y^2) / 3
        let y = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.load(m);
        self.emit(ops.add);
        self.push_float_const(ops, 0.5);
        self.emit(ops.mul);
        self.store(y);
        let iterations = if ops.kind == ValueKind::Float32 { 7 } else { 9 };
        for _ in 0..iterations {
            self.push_float_const(ops, 2.0);
            self.load(y);
            self.emit(ops.mul);
            self.load(m);
            self.load(y);
            self.load(y);
            self.emit(ops.mul);
            self.emit(ops.div);
            self.emit(ops.add);
            self.push_float_const(ops, 1.0 / 3.0);
            self.emit(ops.mul);
            self.store(y);
        }
        self.load(y);
        self.load(scale);
        self.emit(ops.mul);
        self.load(sign);
        self.emit(ops.mul);
        self.store(out);
        self.patch_jump_here(jump_end_zero);
        Ok(())
    }

    // ── exp / log family ──────────────────────────────────────────────────

    fn emit_exp_log(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let out = self.alloc_temp();
        match name {
            "exp" => self.emit_exp_core(ops, value, out)?,
            "exp2" => {
                let scaled = self.alloc_temp();
                self.load(value);
                self.push_float_const(ops, LN2);
                self.emit(ops.mul);
                self.store(scaled);
                self.emit_exp_core(ops, scaled, out)?;
            }
            "log" | "log2" | "log10" => {
                self.emit_log_guarded(ops, value, out)?;
                if name != "log" {
                    let divisor = if name == "log2" { LN2 } else { LN10 };
                    self.load(out);
                    self.push_float_const(ops, divisor);
                    self.emit(ops.div);
                    self.store(out);
                }
            }
            _ => unreachable!("exp/log family"),
        }
        self.load(out);
        Ok(())
    }

    /// exp(x): split off k = trunc(x / ln2), run the Taylor series on the
    /// remainder, and scale by 2^k with a counted loop.
    fn emit_exp_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        let k = self.alloc_temp();
        self.load(value);
        self.push_float_const(ops, LN2);
        self.emit(ops.div);
        self.emit(ops.to_i64);
        self.store(k);

        let r = self.alloc_temp();
        self.load(value);
        self.load(k);
        self.emit(ops.from_i64);
        self.push_float_const(ops, LN2);
        self.emit(ops.mul);
        self.emit(ops.sub);
        self.store(r);

        // term = 1; sum = 1; counter = 1
        let term = self.alloc_temp();
        let sum = self.alloc_temp();
        let counter = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.store(term);
        self.push_float_const(ops, 1.0);
        self.store(sum);
        self.push_float_const(ops, 1.0);
        self.store(counter);

        let iterations = if ops.kind == ValueKind::Float32 { 10.0 } else { 14.0 };
        let loop_start = self.here();
        self.load(counter);
        self.push_float_const(ops, iterations + 0.5);
        self.emit(ops.cmp_lt);
        let jump_series_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        self.load(term);
        self.load(r);
        self.emit(ops.mul);
        self.load(counter);
        self.emit(ops.div);
        self.store(term);

        self.load(sum);
        self.load(term);
        self.emit(ops.add);
        self.store(sum);

        self.load(counter);
        self.push_float_const(ops, 1.0);
        self.emit(ops.add);
        self.store(counter);
        self.emit_imm(IrOpcode::Jump, loop_start as u64);
        self.patch_jump_here(jump_series_done);

        // scale by 2^k
        let scale = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.store(scale);

        let up_start = self.here();
        self.load(k);
        self.push_i64(0);
        self.emit(IrOpcode::CmpGtI64);
        let jump_up_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(scale);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.store(scale);
        self.load(k);
        self.push_i64(1);
        self.emit(IrOpcode::SubI64);
        self.store(k);
        self.emit_imm(IrOpcode::Jump, up_start as u64);
        self.patch_jump_here(jump_up_done);

        let down_start = self.here();
        self.load(k);
        self.push_i64(0);
        self.emit(IrOpcode::CmpLtI64);
        let jump_down_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(scale);
        self.push_float_const(ops, 0.5);
        self.emit(ops.mul);
        self.store(scale);
        self.load(k);
        self.push_i64(1);
        self.emit(IrOpcode::AddI64);
        self.store(k);
        self.emit_imm(IrOpcode::Jump, down_start as u64);
        self.patch_jump_here(jump_down_done);

        self.load(sum);
        self.load(scale);
        self.emit(ops.mul);
        self.store(out);
        Ok(())
    }

    /// log(x) with domain guards: x < 0 -> NaN, x == 0 -> -inf.
    fn emit_log_guarded(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        self.load(value);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_non_negative = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_nan(ops);
        self.store(out);
        let jump_end_nan = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_non_negative);

        self.load(value);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, -1.0);
        self.push_float_const(ops, 0.0);
        self.emit(ops.div);
        self.store(out);
        let jump_end_inf = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_positive);

        self.emit_log_core(ops, value, out)?;
        self.patch_jump_here(jump_end_nan);
        self.patch_jump_here(jump_end_inf);
        Ok(())
    }

    /// log(x) for x > 0: normalize into [1, 2) by powers of two, then the
    /// atanh series on (m-1)/(m+1).
    fn emit_log_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        let m = self.alloc_temp();
        let k = self.alloc_temp();
        self.load(value);
        self.store(m);
        self.push_i64(0);
        self.store(k);

        let shrink_start = self.here();
        self.load(m);
        self.push_float_const(ops, 2.0);
        self.emit(ops.cmp_ge);
        let jump_shrunk = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(m);
        self.push_float_const(ops, 0.5);
        self.emit(ops.mul);
        self.store(m);
        self.load(k);
        self.push_i64(1);
        self.emit(IrOpcode::AddI64);
        self.store(k);
        self.emit_imm(IrOpcode::Jump, shrink_start as u64);
        self.patch_jump_here(jump_shrunk);

        let grow_start = self.here();
        self.load(m);
        self.push_float_const(ops, 1.0);
        self.emit(ops.cmp_lt);
        let jump_grown = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(m);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.store(m);
        self.load(k);
        self.push_i64(1);
        self.emit(IrOpcode::SubI64);
        self.store(k);
        self.emit_imm(IrOpcode::Jump, grow_start as u64);
        self.patch_jump_here(jump_grown);

        // t = (m - 1) / (m + 1); sum over t^(2n+1) / (2n+1)
        let t = self.alloc_temp();
        self.load(m);
        self.push_float_const(ops, 1.0);
        self.emit(ops.sub);
        self.load(m);
        self.push_float_const(ops, 1.0);
        self.emit(ops.add);
        self.emit(ops.div);
        self.store(t);

        let t2 = self.alloc_temp();
        self.load(t);
        self.load(t);
        self.emit(ops.mul);
        self.store(t2);

        let term = self.alloc_temp();
        let sum = self.alloc_temp();
        let denom = self.alloc_temp();
        self.load(t);
        self.store(term);
        self.push_float_const(ops, 0.0);
        self.store(sum);
        self.push_float_const(ops, 1.0);
        self.store(denom);

        let iterations = if ops.kind == ValueKind::Float32 { 12.0 } else { 20.0 };
        let series_start = self.here();
        self.load(denom);
        self.push_float_const(ops, iterations * 2.0);
        self.emit(ops.cmp_lt);
        let jump_series_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        self.load(sum);
        self.load(term);
        self.load(denom);
        self.emit(ops.div);
        self.emit(ops.add);
        self.store(sum);

        self.load(term);
        self.load(t2);
        self.emit(ops.mul);
        self.store(term);

        self.load(denom);
        self.push_float_const(ops, 2.0);
        self.emit(ops.add);
        self.store(denom);
        self.emit_imm(IrOpcode::Jump, series_start as u64);
        self.patch_jump_here(jump_series_done);

        self.push_float_const(ops, 2.0);
        self.load(sum);
        self.emit(ops.mul);
        self.load(k);
        self.emit(ops.from_i64);
        self.push_float_const(ops, LN2);
        self.emit(ops.mul);
        self.emit(ops.add);
        self.store(out);
        Ok(())
    }

    // ── trig ──────────────────────────────────────────────────────────────

    fn emit_trig(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let out = self.alloc_temp();
        match name {
            "sin" => self.emit_sin_core(ops, value, out)?,
            "cos" => self.emit_cos_core(ops, value, out)?,
            _ => {
                let sin_out = self.alloc_temp();
                let cos_out = self.alloc_temp();
                self.emit_sin_core(ops, value, sin_out)?;
                self.emit_cos_core(ops, value, cos_out)?;
                self.load(sin_out);
                self.load(cos_out);
                self.emit(ops.div);
                self.store(out);
            }
        }
        self.load(out);
        Ok(())
    }

    /// r = x - tau * round(x / tau), landing in [-pi, pi].
    fn emit_trig_reduce(&mut self, ops: FloatOps, value: u32) -> LowerResult<u32> {
        let r = self.alloc_temp();
        let q = self.alloc_temp();
        self.load(value);
        self.push_float_const(ops, TAU);
        self.emit(ops.div);
        self.store(q);

        // round(q) = trunc(q + 0.5) for q >= 0, trunc(q - 0.5) otherwise
        let rounded = self.alloc_temp();
        self.load(q);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(q);
        self.push_float_const(ops, 0.5);
        self.emit(ops.sub);
        self.emit(ops.to_i64);
        self.emit(ops.from_i64);
        self.store(rounded);
        let jump_done = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_positive);
        self.load(q);
        self.push_float_const(ops, 0.5);
        self.emit(ops.add);
        self.emit(ops.to_i64);
        self.emit(ops.from_i64);
        self.store(rounded);
        self.patch_jump_here(jump_done);

        self.load(value);
        self.load(rounded);
        self.push_float_const(ops, TAU);
        self.emit(ops.mul);
        self.emit(ops.sub);
        self.store(r);
        Ok(r)
    }

    fn emit_sin_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        let r = self.emit_trig_reduce(ops, value)?;
        let r2 = self.alloc_temp();
        self.load(r);
        self.load(r);
        self.emit(ops.mul);
        self.store(r2);

        let term = self.alloc_temp();
        let sum = self.alloc_temp();
        let counter = self.alloc_temp();
        self.load(r);
        self.store(term);
        self.load(r);
        self.store(sum);
        self.push_float_const(ops, 1.0);
        self.store(counter);

        let iterations = if ops.kind == ValueKind::Float32 { 8.0 } else { 11.0 };
        let loop_start = self.here();
        self.load(counter);
        self.push_float_const(ops, iterations + 0.5);
        self.emit(ops.cmp_lt);
        let jump_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        // term *= -r^2 / ((2c) * (2c + 1))
        self.load(term);
        self.load(r2);
        self.emit(ops.neg);
        self.emit(ops.mul);
        self.load(counter);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.load(counter);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.push_float_const(ops, 1.0);
        self.emit(ops.add);
        self.emit(ops.mul);
        self.emit(ops.div);
        self.store(term);

        self.load(sum);
        self.load(term);
        self.emit(ops.add);
        self.store(sum);

        self.load(counter);
        self.push_float_const(ops, 1.0);
        self.emit(ops.add);
        self.store(counter);
        self.emit_imm(IrOpcode::Jump, loop_start as u64);
        self.patch_jump_here(jump_done);

        self.load(sum);
        self.store(out);
        Ok(())
    }

    fn emit_cos_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        let r = self.emit_trig_reduce(ops, value)?;
        let r2 = self.alloc_temp();
        self.load(r);
        self.load(r);
        self.emit(ops.mul);
        self.store(r2);

        let term = self.alloc_temp();
        let sum = self.alloc_temp();
        let counter = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.store(term);
        self.push_float_const(ops, 1.0);
        self.store(sum);
        self.push_float_const(ops, 1.0);
        self.store(counter);

        let iterations = if ops.kind == ValueKind::Float32 { 8.0 } else { 11.0 };
        let loop_start = self.here();
        self.load(counter);
        self.push_float_const(ops, iterations + 0.5);
        self.emit(ops.cmp_lt);
        let jump_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        // term *= -r^2 / ((2c - 1) * (2c))
        self.load(term);
        self.load(r2);
        self.emit(ops.neg);
        self.emit(ops.mul);
        self.load(counter);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.push_float_const(ops, 1.0);
        self.emit(ops.sub);
        self.load(counter);
        self.push_float_const(ops, 2.0);
        self.emit(ops.mul);
        self.emit(ops.mul);
        self.emit(ops.div);
        self.store(term);

        self.load(sum);
        self.load(term);
        self.emit(ops.add);
        self.store(sum);

        self.load(counter);
        self.push_float_const(ops, 1.0);
        self.emit(ops.add);
        self.store(counter);
        self.emit_imm(IrOpcode::Jump, loop_start as u64);
        self.patch_jump_here(jump_done);

        self.load(sum);
        self.store(out);
        Ok(())
    }

    // ── inverse trig ──────────────────────────────────────────────────────

    fn emit_inverse_trig(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let out = self.alloc_temp();
        match name {
            "atan" => self.emit_atan_core(ops, value, out)?,
            "asin" => self.emit_asin_core(ops, value, out)?,
            "acos" => {
                let asin_out = self.alloc_temp();
                self.emit_asin_core(ops, value, asin_out)?;
                self.push_float_const(ops, PI / 2.0);
                self.load(asin_out);
                self.emit(ops.sub);
                self.store(out);
            }
            _ => unreachable!("inverse trig"),
        }
        self.load(out);
        Ok(())
    }

    /// atan via two argument-halving steps then the odd series; |x| > 1
    /// reduces through atan(x) = sign(x) * pi/2 - atan(1/x).
    fn emit_atan_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        // |x| > 1: compute on the reciprocal and fold back.
        let reduced = self.alloc_temp();
        let fold = self.alloc_temp();

        self.load(value);
        self.push_float_const(ops, 1.0);
        self.emit(ops.cmp_gt);
        let jump_not_big = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, 1.0);
        self.load(value);
        self.emit(ops.div);
        self.store(reduced);
        self.push_float_const(ops, 1.0);
        self.store(fold);
        let jump_selected_a = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_not_big);

        self.load(value);
        self.push_float_const(ops, -1.0);
        self.emit(ops.cmp_lt);
        let jump_not_small = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, 1.0);
        self.load(value);
        self.emit(ops.div);
        self.store(reduced);
        self.push_float_const(ops, -1.0);
        self.store(fold);
        let jump_selected_b = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_not_small);

        self.load(value);
        self.store(reduced);
        self.push_float_const(ops, 0.0);
        self.store(fold);
        self.patch_jump_here(jump_selected_a);
        self.patch_jump_here(jump_selected_b);

        // Two halvings: t = t / (1 + sqrt(1 + t^2))
        let halvings = 2;
        for _ in 0..halvings {
            let squared = self.alloc_temp();
            self.load(reduced);
            self.load(reduced);
            self.emit(ops.mul);
            self.push_float_const(ops, 1.0);
            self.emit(ops.add);
            self.store(squared);
            let root = self.alloc_temp();
            self.emit_sqrt_core(ops, squared, root)?;
            self.load(reduced);
            self.push_float_const(ops, 1.0);
            self.load(root);
            self.emit(ops.add);
            self.emit(ops.div);
            self.store(reduced);
        }

        // Odd series: t - t^3/3 + t^5/5 - ...
        let t2 = self.alloc_temp();
        self.load(reduced);
        self.load(reduced);
        self.emit(ops.mul);
        self.emit(ops.neg);
        self.store(t2);

        let term = self.alloc_temp();
        let sum = self.alloc_temp();
        let denom = self.alloc_temp();
        self.load(reduced);
        self.store(term);
        self.push_float_const(ops, 0.0);
        self.store(sum);
        self.push_float_const(ops, 1.0);
        self.store(denom);

        let iterations = if ops.kind == ValueKind::Float32 { 8.0 } else { 12.0 };
        let series_start = self.here();
        self.load(denom);
        self.push_float_const(ops, iterations * 2.0);
        self.emit(ops.cmp_lt);
        let jump_series_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(sum);
        self.load(term);
        self.load(denom);
        self.emit(ops.div);
        self.emit(ops.add);
        self.store(sum);
        self.load(term);
        self.load(t2);
        self.emit(ops.mul);
        self.store(term);
        self.load(denom);
        self.push_float_const(ops, 2.0);
        self.emit(ops.add);
        self.store(denom);
        self.emit_imm(IrOpcode::Jump, series_start as u64);
        self.patch_jump_here(jump_series_done);

        // Undo the halvings, then the reciprocal fold.
        let quarter = self.alloc_temp();
        self.push_float_const(ops, 4.0);
        self.load(sum);
        self.emit(ops.mul);
        self.store(quarter);

        self.load(fold);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_folded = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(quarter);
        self.store(out);
        let jump_end_plain = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_folded);
        self.load(fold);
        self.push_float_const(ops, PI / 2.0);
        self.emit(ops.mul);
        self.load(quarter);
        self.emit(ops.sub);
        self.store(out);
        self.patch_jump_here(jump_end_plain);
        Ok(())
    }

    /// asin(x) = atan(x / sqrt(1 - x^2)); |x| == 1 folds to +-pi/2 and
    /// |x| > 1 is NaN.
    fn emit_asin_core(&mut self, ops: FloatOps, value: u32, out: u32) -> LowerResult<()> {
        let squared = self.alloc_temp();
        self.push_float_const(ops, 1.0);
        self.load(value);
        self.load(value);
        self.emit(ops.mul);
        self.emit(ops.sub);
        self.store(squared);

        self.load(squared);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_in_domain = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.emit_nan(ops);
        self.store(out);
        let jump_end_nan = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_in_domain);

        self.load(squared);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_interior = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        // x is exactly +-1
        self.load(value);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_positive_one = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, -PI / 2.0);
        self.store(out);
        let jump_end_neg = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_positive_one);
        self.push_float_const(ops, PI / 2.0);
        self.store(out);
        let jump_end_pos = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_interior);

        let root = self.alloc_temp();
        self.emit_sqrt_core(ops, squared, root)?;
        let ratio = self.alloc_temp();
        self.load(value);
        self.load(root);
        self.emit(ops.div);
        self.store(ratio);
        self.emit_atan_core(ops, ratio, out)?;

        self.patch_jump_here(jump_end_nan);
        self.patch_jump_here(jump_end_neg);
        self.patch_jump_here(jump_end_pos);
        Ok(())
    }

    fn emit_atan2(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        let ops = self.require_float("atan2", kind)?;
        let y = self.arg_to_slot(&call.args[0], locals)?;
        let x = self.arg_to_slot(&call.args[1], locals)?;
        let out = self.alloc_temp();

        // x == 0: +-pi/2 by the sign of y (0 when both are zero).
        self.load(x);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_eq);
        let jump_x_nonzero = self.emit_jump_placeholder(IrOpcode::JumpIfZero);

        self.load(y);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_gt);
        let jump_y_not_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, PI / 2.0);
        self.store(out);
        let jump_end_a = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_y_not_positive);
        self.load(y);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_y_zero = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.push_float_const(ops, -PI / 2.0);
        self.store(out);
        let jump_end_b = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_y_zero);
        self.push_float_const(ops, 0.0);
        self.store(out);
        let jump_end_c = self.emit_jump_placeholder(IrOpcode::Jump);

        self.patch_jump_here(jump_x_nonzero);
        let ratio = self.alloc_temp();
        self.load(y);
        self.load(x);
        self.emit(ops.div);
        self.store(ratio);
        let base = self.alloc_temp();
        self.emit_atan_core(ops, ratio, base)?;

        // x > 0: result is atan(y/x); x < 0: fold by +-pi.
        self.load(x);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_gt);
        let jump_left_half = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(base);
        self.store(out);
        let jump_end_d = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_left_half);
        self.load(y);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_y_non_negative = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(base);
        self.push_float_const(ops, PI);
        self.emit(ops.sub);
        self.store(out);
        let jump_end_e = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_y_non_negative);
        self.load(base);
        self.push_float_const(ops, PI);
        self.emit(ops.add);
        self.store(out);

        self.patch_jump_here(jump_end_a);
        self.patch_jump_here(jump_end_b);
        self.patch_jump_here(jump_end_c);
        self.patch_jump_here(jump_end_d);
        self.patch_jump_here(jump_end_e);
        self.load(out);
        Ok(())
    }

    // ── hyperbolic ────────────────────────────────────────────────────────

    fn emit_hyperbolic(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let out = self.alloc_temp();

        match name {
            "sinh" | "cosh" => {
                let pos = self.alloc_temp();
                self.emit_exp_core(ops, value, pos)?;
                let negated = self.alloc_temp();
                self.load(value);
                self.emit(ops.neg);
                self.store(negated);
                let neg = self.alloc_temp();
                self.emit_exp_core(ops, negated, neg)?;
                self.load(pos);
                self.load(neg);
                self.emit(if name == "sinh" { ops.sub } else { ops.add });
                self.push_float_const(ops, 0.5);
                self.emit(ops.mul);
                self.store(out);
            }
            "tanh" => {
                // tanh(x) = (e^(2x) - 1) / (e^(2x) + 1)
                let doubled = self.alloc_temp();
                self.load(value);
                self.push_float_const(ops, 2.0);
                self.emit(ops.mul);
                self.store(doubled);
                let e2x = self.alloc_temp();
                self.emit_exp_core(ops, doubled, e2x)?;
                self.load(e2x);
                self.push_float_const(ops, 1.0);
                self.emit(ops.sub);
                self.load(e2x);
                self.push_float_const(ops, 1.0);
                self.emit(ops.add);
                self.emit(ops.div);
                self.store(out);
            }
            _ => unreachable!("hyperbolic"),
        }
        self.load(out);
        Ok(())
    }

    fn emit_inverse_hyperbolic(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let out = self.alloc_temp();

        match name {
            "asinh" => {
                // log(x + sqrt(x^2 + 1))
                let squared = self.alloc_temp();
                self.load(value);
                self.load(value);
                self.emit(ops.mul);
                self.push_float_const(ops, 1.0);
                self.emit(ops.add);
                self.store(squared);
                let root = self.alloc_temp();
                self.emit_sqrt_core(ops, squared, root)?;
                let shifted = self.alloc_temp();
                self.load(value);
                self.load(root);
                self.emit(ops.add);
                self.store(shifted);
                self.emit_log_core(ops, shifted, out)?;
            }
            "acosh" => {
                // x < 1 -> NaN; log(x + sqrt(x^2 - 1))
                self.load(value);
                self.push_float_const(ops, 1.0);
                self.emit(ops.cmp_lt);
                let jump_in_domain = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
                self.emit_nan(ops);
                self.store(out);
                let jump_end_nan = self.emit_jump_placeholder(IrOpcode::Jump);
                self.patch_jump_here(jump_in_domain);
                let squared = self.alloc_temp();
                self.load(value);
                self.load(value);
                self.emit(ops.mul);
                self.push_float_const(ops, 1.0);
                self.emit(ops.sub);
                self.store(squared);
                let root = self.alloc_temp();
                self.emit_sqrt_core(ops, squared, root)?;
                let shifted = self.alloc_temp();
                self.load(value);
                self.load(root);
                self.emit(ops.add);
                self.store(shifted);
                self.emit_log_guarded(ops, shifted, out)?;
                self.patch_jump_here(jump_end_nan);
            }
            "atanh" => {
                // 0.5 * log((1 + x) / (1 - x)); |x| >= 1 diverges.
                let ratio = self.alloc_temp();
                self.push_float_const(ops, 1.0);
                self.load(value);
                self.emit(ops.add);
                self.push_float_const(ops, 1.0);
                self.load(value);
                self.emit(ops.sub);
                self.emit(ops.div);
                self.store(ratio);
                self.emit_log_guarded(ops, ratio, out)?;
                self.load(out);
                self.push_float_const(ops, 0.5);
                self.emit(ops.mul);
                self.store(out);
            }
            _ => unreachable!("inverse hyperbolic"),
        }
        self.load(out);
        Ok(())
    }

    // ── rounding ──────────────────────────────────────────────────────────

    fn emit_rounding(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        if kind.is_integer() {
            // Integer inputs pass through; fract of an integer is zero.
            if name == "fract" {
                self.push_int_const(kind, 0);
                return Ok(());
            }
            self.emit_expr(&call.args[0], locals)?;
            return Ok(());
        }
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        let out = self.alloc_temp();
        match name {
            "trunc" => {
                self.load(value);
                self.emit(ops.to_i64);
                self.emit(ops.from_i64);
                self.store(out);
            }
            "floor" => self.emit_floor_core(ops, value, out),
            "ceil" => {
                // ceil(x) = -floor(-x)
                let negated = self.alloc_temp();
                self.load(value);
                self.emit(ops.neg);
                self.store(negated);
                self.emit_floor_core(ops, negated, out);
                self.load(out);
                self.emit(ops.neg);
                self.store(out);
            }
            "round" => {
                // Half away from zero: trunc(x +- 0.5).
                self.load(value);
                self.push_float_const(ops, 0.0);
                self.emit(ops.cmp_lt);
                let jump_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
                self.load(value);
                self.push_float_const(ops, 0.5);
                self.emit(ops.sub);
                self.emit(ops.to_i64);
                self.emit(ops.from_i64);
                self.store(out);
                let jump_done = self.emit_jump_placeholder(IrOpcode::Jump);
                self.patch_jump_here(jump_positive);
                self.load(value);
                self.push_float_const(ops, 0.5);
                self.emit(ops.add);
                self.emit(ops.to_i64);
                self.emit(ops.from_i64);
                self.store(out);
                self.patch_jump_here(jump_done);
            }
            "fract" => {
                let floored = self.alloc_temp();
                self.emit_floor_core(ops, value, floored);
                self.load(value);
                self.load(floored);
                self.emit(ops.sub);
                self.store(out);
            }
            _ => unreachable!("rounding family"),
        }
        self.load(out);
        Ok(())
    }

    /// floor(x): trunc, minus one when x is negative with a fraction.
    fn emit_floor_core(&mut self, ops: FloatOps, value: u32, out: u32) {
        self.load(value);
        self.emit(ops.to_i64);
        self.emit(ops.from_i64);
        self.store(out);
        self.load(value);
        self.load(out);
        self.emit(ops.cmp_lt);
        let jump_done = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(out);
        self.push_float_const(ops, 1.0);
        self.emit(ops.sub);
        self.store(out);
        self.patch_jump_here(jump_done);
    }

    // ── remaining helpers ─────────────────────────────────────────────────

    fn emit_hypot(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        let ops = self.require_float("hypot", kind)?;
        let x = self.arg_to_slot(&call.args[0], locals)?;
        let y = self.arg_to_slot(&call.args[1], locals)?;
        let squared = self.alloc_temp();
        self.load(x);
        self.load(x);
        self.emit(ops.mul);
        self.load(y);
        self.load(y);
        self.emit(ops.mul);
        self.emit(ops.add);
        self.store(squared);
        let out = self.alloc_temp();
        self.emit_sqrt_core(ops, squared, out)?;
        self.load(out);
        Ok(())
    }

    fn emit_fma(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        let ops = self.require_float("fma", kind)?;
        self.emit_expr(&call.args[0], locals)?;
        self.emit_expr(&call.args[1], locals)?;
        self.emit(ops.mul);
        self.emit_expr(&call.args[2], locals)?;
        self.emit(ops.add);
        Ok(())
    }

    fn emit_copysign(&mut self, call: &Call, locals: &LocalMap, kind: ValueKind) -> LowerResult<()> {
        let ops = self.require_float("copysign", kind)?;
        let magnitude_in = self.arg_to_slot(&call.args[0], locals)?;
        let sign_source = self.arg_to_slot(&call.args[1], locals)?;

        // |x|, then negate when the sign source is negative.
        let magnitude = self.alloc_temp();
        self.load(magnitude_in);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(magnitude_in);
        self.emit(ops.neg);
        self.store(magnitude);
        let jump_stored = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_positive);
        self.load(magnitude_in);
        self.store(magnitude);
        self.patch_jump_here(jump_stored);

        self.load(sign_source);
        self.push_float_const(ops, 0.0);
        self.emit(ops.cmp_lt);
        let jump_keep = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
        self.load(magnitude);
        self.emit(ops.neg);
        let jump_end = self.emit_jump_placeholder(IrOpcode::Jump);
        self.patch_jump_here(jump_keep);
        self.load(magnitude);
        self.patch_jump_here(jump_end);
        Ok(())
    }

    fn emit_angle_scale(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        let ops = self.require_float(name, kind)?;
        self.emit_expr(&call.args[0], locals)?;
        let factor = if name == "radians" { PI / 180.0 } else { 180.0 / PI };
        self.push_float_const(ops, factor);
        self.emit(ops.mul);
        Ok(())
    }

    fn emit_float_predicate(
        &mut self,
        name: &str,
        call: &Call,
        locals: &LocalMap,
        kind: ValueKind,
    ) -> LowerResult<()> {
        if kind.is_integer() {
            // Integers are always finite.
            self.emit_expr(&call.args[0], locals)?;
            self.emit(IrOpcode::Pop);
            self.push_i32((name == "is_finite") as i32);
            return Ok(());
        }
        let ops = self.require_float(name, kind)?;
        let value = self.arg_to_slot(&call.args[0], locals)?;
        match name {
            "is_nan" => {
                self.load(value);
                self.load(value);
                self.emit(ops.cmp_ne);
            }
            "is_inf" => {
                // |x| == +inf
                let magnitude = self.alloc_temp();
                self.load(value);
                self.push_float_const(ops, 0.0);
                self.emit(ops.cmp_lt);
                let jump_positive = self.emit_jump_placeholder(IrOpcode::JumpIfZero);
                self.load(value);
                self.emit(ops.neg);
                self.store(magnitude);
                let jump_stored = self.emit_jump_placeholder(IrOpcode::Jump);
                self.patch_jump_here(jump_positive);
                self.load(value);
                self.store(magnitude);
                self.patch_jump_here(jump_stored);
                self.load(magnitude);
                self.push_float_const(ops, f64::INFINITY);
                self.emit(ops.cmp_eq);
            }
            _ => {
                // x - x == 0 only for finite x (inf and NaN both yield NaN).
                self.load(value);
                self.load(value);
                self.emit(ops.sub);
                self.push_float_const(ops, 0.0);
                self.emit(ops.cmp_eq);
            }
        }
        Ok(())
    }

    /// Push a NaN (0.0 / 0.0 keeps the expansion self-contained).
    fn emit_nan(&mut self, ops: FloatOps) {
        self.push_float_const(ops, 0.0);
        self.push_float_const(ops, 0.0);
        self.emit(ops.div);
    }
}
