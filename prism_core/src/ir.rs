//! The Prism stack IR (PSIR).
//!
//! A module is an ordered list of functions (after full inlining there is
//! normally exactly one: the entry) plus a deduplicated string table. Each
//! instruction is an opcode and one 64-bit immediate. The opcode byte
//! values below are the on-disk encoding and are frozen: new opcodes are
//! appended, existing values never move.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::kinds::ValueKind;

/// Container magic, `"PSIR"` read as a big-endian u32.
pub const MAGIC: u32 = 0x5053_4952;

/// Current container version. Prior versions are rejected on read.
pub const VERSION: u32 = 14;

/// PSIR opcodes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(u8)]
pub enum IrOpcode {
    // stack
    PushI32 = 0,
    PushI64 = 1,
    PushF32 = 2,
    PushF64 = 3,
    Pop = 4,
    Dup = 5,

    // i32 arithmetic
    AddI32 = 6,
    SubI32 = 7,
    MulI32 = 8,
    DivI32 = 9,
    ModI32 = 10,
    NegI32 = 11,

    // i64 arithmetic
    AddI64 = 12,
    SubI64 = 13,
    MulI64 = 14,
    DivI64 = 15,
    ModI64 = 16,
    NegI64 = 17,

    // u64 arithmetic where signedness differs
    DivU64 = 18,
    ModU64 = 19,

    // f32 arithmetic
    AddF32 = 20,
    SubF32 = 21,
    MulF32 = 22,
    DivF32 = 23,
    NegF32 = 24,

    // f64 arithmetic
    AddF64 = 25,
    SubF64 = 26,
    MulF64 = 27,
    DivF64 = 28,
    NegF64 = 29,

    // i32 comparisons
    CmpEqI32 = 30,
    CmpNeI32 = 31,
    CmpLtI32 = 32,
    CmpLeI32 = 33,
    CmpGtI32 = 34,
    CmpGeI32 = 35,

    // i64 comparisons (equality doubles for u64, see module docs)
    CmpEqI64 = 36,
    CmpNeI64 = 37,
    CmpLtI64 = 38,
    CmpLeI64 = 39,
    CmpGtI64 = 40,
    CmpGeI64 = 41,

    // u64 ordered comparisons
    CmpLtU64 = 42,
    CmpLeU64 = 43,
    CmpGtU64 = 44,
    CmpGeU64 = 45,

    // f32 comparisons
    CmpEqF32 = 46,
    CmpNeF32 = 47,
    CmpLtF32 = 48,
    CmpLeF32 = 49,
    CmpGtF32 = 50,
    CmpGeF32 = 51,

    // f64 comparisons
    CmpEqF64 = 52,
    CmpNeF64 = 53,
    CmpLtF64 = 54,
    CmpLeF64 = 55,
    CmpGtF64 = 56,
    CmpGeF64 = 57,

    // conversions (integer widths share slots, so int<->int needs none)
    ConvertI32ToF32 = 58,
    ConvertI32ToF64 = 59,
    ConvertI64ToF32 = 60,
    ConvertI64ToF64 = 61,
    ConvertU64ToF32 = 62,
    ConvertU64ToF64 = 63,
    ConvertF32ToI32 = 64,
    ConvertF32ToI64 = 65,
    ConvertF32ToU64 = 66,
    ConvertF32ToF64 = 67,
    ConvertF64ToI32 = 68,
    ConvertF64ToI64 = 69,
    ConvertF64ToU64 = 70,
    ConvertF64ToF32 = 71,

    // locals and memory (imm = slot for the local ops)
    LoadLocal = 72,
    StoreLocal = 73,
    AddressOfLocal = 74,
    LoadIndirect = 75,
    StoreIndirect = 76,

    // control flow (imm = instruction index)
    Jump = 77,
    JumpIfZero = 78,

    // returns
    ReturnI32 = 79,
    ReturnI64 = 80,
    ReturnF32 = 81,
    ReturnF64 = 82,
    ReturnVoid = 83,

    // I/O helpers
    PrintString = 84,
    PrintValue = 85,
}

/// One instruction: opcode plus 64-bit immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrInstruction {
    pub op: IrOpcode,
    pub imm: u64,
}

impl IrInstruction {
    pub fn new(op: IrOpcode, imm: u64) -> Self {
        Self { op, imm }
    }

    /// An instruction with a zero immediate.
    pub fn op(op: IrOpcode) -> Self {
        Self { op, imm: 0 }
    }
}

/// One lowered function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: String,
    pub local_count: u32,
    pub return_kind: ValueKind,
    pub instructions: Vec<IrInstruction>,
}

/// A lowered module: functions plus the interned string table, referenced
/// by `PrintString` (and map string keys) through indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub strings: Vec<String>,
}

/// Bytes each local slot occupies in VM memory. `AddressOfLocal` yields
/// `slot * SLOT_SIZE` and pointer arithmetic uses this stride.
pub const SLOT_SIZE: u64 = 16;

/// Encode the flag word shared by the print opcodes: bit 0 newline, bit 1
/// stderr.
pub fn encode_print_flags(newline: bool, to_stderr: bool) -> u64 {
    (newline as u64) | ((to_stderr as u64) << 1)
}

/// `PrintString` immediate: string-table index in the high half, flags in
/// the low half.
pub fn encode_print_string_imm(index: u64, flags: u64) -> u64 {
    (index << 32) | (flags & 0xFFFF_FFFF)
}

pub fn decode_print_string_imm(imm: u64) -> (u32, bool, bool) {
    let index = (imm >> 32) as u32;
    (index, imm & 1 != 0, imm & 2 != 0)
}

/// `PrintValue` immediate: operand kind in the low byte, newline bit 8,
/// stderr bit 9.
pub fn encode_print_value_imm(kind: ValueKind, newline: bool, to_stderr: bool) -> u64 {
    u8::from(kind) as u64 | ((newline as u64) << 8) | ((to_stderr as u64) << 9)
}

pub fn decode_print_value_imm(imm: u64) -> (ValueKind, bool, bool) {
    let kind = ValueKind::try_from((imm & 0xFF) as u8).unwrap_or(ValueKind::Unknown);
    (kind, imm & (1 << 8) != 0, imm & (1 << 9) != 0)
}
