//! The closed `ValueKind` lattice and the two combiners built on it.
//!
//! Operand combination is strict: mixing signedness, integer/float, or
//! widths inside one arithmetic or comparison call is an error. Return-kind
//! merging is the promoting variant used only when joining `return(...)`
//! sites of one definition.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Result/operand kinds. The u8 values are the on-disk return-kind bytes of
/// the PSIR container; the order is frozen.
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
pub enum ValueKind {
    Unknown = 0,
    Void = 1,
    Bool = 2,
    Int32 = 3,
    Int64 = 4,
    UInt64 = 5,
    Float32 = 6,
    Float64 = 7,
    String = 8,
    Array = 9,
}

impl Default for ValueKind {
    fn default() -> Self {
        ValueKind::Unknown
    }
}

impl ValueKind {
    pub fn is_signed_integer(self) -> bool {
        matches!(self, ValueKind::Int32 | ValueKind::Int64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ValueKind::Int32 | ValueKind::Int64 | ValueKind::UInt64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueKind::Float32 | ValueKind::Float64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// The surface type name for a binding transform, or `None` for kinds
    /// that have no surface spelling.
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            ValueKind::Bool => Some("bool"),
            ValueKind::Int32 => Some("i32"),
            ValueKind::Int64 => Some("i64"),
            ValueKind::UInt64 => Some("u64"),
            ValueKind::Float32 => Some("f32"),
            ValueKind::Float64 => Some("f64"),
            ValueKind::String => Some("string"),
            _ => None,
        }
    }

    /// Map a surface type name (`int`, `i32`, `u64`, `float`, ...) to its
    /// kind. Unrecognized names are `Unknown`.
    pub fn from_type_name(name: &str) -> ValueKind {
        match name {
            "int" | "i32" => ValueKind::Int32,
            "i64" => ValueKind::Int64,
            "u64" => ValueKind::UInt64,
            "float" | "f32" => ValueKind::Float32,
            "f64" => ValueKind::Float64,
            "bool" => ValueKind::Bool,
            "string" => ValueKind::String,
            "void" => ValueKind::Void,
            _ => ValueKind::Unknown,
        }
    }
}

/// Promoting combination used by the lowerer when selecting opcode widths.
/// Same-kind stays, I32 widens into I64, everything else that mixes is
/// `Unknown`.
pub fn combine_numeric(left: ValueKind, right: ValueKind) -> ValueKind {
    use ValueKind::*;
    if left == Unknown || right == Unknown {
        return Unknown;
    }
    if left == String || right == String || left == Bool || right == Bool {
        return Unknown;
    }
    if left.is_float() || right.is_float() {
        if left == Float32 && right == Float32 {
            return Float32;
        }
        if left == Float64 && right == Float64 {
            return Float64;
        }
        return Unknown;
    }
    if left == UInt64 || right == UInt64 {
        return if left == UInt64 && right == UInt64 {
            UInt64
        } else {
            Unknown
        };
    }
    if left == Int64 || right == Int64 {
        return if left.is_signed_integer() && right.is_signed_integer() {
            Int64
        } else {
            Unknown
        };
    }
    if left == Int32 && right == Int32 {
        return Int32;
    }
    Unknown
}

/// Combination for comparison operands: Bool is admitted as Int32 first
/// (Bool may compare only with signed integers).
pub fn comparison_kind(left: ValueKind, right: ValueKind) -> ValueKind {
    let left = if left == ValueKind::Bool { ValueKind::Int32 } else { left };
    let right = if right == ValueKind::Bool { ValueKind::Int32 } else { right };
    combine_numeric(left, right)
}

/// Join two inferred return kinds from different `return(...)` sites:
/// Float64 dominates Float32, UInt64 merges only with itself, Int64 absorbs
/// Int32, and every other mix is `Unknown`.
pub fn merge_return_kinds(left: ValueKind, right: ValueKind) -> ValueKind {
    use ValueKind::*;
    if left == right {
        return left;
    }
    match (left, right) {
        (Float32, Float64) | (Float64, Float32) => Float64,
        (Int32, Int64) | (Int64, Int32) => Int64,
        _ => Unknown,
    }
}

/// Strict operand check for the analyzer. Returns the combined kind or a
/// diagnostic naming the mix.
pub fn check_operands(builtin: &str, left: ValueKind, right: ValueKind) -> Result<ValueKind, String> {
    use ValueKind::*;
    if left == Unknown || right == Unknown {
        return Err(format!("{builtin} requires numeric arguments of the same type"));
    }
    if (left.is_signed_integer() && right == UInt64) || (left == UInt64 && right.is_signed_integer()) {
        return Err(format!("mixed signed/unsigned operands for {builtin}"));
    }
    if (left.is_integer() && right.is_float()) || (left.is_float() && right.is_integer()) {
        return Err(format!("mixed int/float operands for {builtin}"));
    }
    if left != right && left.is_numeric() && right.is_numeric() {
        return Err(format!("mixed numeric widths for {builtin}"));
    }
    if left != right {
        return Err(format!("{builtin} requires numeric arguments of the same type"));
    }
    Ok(left)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_same_kinds() {
        assert_eq!(combine_numeric(ValueKind::Int32, ValueKind::Int32), ValueKind::Int32);
        assert_eq!(combine_numeric(ValueKind::Float64, ValueKind::Float64), ValueKind::Float64);
        assert_eq!(combine_numeric(ValueKind::UInt64, ValueKind::UInt64), ValueKind::UInt64);
    }

    #[test]
    fn combine_widens_signed_integers() {
        assert_eq!(combine_numeric(ValueKind::Int32, ValueKind::Int64), ValueKind::Int64);
        assert_eq!(combine_numeric(ValueKind::Int64, ValueKind::Int32), ValueKind::Int64);
    }

    #[test]
    fn combine_rejects_mixes() {
        assert_eq!(combine_numeric(ValueKind::Int32, ValueKind::UInt64), ValueKind::Unknown);
        assert_eq!(combine_numeric(ValueKind::Float32, ValueKind::Float64), ValueKind::Unknown);
        assert_eq!(combine_numeric(ValueKind::Int32, ValueKind::Float32), ValueKind::Unknown);
        assert_eq!(combine_numeric(ValueKind::Bool, ValueKind::Int32), ValueKind::Unknown);
    }

    #[test]
    fn comparison_admits_bool_as_signed() {
        assert_eq!(comparison_kind(ValueKind::Bool, ValueKind::Int32), ValueKind::Int32);
        assert_eq!(comparison_kind(ValueKind::Bool, ValueKind::Bool), ValueKind::Int32);
        assert_eq!(comparison_kind(ValueKind::Bool, ValueKind::UInt64), ValueKind::Unknown);
    }

    #[test]
    fn return_merge_promotes_floats() {
        assert_eq!(merge_return_kinds(ValueKind::Float32, ValueKind::Float64), ValueKind::Float64);
        assert_eq!(merge_return_kinds(ValueKind::Int32, ValueKind::Int64), ValueKind::Int64);
        assert_eq!(merge_return_kinds(ValueKind::Int32, ValueKind::Float32), ValueKind::Unknown);
        assert_eq!(merge_return_kinds(ValueKind::UInt64, ValueKind::UInt64), ValueKind::UInt64);
    }

    #[test]
    fn strict_check_names_the_mix() {
        let err = check_operands("plus", ValueKind::Int32, ValueKind::UInt64).unwrap_err();
        assert!(err.contains("mixed signed/unsigned"));
        let err = check_operands("plus", ValueKind::Int32, ValueKind::Float32).unwrap_err();
        assert!(err.contains("mixed int/float"));
        let err = check_operands("plus", ValueKind::Int32, ValueKind::Int64).unwrap_err();
        assert!(err.contains("mixed numeric widths"));
    }

    #[test]
    fn kind_byte_round_trip() {
        for kind in [
            ValueKind::Unknown,
            ValueKind::Void,
            ValueKind::Bool,
            ValueKind::Int32,
            ValueKind::Int64,
            ValueKind::UInt64,
            ValueKind::Float32,
            ValueKind::Float64,
            ValueKind::String,
            ValueKind::Array,
        ] {
            let byte: u8 = kind.into();
            assert_eq!(ValueKind::try_from(byte).unwrap(), kind);
        }
    }
}
