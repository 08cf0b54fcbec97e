//! PSIR container format.
//!
//! Serialization and deserialization of lowered modules to the on-disk
//! `.psir` byte stream. All fields are little-endian.
//!
//! # File Format
//!
//! ```text
//! +--------------------+
//! | Magic (4 bytes)    |  0x50534952 ("PSIR")
//! +--------------------+
//! | Version (4 bytes)  |  u32, currently 14
//! +--------------------+
//! | Function count (4) |
//! +--------------------+
//! | Per function:      |  name (u32 length + UTF-8 bytes),
//! |                    |  local count (u32), return kind (u8),
//! |                    |  instruction count (u32),
//! |                    |  instructions (opcode u8 + imm u64 each)
//! +--------------------+
//! | String count (4)   |
//! +--------------------+
//! | Per string:        |  u32 length + raw bytes
//! +--------------------+
//! ```
//!
//! The writer refuses any count or length that does not fit the u32 fields;
//! the reader rejects bad magic, any version other than the current one,
//! unknown opcode or return-kind bytes, and truncated payloads.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::BytecodeError;
use crate::ir::{IrFunction, IrInstruction, IrModule, IrOpcode, MAGIC, VERSION};
use crate::kinds::ValueKind;

/// Serialize a module to bytes.
pub fn save_to_bytes(module: &IrModule) -> Result<Vec<u8>, BytecodeError> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());

    let function_count =
        u32::try_from(module.functions.len()).map_err(|_| BytecodeError::TooLarge("function count"))?;
    out.extend_from_slice(&function_count.to_le_bytes());

    for function in &module.functions {
        let name_len =
            u32::try_from(function.name.len()).map_err(|_| BytecodeError::TooLarge("function name"))?;
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(function.name.as_bytes());
        out.extend_from_slice(&function.local_count.to_le_bytes());
        out.push(u8::from(function.return_kind));
        let instruction_count = u32::try_from(function.instructions.len())
            .map_err(|_| BytecodeError::TooLarge("instruction count"))?;
        out.extend_from_slice(&instruction_count.to_le_bytes());
        for instruction in &function.instructions {
            out.push(u8::from(instruction.op));
            out.extend_from_slice(&instruction.imm.to_le_bytes());
        }
    }

    let string_count =
        u32::try_from(module.strings.len()).map_err(|_| BytecodeError::TooLarge("string count"))?;
    out.extend_from_slice(&string_count.to_le_bytes());
    for entry in &module.strings {
        let len = u32::try_from(entry.len()).map_err(|_| BytecodeError::TooLarge("string entry"))?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
    }

    Ok(out)
}

/// Deserialize a module from bytes.
pub fn load_from_bytes(data: &[u8]) -> Result<IrModule, BytecodeError> {
    let mut reader = ByteReader { data, offset: 0 };

    let magic = reader.read_u32("magic")?;
    if magic != MAGIC {
        return Err(BytecodeError::InvalidMagic);
    }
    let version = reader.read_u32("version")?;
    if version != VERSION {
        return Err(BytecodeError::UnsupportedVersion(version));
    }

    let function_count = reader.read_u32("function count")?;
    let mut functions = Vec::new();
    for _ in 0..function_count {
        let name = reader.read_string("function name")?;
        let local_count = reader.read_u32("local count")?;
        let kind_byte = reader.read_u8("return kind")?;
        let return_kind =
            ValueKind::try_from(kind_byte).map_err(|_| BytecodeError::UnknownReturnKind(kind_byte))?;
        let instruction_count = reader.read_u32("instruction count")?;
        let mut instructions = Vec::new();
        for _ in 0..instruction_count {
            let op_byte = reader.read_u8("opcode")?;
            let op = IrOpcode::try_from(op_byte).map_err(|_| BytecodeError::UnknownOpcode(op_byte))?;
            let imm = reader.read_u64("immediate")?;
            instructions.push(IrInstruction::new(op, imm));
        }
        functions.push(IrFunction {
            name,
            local_count,
            return_kind,
            instructions,
        });
    }

    let string_count = reader.read_u32("string count")?;
    let mut strings = Vec::new();
    for _ in 0..string_count {
        strings.push(reader.read_string("string entry")?);
    }

    Ok(IrModule { functions, strings })
}

/// Save a module to a `.psir` file.
pub fn save<P: AsRef<Path>>(module: &IrModule, path: P) -> Result<(), BytecodeError> {
    let bytes = save_to_bytes(module)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Load a module from a `.psir` file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<IrModule, BytecodeError> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    load_from_bytes(&data)
}

struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl ByteReader<'_> {
    fn read_u8(&mut self, field: &'static str) -> Result<u8, BytecodeError> {
        let byte = *self
            .data
            .get(self.offset)
            .ok_or(BytecodeError::Truncated(field))?;
        self.offset += 1;
        Ok(byte)
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, BytecodeError> {
        let end = self.offset.checked_add(4).ok_or(BytecodeError::Truncated(field))?;
        let bytes = self
            .data
            .get(self.offset..end)
            .ok_or(BytecodeError::Truncated(field))?;
        self.offset = end;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, BytecodeError> {
        let end = self.offset.checked_add(8).ok_or(BytecodeError::Truncated(field))?;
        let bytes = self
            .data
            .get(self.offset..end)
            .ok_or(BytecodeError::Truncated(field))?;
        self.offset = end;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_string(&mut self, field: &'static str) -> Result<String, BytecodeError> {
        let len = self.read_u32(field)? as usize;
        let end = self.offset.checked_add(len).ok_or(BytecodeError::Truncated(field))?;
        let bytes = self
            .data
            .get(self.offset..end)
            .ok_or(BytecodeError::Truncated(field))?;
        self.offset = end;
        String::from_utf8(bytes.to_vec()).map_err(|_| BytecodeError::InvalidUtf8(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{encode_print_flags, encode_print_string_imm};

    fn sample_module() -> IrModule {
        IrModule {
            functions: vec![IrFunction {
                name: "/main".to_string(),
                local_count: 2,
                return_kind: ValueKind::Int32,
                instructions: vec![
                    IrInstruction::new(IrOpcode::PushI32, 1),
                    IrInstruction::new(IrOpcode::PushI32, 2),
                    IrInstruction::op(IrOpcode::AddI32),
                    IrInstruction::new(
                        IrOpcode::PrintString,
                        encode_print_string_imm(0, encode_print_flags(true, false)),
                    ),
                    IrInstruction::op(IrOpcode::ReturnI32),
                ],
            }],
            strings: vec!["done".to_string()],
        }
    }

    #[test]
    fn round_trip_preserves_structure() {
        let module = sample_module();
        let bytes = save_to_bytes(&module).unwrap();
        let decoded = load_from_bytes(&bytes).unwrap();
        assert_eq!(module, decoded);
    }

    #[test]
    fn header_layout() {
        let bytes = save_to_bytes(&sample_module()).unwrap();
        assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), MAGIC);
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), VERSION);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 1);
    }

    #[test]
    fn rejects_invalid_magic() {
        let mut bytes = save_to_bytes(&sample_module()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(load_from_bytes(&bytes), Err(BytecodeError::InvalidMagic)));
    }

    #[test]
    fn rejects_other_versions() {
        let mut bytes = save_to_bytes(&sample_module()).unwrap();
        bytes[4..8].copy_from_slice(&13u32.to_le_bytes());
        assert!(matches!(
            load_from_bytes(&bytes),
            Err(BytecodeError::UnsupportedVersion(13))
        ));
        let mut bytes = save_to_bytes(&sample_module()).unwrap();
        bytes[4..8].copy_from_slice(&15u32.to_le_bytes());
        assert!(matches!(
            load_from_bytes(&bytes),
            Err(BytecodeError::UnsupportedVersion(15))
        ));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut bytes = save_to_bytes(&sample_module()).unwrap();
        // First opcode byte sits after magic/version/count, name field, local
        // count, return kind, and instruction count.
        let first_opcode = 12 + 4 + "/main".len() + 4 + 1 + 4;
        bytes[first_opcode] = 0xFF;
        assert!(matches!(
            load_from_bytes(&bytes),
            Err(BytecodeError::UnknownOpcode(0xFF))
        ));
    }

    #[test]
    fn rejects_truncated_stream() {
        let bytes = save_to_bytes(&sample_module()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(load_from_bytes(cut), Err(BytecodeError::Truncated(_))));
    }
}
