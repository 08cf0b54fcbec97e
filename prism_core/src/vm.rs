//! The PSIR virtual machine.
//!
//! Single-threaded, non-suspending direct execution of a lowered module.
//! The evaluation stack holds 64-bit slots; locals live in a flat byte
//! array at 16 bytes per slot so `AddressOfLocal` yields a real byte
//! address and pointer arithmetic with the 16-byte element stride lands on
//! neighboring slots. I32 values are kept sign-extended in their slot,
//! which is why the opcode table has no integer-width conversions.
//!
//! Print output is buffered on the VM; the embedding driver drains the
//! buffers to the process streams. Runtime-guarded failures (bounds checks,
//! missing map keys, ...) are not `VmError`s; the lowerer compiles them
//! into a stderr diagnostic plus `ReturnI32 3`, so they surface as an
//! ordinary result.

use crate::error::VmError;
use crate::ir::{
    decode_print_string_imm, decode_print_value_imm, IrModule, IrOpcode, SLOT_SIZE,
};
use crate::kinds::ValueKind;

/// Exit code reported when a runtime guard fired.
pub const GUARD_EXIT_CODE: u64 = 3;

/// A PSIR interpreter. One `Vm` executes one module at a time; output
/// buffers accumulate across `execute` calls until taken.
#[derive(Debug, Default)]
pub struct Vm {
    stack: Vec<u64>,
    memory: Vec<u8>,
    stdout: String,
    stderr: String,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered stdout contents.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Buffered stderr contents.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Drain both output buffers.
    pub fn take_output(&mut self) -> (String, String) {
        (std::mem::take(&mut self.stdout), std::mem::take(&mut self.stderr))
    }

    /// Execute the module's entry function and return the 64-bit result
    /// (cast from the declared return kind; void returns 0).
    pub fn execute(&mut self, module: &IrModule) -> Result<u64, VmError> {
        let function = module.functions.first().ok_or(VmError::EmptyModule)?;
        let code = &function.instructions;
        self.stack.clear();
        self.memory.clear();
        self.memory
            .resize(function.local_count as usize * SLOT_SIZE as usize, 0);

        let mut ip = 0usize;
        while ip < code.len() {
            let instruction = code[ip];
            let imm = instruction.imm;
            ip += 1;
            match instruction.op {
                IrOpcode::PushI32 => self.stack.push(sx32(imm)),
                IrOpcode::PushI64 => self.stack.push(imm),
                IrOpcode::PushF32 => self.stack.push(imm & 0xFFFF_FFFF),
                IrOpcode::PushF64 => self.stack.push(imm),
                IrOpcode::Pop => {
                    self.pop(ip)?;
                }
                IrOpcode::Dup => {
                    let top = *self.stack.last().ok_or(VmError::StackUnderflow { ip })?;
                    self.stack.push(top);
                }

                IrOpcode::AddI32 => self.binary_i32(ip, i32::wrapping_add)?,
                IrOpcode::SubI32 => self.binary_i32(ip, i32::wrapping_sub)?,
                IrOpcode::MulI32 => self.binary_i32(ip, i32::wrapping_mul)?,
                IrOpcode::DivI32 => {
                    let (a, b) = self.pop_i32_pair(ip)?;
                    if b == 0 {
                        return Err(VmError::DivisionByZero { ip });
                    }
                    self.stack.push(a.wrapping_div(b) as i64 as u64);
                }
                IrOpcode::ModI32 => {
                    let (a, b) = self.pop_i32_pair(ip)?;
                    if b == 0 {
                        return Err(VmError::DivisionByZero { ip });
                    }
                    self.stack.push(a.wrapping_rem(b) as i64 as u64);
                }
                IrOpcode::NegI32 => {
                    let a = self.pop(ip)? as i32;
                    self.stack.push(a.wrapping_neg() as i64 as u64);
                }

                IrOpcode::AddI64 => self.binary_i64(ip, i64::wrapping_add)?,
                IrOpcode::SubI64 => self.binary_i64(ip, i64::wrapping_sub)?,
                IrOpcode::MulI64 => self.binary_i64(ip, i64::wrapping_mul)?,
                IrOpcode::DivI64 => {
                    let (a, b) = self.pop_i64_pair(ip)?;
                    if b == 0 {
                        return Err(VmError::DivisionByZero { ip });
                    }
                    self.stack.push(a.wrapping_div(b) as u64);
                }
                IrOpcode::ModI64 => {
                    let (a, b) = self.pop_i64_pair(ip)?;
                    if b == 0 {
                        return Err(VmError::DivisionByZero { ip });
                    }
                    self.stack.push(a.wrapping_rem(b) as u64);
                }
                IrOpcode::NegI64 => {
                    let a = self.pop(ip)? as i64;
                    self.stack.push(a.wrapping_neg() as u64);
                }

                IrOpcode::DivU64 => {
                    let b = self.pop(ip)?;
                    let a = self.pop(ip)?;
                    if b == 0 {
                        return Err(VmError::DivisionByZero { ip });
                    }
                    self.stack.push(a / b);
                }
                IrOpcode::ModU64 => {
                    let b = self.pop(ip)?;
                    let a = self.pop(ip)?;
                    if b == 0 {
                        return Err(VmError::DivisionByZero { ip });
                    }
                    self.stack.push(a % b);
                }

                IrOpcode::AddF32 => self.binary_f32(ip, |a, b| a + b)?,
                IrOpcode::SubF32 => self.binary_f32(ip, |a, b| a - b)?,
                IrOpcode::MulF32 => self.binary_f32(ip, |a, b| a * b)?,
                IrOpcode::DivF32 => self.binary_f32(ip, |a, b| a / b)?,
                IrOpcode::NegF32 => {
                    let a = f32::from_bits(self.pop(ip)? as u32);
                    self.stack.push((-a).to_bits() as u64);
                }

                IrOpcode::AddF64 => self.binary_f64(ip, |a, b| a + b)?,
                IrOpcode::SubF64 => self.binary_f64(ip, |a, b| a - b)?,
                IrOpcode::MulF64 => self.binary_f64(ip, |a, b| a * b)?,
                IrOpcode::DivF64 => self.binary_f64(ip, |a, b| a / b)?,
                IrOpcode::NegF64 => {
                    let a = f64::from_bits(self.pop(ip)?);
                    self.stack.push((-a).to_bits());
                }

                IrOpcode::CmpEqI32 => self.compare_i32(ip, |a, b| a == b)?,
                IrOpcode::CmpNeI32 => self.compare_i32(ip, |a, b| a != b)?,
                IrOpcode::CmpLtI32 => self.compare_i32(ip, |a, b| a < b)?,
                IrOpcode::CmpLeI32 => self.compare_i32(ip, |a, b| a <= b)?,
                IrOpcode::CmpGtI32 => self.compare_i32(ip, |a, b| a > b)?,
                IrOpcode::CmpGeI32 => self.compare_i32(ip, |a, b| a >= b)?,

                IrOpcode::CmpEqI64 => self.compare_i64(ip, |a, b| a == b)?,
                IrOpcode::CmpNeI64 => self.compare_i64(ip, |a, b| a != b)?,
                IrOpcode::CmpLtI64 => self.compare_i64(ip, |a, b| a < b)?,
                IrOpcode::CmpLeI64 => self.compare_i64(ip, |a, b| a <= b)?,
                IrOpcode::CmpGtI64 => self.compare_i64(ip, |a, b| a > b)?,
                IrOpcode::CmpGeI64 => self.compare_i64(ip, |a, b| a >= b)?,

                IrOpcode::CmpLtU64 => self.compare_u64(ip, |a, b| a < b)?,
                IrOpcode::CmpLeU64 => self.compare_u64(ip, |a, b| a <= b)?,
                IrOpcode::CmpGtU64 => self.compare_u64(ip, |a, b| a > b)?,
                IrOpcode::CmpGeU64 => self.compare_u64(ip, |a, b| a >= b)?,

                IrOpcode::CmpEqF32 => self.compare_f32(ip, |a, b| a == b)?,
                IrOpcode::CmpNeF32 => self.compare_f32(ip, |a, b| a != b)?,
                IrOpcode::CmpLtF32 => self.compare_f32(ip, |a, b| a < b)?,
                IrOpcode::CmpLeF32 => self.compare_f32(ip, |a, b| a <= b)?,
                IrOpcode::CmpGtF32 => self.compare_f32(ip, |a, b| a > b)?,
                IrOpcode::CmpGeF32 => self.compare_f32(ip, |a, b| a >= b)?,

                IrOpcode::CmpEqF64 => self.compare_f64(ip, |a, b| a == b)?,
                IrOpcode::CmpNeF64 => self.compare_f64(ip, |a, b| a != b)?,
                IrOpcode::CmpLtF64 => self.compare_f64(ip, |a, b| a < b)?,
                IrOpcode::CmpLeF64 => self.compare_f64(ip, |a, b| a <= b)?,
                IrOpcode::CmpGtF64 => self.compare_f64(ip, |a, b| a > b)?,
                IrOpcode::CmpGeF64 => self.compare_f64(ip, |a, b| a >= b)?,

                IrOpcode::ConvertI32ToF32 => {
                    let a = self.pop(ip)? as i32;
                    self.stack.push((a as f32).to_bits() as u64);
                }
                IrOpcode::ConvertI32ToF64 => {
                    let a = self.pop(ip)? as i32;
                    self.stack.push((a as f64).to_bits());
                }
                IrOpcode::ConvertI64ToF32 => {
                    let a = self.pop(ip)? as i64;
                    self.stack.push((a as f32).to_bits() as u64);
                }
                IrOpcode::ConvertI64ToF64 => {
                    let a = self.pop(ip)? as i64;
                    self.stack.push((a as f64).to_bits());
                }
                IrOpcode::ConvertU64ToF32 => {
                    let a = self.pop(ip)?;
                    self.stack.push((a as f32).to_bits() as u64);
                }
                IrOpcode::ConvertU64ToF64 => {
                    let a = self.pop(ip)?;
                    self.stack.push((a as f64).to_bits());
                }
                IrOpcode::ConvertF32ToI32 => {
                    let a = f32::from_bits(self.pop(ip)? as u32);
                    self.stack.push((a as i32) as i64 as u64);
                }
                IrOpcode::ConvertF32ToI64 => {
                    let a = f32::from_bits(self.pop(ip)? as u32);
                    self.stack.push((a as i64) as u64);
                }
                IrOpcode::ConvertF32ToU64 => {
                    let a = f32::from_bits(self.pop(ip)? as u32);
                    self.stack.push(a as u64);
                }
                IrOpcode::ConvertF32ToF64 => {
                    let a = f32::from_bits(self.pop(ip)? as u32);
                    self.stack.push((a as f64).to_bits());
                }
                IrOpcode::ConvertF64ToI32 => {
                    let a = f64::from_bits(self.pop(ip)?);
                    self.stack.push((a as i32) as i64 as u64);
                }
                IrOpcode::ConvertF64ToI64 => {
                    let a = f64::from_bits(self.pop(ip)?);
                    self.stack.push((a as i64) as u64);
                }
                IrOpcode::ConvertF64ToU64 => {
                    let a = f64::from_bits(self.pop(ip)?);
                    self.stack.push(a as u64);
                }
                IrOpcode::ConvertF64ToF32 => {
                    let a = f64::from_bits(self.pop(ip)?);
                    self.stack.push((a as f32).to_bits() as u64);
                }

                IrOpcode::LoadLocal => {
                    let address = self.local_address(imm, function.local_count)?;
                    self.stack.push(self.read_u64(address)?);
                }
                IrOpcode::StoreLocal => {
                    let address = self.local_address(imm, function.local_count)?;
                    let value = self.pop(ip)?;
                    self.write_u64(address, value)?;
                }
                IrOpcode::AddressOfLocal => {
                    let address = self.local_address(imm, function.local_count)?;
                    self.stack.push(address);
                }
                IrOpcode::LoadIndirect => {
                    let address = self.pop(ip)?;
                    self.stack.push(self.read_u64(address)?);
                }
                IrOpcode::StoreIndirect => {
                    let value = self.pop(ip)?;
                    let address = self.pop(ip)?;
                    self.write_u64(address, value)?;
                    self.stack.push(value);
                }

                IrOpcode::Jump => {
                    ip = self.jump_target(imm, code.len())?;
                }
                IrOpcode::JumpIfZero => {
                    let cond = self.pop(ip)?;
                    if cond == 0 {
                        ip = self.jump_target(imm, code.len())?;
                    }
                }

                IrOpcode::ReturnI32 => {
                    let value = self.pop(ip)? as i32;
                    return Ok(value as i64 as u64);
                }
                IrOpcode::ReturnI64 => return self.pop(ip),
                IrOpcode::ReturnF32 => {
                    let value = self.pop(ip)?;
                    return Ok(value & 0xFFFF_FFFF);
                }
                IrOpcode::ReturnF64 => return self.pop(ip),
                IrOpcode::ReturnVoid => return Ok(0),

                IrOpcode::PrintString => {
                    let (index, newline, to_stderr) = decode_print_string_imm(imm);
                    let text = module
                        .strings
                        .get(index as usize)
                        .ok_or(VmError::InvalidStringIndex {
                            index,
                            len: module.strings.len(),
                        })?
                        .clone();
                    self.write_text(&text, newline, to_stderr);
                }
                IrOpcode::PrintValue => {
                    let value = self.pop(ip)?;
                    let (kind, newline, to_stderr) = decode_print_value_imm(imm);
                    let text = format_value(kind, value);
                    self.write_text(&text, newline, to_stderr);
                }
            }
        }
        Err(VmError::MissingReturn)
    }

    fn pop(&mut self, ip: usize) -> Result<u64, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow { ip })
    }

    fn pop_i32_pair(&mut self, ip: usize) -> Result<(i32, i32), VmError> {
        let b = self.pop(ip)? as i32;
        let a = self.pop(ip)? as i32;
        Ok((a, b))
    }

    fn pop_i64_pair(&mut self, ip: usize) -> Result<(i64, i64), VmError> {
        let b = self.pop(ip)? as i64;
        let a = self.pop(ip)? as i64;
        Ok((a, b))
    }

    fn binary_i32(&mut self, ip: usize, op: fn(i32, i32) -> i32) -> Result<(), VmError> {
        let (a, b) = self.pop_i32_pair(ip)?;
        self.stack.push(op(a, b) as i64 as u64);
        Ok(())
    }

    fn binary_i64(&mut self, ip: usize, op: fn(i64, i64) -> i64) -> Result<(), VmError> {
        let (a, b) = self.pop_i64_pair(ip)?;
        self.stack.push(op(a, b) as u64);
        Ok(())
    }

    fn binary_f32(&mut self, ip: usize, op: fn(f32, f32) -> f32) -> Result<(), VmError> {
        let b = f32::from_bits(self.pop(ip)? as u32);
        let a = f32::from_bits(self.pop(ip)? as u32);
        self.stack.push(op(a, b).to_bits() as u64);
        Ok(())
    }

    fn binary_f64(&mut self, ip: usize, op: fn(f64, f64) -> f64) -> Result<(), VmError> {
        let b = f64::from_bits(self.pop(ip)?);
        let a = f64::from_bits(self.pop(ip)?);
        self.stack.push(op(a, b).to_bits());
        Ok(())
    }

    fn compare_i32(&mut self, ip: usize, op: fn(i32, i32) -> bool) -> Result<(), VmError> {
        let (a, b) = self.pop_i32_pair(ip)?;
        self.stack.push(op(a, b) as u64);
        Ok(())
    }

    fn compare_i64(&mut self, ip: usize, op: fn(i64, i64) -> bool) -> Result<(), VmError> {
        let (a, b) = self.pop_i64_pair(ip)?;
        self.stack.push(op(a, b) as u64);
        Ok(())
    }

    fn compare_u64(&mut self, ip: usize, op: fn(u64, u64) -> bool) -> Result<(), VmError> {
        let b = self.pop(ip)?;
        let a = self.pop(ip)?;
        self.stack.push(op(a, b) as u64);
        Ok(())
    }

    fn compare_f32(&mut self, ip: usize, op: fn(f32, f32) -> bool) -> Result<(), VmError> {
        let b = f32::from_bits(self.pop(ip)? as u32);
        let a = f32::from_bits(self.pop(ip)? as u32);
        self.stack.push(op(a, b) as u64);
        Ok(())
    }

    fn compare_f64(&mut self, ip: usize, op: fn(f64, f64) -> bool) -> Result<(), VmError> {
        let b = f64::from_bits(self.pop(ip)?);
        let a = f64::from_bits(self.pop(ip)?);
        self.stack.push(op(a, b) as u64);
        Ok(())
    }

    fn local_address(&self, slot: u64, local_count: u32) -> Result<u64, VmError> {
        if slot >= local_count as u64 {
            return Err(VmError::InvalidLocal { slot, local_count });
        }
        Ok(slot * SLOT_SIZE)
    }

    fn jump_target(&self, target: u64, len: usize) -> Result<usize, VmError> {
        if target > len as u64 {
            return Err(VmError::InvalidJumpTarget { target, len });
        }
        Ok(target as usize)
    }

    fn read_u64(&self, address: u64) -> Result<u64, VmError> {
        let start = address as usize;
        let end = start.checked_add(8).filter(|&e| e <= self.memory.len()).ok_or(
            VmError::InvalidAddress {
                address,
                memory: self.memory.len(),
            },
        )?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.memory[start..end]);
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u64(&mut self, address: u64, value: u64) -> Result<(), VmError> {
        let start = address as usize;
        let end = start.checked_add(8).filter(|&e| e <= self.memory.len()).ok_or(
            VmError::InvalidAddress {
                address,
                memory: self.memory.len(),
            },
        )?;
        self.memory[start..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_text(&mut self, text: &str, newline: bool, to_stderr: bool) {
        let sink = if to_stderr { &mut self.stderr } else { &mut self.stdout };
        sink.push_str(text);
        if newline {
            sink.push('\n');
        }
    }
}

/// Sign-extend the low 32 bits of a PushI32 immediate.
fn sx32(imm: u64) -> u64 {
    (imm as u32 as i32) as i64 as u64
}

fn format_value(kind: ValueKind, value: u64) -> String {
    match kind {
        ValueKind::Bool => {
            if value == 0 { "false".to_string() } else { "true".to_string() }
        }
        ValueKind::Int64 => (value as i64).to_string(),
        ValueKind::UInt64 => value.to_string(),
        ValueKind::Float32 => f32::from_bits(value as u32).to_string(),
        ValueKind::Float64 => f64::from_bits(value).to_string(),
        // Int32 and anything unrecognized print as a signed 32-bit value.
        _ => (value as i32).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        encode_print_flags, encode_print_string_imm, encode_print_value_imm, IrFunction,
        IrInstruction, IrModule,
    };

    fn module_with(instructions: Vec<IrInstruction>, local_count: u32) -> IrModule {
        IrModule {
            functions: vec![IrFunction {
                name: "/main".to_string(),
                local_count,
                return_kind: ValueKind::Int32,
                instructions,
            }],
            strings: vec!["warning".to_string()],
        }
    }

    #[test]
    fn add_and_return() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::new(IrOpcode::PushI32, 2),
                IrInstruction::op(IrOpcode::AddI32),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            0,
        );
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), 3);
    }

    #[test]
    fn locals_round_trip_through_memory() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 9),
                IrInstruction::new(IrOpcode::StoreLocal, 1),
                IrInstruction::new(IrOpcode::AddressOfLocal, 1),
                IrInstruction::op(IrOpcode::LoadIndirect),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            2,
        );
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), 9);
    }

    #[test]
    fn store_indirect_leaves_value() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::AddressOfLocal, 0),
                IrInstruction::new(IrOpcode::PushI32, 7),
                IrInstruction::op(IrOpcode::StoreIndirect),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            1,
        );
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), 7);
    }

    #[test]
    fn jump_if_zero_takes_branch() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 0),
                IrInstruction::new(IrOpcode::JumpIfZero, 4),
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::op(IrOpcode::ReturnI32),
                IrInstruction::new(IrOpcode::PushI32, 2),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            0,
        );
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), 2);
    }

    #[test]
    fn print_string_reaches_selected_stream() {
        let module = module_with(
            vec![
                IrInstruction::new(
                    IrOpcode::PrintString,
                    encode_print_string_imm(0, encode_print_flags(true, true)),
                ),
                IrInstruction::new(IrOpcode::PushI32, 3),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            0,
        );
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), 3);
        assert_eq!(vm.stderr(), "warning\n");
        assert!(vm.stdout().is_empty());
    }

    #[test]
    fn print_value_formats_by_kind() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushF64, 1.5f64.to_bits()),
                IrInstruction::new(
                    IrOpcode::PrintValue,
                    encode_print_value_imm(ValueKind::Float64, true, false),
                ),
                IrInstruction::new(IrOpcode::PushI32, 0),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            0,
        );
        let mut vm = Vm::new();
        vm.execute(&module).unwrap();
        assert_eq!(vm.stdout(), "1.5\n");
    }

    #[test]
    fn negative_i32_result_sign_extends() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 5),
                IrInstruction::op(IrOpcode::NegI32),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            0,
        );
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap() as i64, -5);
    }

    #[test]
    fn structural_faults_are_errors() {
        let mut vm = Vm::new();
        let underflow = module_with(vec![IrInstruction::op(IrOpcode::Pop)], 0);
        assert!(matches!(
            vm.execute(&underflow),
            Err(VmError::StackUnderflow { .. })
        ));

        let bad_local = module_with(vec![IrInstruction::new(IrOpcode::LoadLocal, 5)], 1);
        assert!(matches!(vm.execute(&bad_local), Err(VmError::InvalidLocal { .. })));

        let no_return = module_with(vec![IrInstruction::new(IrOpcode::PushI32, 1)], 0);
        assert!(matches!(vm.execute(&no_return), Err(VmError::MissingReturn)));

        let division = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::new(IrOpcode::PushI32, 0),
                IrInstruction::op(IrOpcode::DivI32),
            ],
            0,
        );
        assert!(matches!(vm.execute(&division), Err(VmError::DivisionByZero { .. })));
    }

    #[test]
    fn u64_comparison_is_unsigned() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushI64, u64::MAX),
                IrInstruction::new(IrOpcode::PushI64, 1),
                IrInstruction::op(IrOpcode::CmpGtU64),
                IrInstruction::op(IrOpcode::ReturnI32),
            ],
            0,
        );
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), 1);
    }
}
