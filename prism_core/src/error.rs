//! Error values for the four subsystems, plus the aggregating pipeline
//! error the driver consumes.
//!
//! Static errors carry one descriptive sentence; the driver prints it
//! verbatim and exits with code 2. Diagnostics are stable substrings that
//! back test assertions, so changing one is a breaking change.

use std::fmt;

use thiserror::Error;

/// A semantic-analysis failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticError {
    pub message: String,
}

impl SemanticError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SemanticError {}

/// A lowering failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerError {
    pub message: String,
}

impl LowerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LowerError {}

/// Structural faults during VM execution. Runtime-guarded failures (bounds,
/// missing keys, ...) are not errors at this level: the lowerer compiles
/// them into diagnostics plus `ReturnI32 3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Module has no functions to execute.
    EmptyModule,
    /// An opcode popped more slots than the stack holds.
    StackUnderflow { ip: usize },
    /// Integer division or remainder by zero.
    DivisionByZero { ip: usize },
    /// `LoadLocal`/`StoreLocal`/`AddressOfLocal` slot out of range.
    InvalidLocal { slot: u64, local_count: u32 },
    /// `Jump`/`JumpIfZero` target past the function end.
    InvalidJumpTarget { target: u64, len: usize },
    /// `LoadIndirect`/`StoreIndirect` address outside the locals area.
    InvalidAddress { address: u64, memory: usize },
    /// `PrintString` referenced a string index past the table.
    InvalidStringIndex { index: u32, len: usize },
    /// Execution fell off the end of the function without a return.
    MissingReturn,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyModule => write!(f, "module contains no functions"),
            Self::StackUnderflow { ip } => write!(f, "stack underflow at instruction {ip}"),
            Self::DivisionByZero { ip } => write!(f, "division by zero at instruction {ip}"),
            Self::InvalidLocal { slot, local_count } => {
                write!(f, "local slot {slot} out of range (local count {local_count})")
            }
            Self::InvalidJumpTarget { target, len } => {
                write!(f, "jump target {target} out of range (function length {len})")
            }
            Self::InvalidAddress { address, memory } => {
                write!(f, "memory address {address} out of range (memory size {memory})")
            }
            Self::InvalidStringIndex { index, len } => {
                write!(f, "string index {index} out of range (table length {len})")
            }
            Self::MissingReturn => write!(f, "function ended without a return instruction"),
        }
    }
}

impl std::error::Error for VmError {}

/// PSIR container read/write failures.
#[derive(Debug)]
pub enum BytecodeError {
    Io(std::io::Error),
    /// Not a PSIR stream.
    InvalidMagic,
    /// Any version other than the current one is rejected.
    UnsupportedVersion(u32),
    /// Unknown opcode byte on read.
    UnknownOpcode(u8),
    /// Unknown return-kind byte on read.
    UnknownReturnKind(u8),
    /// Buffer ended inside the named field.
    Truncated(&'static str),
    /// A count or length exceeds the u32 container limits.
    TooLarge(&'static str),
    /// A function name or table entry was not valid UTF-8.
    InvalidUtf8(&'static str),
}

impl fmt::Display for BytecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes - not a PSIR stream"),
            Self::UnsupportedVersion(v) => {
                write!(f, "unsupported PSIR version: {v} (current: {})", crate::ir::VERSION)
            }
            Self::UnknownOpcode(b) => write!(f, "unknown opcode byte: {b:#04x}"),
            Self::UnknownReturnKind(b) => write!(f, "unknown return kind byte: {b:#04x}"),
            Self::Truncated(field) => write!(f, "truncated stream while reading {field}"),
            Self::TooLarge(field) => write!(f, "{field} exceeds container limits"),
            Self::InvalidUtf8(field) => write!(f, "{field} is not valid UTF-8"),
        }
    }
}

impl std::error::Error for BytecodeError {}

impl From<std::io::Error> for BytecodeError {
    fn from(e: std::io::Error) -> Self {
        BytecodeError::Io(e)
    }
}

/// Everything the pipeline API can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Semantic(#[from] SemanticError),
    #[error("{0}")]
    Lower(#[from] LowerError),
    #[error("{0}")]
    Vm(#[from] VmError),
    #[error("{0}")]
    Bytecode(#[from] BytecodeError),
}

impl PipelineError {
    /// The driver's exit code for this failure: 2 for static errors, 3 for
    /// anything that surfaced at run time.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Semantic(_) | Self::Lower(_) | Self::Bytecode(_) => 2,
            Self::Vm(_) => 3,
        }
    }
}
