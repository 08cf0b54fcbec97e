//! prism_core
//!
//! The core of the Prism toolchain: semantic analysis, IR lowering to the
//! Prism stack IR (PSIR), a direct-execution virtual machine, and the PSIR
//! container serializer. The parser lives in a separate tool and hands the
//! core a `prism_ast::Program`; the CLI driver and native-source emitter
//! sit on the other side of the `api` and `bytecode` surfaces.
//!
//! # Example
//!
//! ```
//! use prism_ast::builder::{call, def, lit_i32, program, ret, return_transform};
//! use prism_core::{compile_and_run, CoreOptions};
//!
//! let program = program(vec![def(
//!     "/main",
//!     vec![return_transform("int")],
//!     vec![],
//!     vec![ret(call("plus", vec![lit_i32(1), lit_i32(2)]))],
//! )]);
//! let outcome = compile_and_run(&program, "/main", &CoreOptions::default()).unwrap();
//! assert_eq!(outcome.result, 3);
//! ```

pub mod analyzer;
pub mod api;
pub mod builtins;
pub mod bytecode;
pub mod capability;
pub mod config;
pub mod error;
pub mod ir;
pub mod kinds;
pub mod vm;

mod context;
mod lower;

// Re-exports
pub use analyzer::SemanticAnalyzer;
pub use api::{compile, compile_and_run, ir_to_json, run, VmOutcome};
pub use capability::Capability;
pub use config::CoreOptions;
pub use error::{BytecodeError, LowerError, PipelineError, SemanticError, VmError};
pub use ir::{IrFunction, IrInstruction, IrModule, IrOpcode};
pub use kinds::ValueKind;
pub use lower::IrLowerer;
pub use vm::Vm;
