//! Pipeline entry points for embedding drivers.
//!
//! The driver feeds a parsed `Program` through `compile` (validate +
//! lower), then either executes the module in-process with `run`, persists
//! it through the `bytecode` module, or hands it to the native emitter.
//! Exit-code taxonomy: 0 success, 2 static error, 3 runtime guard.

use prism_ast::Program;

use crate::analyzer::SemanticAnalyzer;
use crate::config::CoreOptions;
use crate::error::PipelineError;
use crate::ir::IrModule;
use crate::lower::IrLowerer;
use crate::vm::Vm;

/// Result of one VM execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOutcome {
    /// The 64-bit result value (cast from the declared return kind).
    pub result: u64,
    /// 0 normally; 3 when a runtime guard fired.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Validate and lower a program.
pub fn compile(
    program: &Program,
    entry_path: &str,
    options: &CoreOptions,
) -> Result<IrModule, PipelineError> {
    SemanticAnalyzer::new(options.clone()).validate(program, entry_path)?;
    let module = IrLowerer::new(options.clone()).lower(program, entry_path)?;
    Ok(module)
}

/// Execute a lowered module, capturing output and the exit code.
pub fn run(module: &IrModule) -> Result<VmOutcome, PipelineError> {
    let mut vm = Vm::new();
    let result = vm.execute(module)?;
    let (stdout, stderr) = vm.take_output();
    // Runtime guards exit the entry with result 3 after printing their
    // diagnostic to stderr.
    let exit_code = if result == 3 && !stderr.is_empty() { 3 } else { 0 };
    Ok(VmOutcome {
        result,
        exit_code,
        stdout,
        stderr,
    })
}

/// Validate, lower, and execute in one step.
pub fn compile_and_run(
    program: &Program,
    entry_path: &str,
    options: &CoreOptions,
) -> Result<VmOutcome, PipelineError> {
    let module = compile(program, entry_path, options)?;
    run(&module)
}

/// JSON dump of a lowered module for tooling and inspectors.
pub fn ir_to_json(module: &IrModule) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_ast::builder::*;

    #[test]
    fn compile_and_run_add() {
        let program = program(vec![def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(call("plus", vec![lit_i32(1), lit_i32(2)]))],
        )]);
        let outcome = compile_and_run(&program, "/main", &CoreOptions::default()).unwrap();
        assert_eq!(outcome.result, 3);
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn static_errors_exit_with_two() {
        let program = program(vec![def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(name("ghost"))],
        )]);
        let err = compile_and_run(&program, "/main", &CoreOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("unknown identifier"));
    }

    #[test]
    fn ir_json_dump_includes_opcodes() {
        let program = program(vec![def(
            "/main",
            vec![return_transform("int")],
            vec![],
            vec![ret(lit_i32(4))],
        )]);
        let module = compile(&program, "/main", &CoreOptions::default()).unwrap();
        let json = ir_to_json(&module).unwrap();
        assert!(json.contains("PushI32"));
        assert!(json.contains("ReturnI32"));
    }
}
