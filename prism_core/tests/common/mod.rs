//! Shared plumbing for the integration suites: build a program with the
//! AST builders, then validate, lower, and execute it.

#![allow(dead_code)]

use prism_ast::Program;
use prism_core::{CoreOptions, IrLowerer, IrModule, IrOpcode, SemanticAnalyzer, Vm};

pub fn validate(program: &Program, entry: &str) -> Result<(), String> {
    SemanticAnalyzer::new(CoreOptions::default())
        .validate(program, entry)
        .map_err(|e| e.to_string())
}

/// Validation must fail; returns the diagnostic.
pub fn validate_err(program: &Program, entry: &str) -> String {
    match validate(program, entry) {
        Ok(()) => panic!("expected validation to fail for {entry}"),
        Err(message) => message,
    }
}

pub fn lower(program: &Program, entry: &str) -> IrModule {
    validate(program, entry).expect("program should validate");
    IrLowerer::new(CoreOptions::default())
        .lower(program, entry)
        .expect("program should lower")
}

pub fn lower_with(program: &Program, entry: &str, options: &CoreOptions) -> IrModule {
    SemanticAnalyzer::new(options.clone())
        .validate(program, entry)
        .expect("program should validate");
    IrLowerer::new(options.clone())
        .lower(program, entry)
        .expect("program should lower")
}

/// Lowering must fail; returns the diagnostic.
pub fn lower_err(program: &Program, entry: &str) -> String {
    IrLowerer::new(CoreOptions::default())
        .lower(program, entry)
        .map(|_| ())
        .expect_err("expected lowering to fail")
        .to_string()
}

/// Execute a module, returning (result, stdout, stderr).
pub fn run_module(module: &IrModule) -> (u64, String, String) {
    let mut vm = Vm::new();
    let result = vm.execute(module).expect("module should execute");
    let (stdout, stderr) = vm.take_output();
    (result, stdout, stderr)
}

/// Validate, lower, and execute; returns the result value.
pub fn run_program(program: &Program, entry: &str) -> u64 {
    let module = lower(program, entry);
    run_module(&module).0
}

/// The opcode stream of the entry function.
pub fn ops(module: &IrModule) -> Vec<IrOpcode> {
    module.functions[0].instructions.iter().map(|i| i.op).collect()
}

pub fn has_op(module: &IrModule, op: IrOpcode) -> bool {
    ops(module).contains(&op)
}

/// Interpret an entry result as the f64 it encodes.
pub fn result_as_f64(result: u64) -> f64 {
    f64::from_bits(result)
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} within {tolerance}, got {actual}"
    );
}
