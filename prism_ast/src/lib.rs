//! prism_ast
//!
//! The Program AST the Prism core compiles. The parser (a separate tool)
//! produces this tree; everything downstream (semantic analysis, IR
//! lowering, the PSIR virtual machine) consumes it through the types in
//! this crate.
//!
//! # Example
//!
//! ```
//! use prism_ast::builder::{call, def, lit_i32, ret, return_transform};
//! use prism_ast::Program;
//!
//! let program = Program::with_definitions(vec![def(
//!     "/main",
//!     vec![return_transform("int")],
//!     vec![],
//!     vec![ret(call("plus", vec![lit_i32(1), lit_i32(2)]))],
//! )]);
//! assert!(program.definition("/main").is_some());
//! ```

pub mod builder;
pub mod expr;
pub mod program;
pub mod transform;

// Re-exports
pub use expr::{Call, Expr, FloatLit, FloatWidth, IntLit, IntWidth, NameRef, StrEncoding, StrLit};
pub use program::{path_leaf, path_parent, Definition, Execution, Program};
pub use transform::Transform;
