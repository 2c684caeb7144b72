//! Bitauth Template Language compiler.
//!
//! Compiles BTL source into Bitcoin Cash bytecode through three phases:
//!
//! ```text
//! parser  - source text to ranged ScriptSegment tree
//! resolver - identifiers to opcodes, variables, or nested scripts
//! reducer  - resolved tree to bytecode, running $(...) on the VM
//! ```
//!
//! The [`compiler::Compiler`] facade ties the phases together and carries the
//! explicit `source_script_ids` chain that makes nested-script cycles
//! detectable. Errors are values throughout: resolution failures embed in the
//! resolved tree as `Error` segments and surface from reduction as ranged
//! [`error::CompileError`] lists.

pub mod ast;
pub mod compiler;
pub mod environment;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod range;
pub mod reducer;
pub mod resolver;

pub use ast::{
    BytecodeSource, LiteralType, ParsedScript, ResolvedScript, ResolvedSegment, ScriptSegment,
};
pub use compiler::{CompilationFailure, CompilationOutput, Compiler, StateFactory};
pub use environment::{
    standard_operations, CompilationData, CompilationEnvironment, CompilerOperation,
    CompilerOperations, OperationsTable, Variable, VariableType,
};
pub use error::{format_errors, CompileError, ErrorKind};
pub use parser::parse_script;
pub use range::{merge_ranges, LineIndex, Range};
pub use resolver::{IdentifierKind, ResolveError, ResolveErrorKind, ResolvedIdentifier};
