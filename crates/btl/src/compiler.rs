//! The compilation pipeline.
//!
//! A [`Compiler`] borrows the environment and per-compilation data, plus an
//! optional virtual machine and state factory for inline evaluations, and
//! threads the explicit `source_script_ids` chain through the mutual
//! recursion between resolution and nested-script compilation.

use tracing::debug;

use crate::ast::{ParsedScript, ResolvedScript};
use crate::environment::{CompilationData, CompilationEnvironment};
use crate::error::CompileError;
use crate::parser::parse_script;
use crate::range::Range;
use crate::reducer::{reduce_script, ScriptReductionTrace};
use crate::resolver::resolve_script_segments;

use bitauth_vm::{BchVm, Instruction, ProgramState, TransactionContext};

/// Builds the initial program state for an inline evaluation.
pub type StateFactory = Box<dyn Fn(Vec<Instruction>) -> ProgramState + Send + Sync>;

/// A successful compilation.
#[derive(Debug, Clone)]
pub struct CompilationOutput {
    pub bytecode: Vec<u8>,
    pub parsed: ParsedScript,
    pub resolved: ResolvedScript,
    pub reduction: ScriptReductionTrace,
}

/// A failed compilation: the error list plus any partial artifacts.
#[derive(Debug, Clone)]
pub struct CompilationFailure {
    pub errors: Vec<CompileError>,
    pub resolved: Option<ResolvedScript>,
    /// Best-effort bytecode (empty where reduction was undefined).
    pub bytecode: Vec<u8>,
}

/// The template compiler.
pub struct Compiler<'a> {
    pub(crate) environment: &'a CompilationEnvironment,
    pub(crate) data: &'a CompilationData,
    pub(crate) vm: Option<&'a BchVm>,
    pub(crate) create_state: Option<StateFactory>,
}

impl<'a> Compiler<'a> {
    /// A compiler without evaluation support: scripts using `$(...)` will
    /// fail to reduce.
    pub fn new(environment: &'a CompilationEnvironment, data: &'a CompilationData) -> Self {
        Self {
            environment,
            data,
            vm: None,
            create_state: None,
        }
    }

    /// A compiler evaluating `$(...)` segments on `vm`, starting each
    /// evaluation from an empty stack and a default transaction context.
    pub fn with_vm(
        environment: &'a CompilationEnvironment,
        data: &'a CompilationData,
        vm: &'a BchVm,
    ) -> Self {
        Self {
            environment,
            data,
            vm: Some(vm),
            create_state: Some(Box::new(|instructions| {
                ProgramState::new(instructions, Vec::new(), TransactionContext::default())
            })),
        }
    }

    /// Replace the evaluation state factory (e.g. to supply transaction
    /// context to compile-time evaluations).
    pub fn with_state_factory(mut self, create_state: StateFactory) -> Self {
        self.create_state = Some(create_state);
        self
    }

    /// Resolve a single identifier against the environment.
    pub fn resolve_identifier(
        &self,
        identifier: &str,
    ) -> Result<crate::resolver::ResolvedIdentifier, crate::resolver::ResolveError> {
        crate::resolver::resolve_identifier(self, identifier, &[])
    }

    /// Compile a named script from the environment's script table.
    pub fn compile_script(&self, script_id: &str) -> Result<CompilationOutput, CompilationFailure> {
        let Some(source) = self.environment.scripts.get(script_id) else {
            return Err(CompilationFailure {
                errors: vec![CompileError::resolve(
                    Range::default(),
                    format!(
                        "No script with the identifier \"{script_id}\" exists in this \
                         compilation environment."
                    ),
                )],
                resolved: None,
                bytecode: Vec::new(),
            });
        };
        self.compile_internal(source, &[script_id.to_string()])
    }

    /// Compile BTL source text directly.
    pub fn compile_source(&self, source: &str) -> Result<CompilationOutput, CompilationFailure> {
        self.compile_internal(source, &[])
    }

    /// Compile a nested script referenced during resolution.
    pub(crate) fn compile_nested(
        &self,
        script_id: &str,
        source_script_ids: &[String],
    ) -> Result<CompilationOutput, CompilationFailure> {
        let Some(source) = self.environment.scripts.get(script_id) else {
            // Resolution only recurses into identifiers found in the script
            // table, so this is unreachable in practice.
            return Err(CompilationFailure {
                errors: vec![CompileError::resolve(
                    Range::default(),
                    format!("Unknown script \"{script_id}\"."),
                )],
                resolved: None,
                bytecode: Vec::new(),
            });
        };
        let mut chain = source_script_ids.to_vec();
        chain.push(script_id.to_string());
        self.compile_internal(source, &chain)
    }

    fn compile_internal(
        &self,
        source: &str,
        source_script_ids: &[String],
    ) -> Result<CompilationOutput, CompilationFailure> {
        let parsed = match parse_script(source) {
            Ok(parsed) => parsed,
            Err(errors) => {
                return Err(CompilationFailure {
                    errors,
                    resolved: None,
                    bytecode: Vec::new(),
                })
            }
        };
        debug!(segments = parsed.segments.len(), "parsed script");
        let resolved =
            resolve_script_segments(&parsed.segments, parsed.range, self, source_script_ids);
        let reduction = reduce_script(&resolved, self);
        if reduction.errors.is_empty() {
            Ok(CompilationOutput {
                bytecode: reduction.bytecode.clone(),
                parsed,
                resolved,
                reduction,
            })
        } else {
            Err(CompilationFailure {
                errors: reduction.errors.clone(),
                resolved: Some(resolved),
                bytecode: reduction.bytecode,
            })
        }
    }
}
