//! Script reduction.
//!
//! Folds a resolved tree into a single bytecode blob. Non-push bytecode
//! segments concatenate verbatim; `Push` wraps its child in a minimal data
//! push; `Evaluation` runs the child bytecode on the virtual machine and
//! splices in the top item of the final stack. Errors accumulate while
//! reduction continues best-effort.

use tracing::debug;

use crate::ast::{ResolvedScript, ResolvedSegment};
use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::range::{merge_ranges, Range};

use bitauth_vm::{
    disassemble_instructions, encode_data_push, instructions_are_malformed, parse_bytecode,
};

/// The reduction of one resolved node (and, transitively, its children).
#[derive(Debug, Clone)]
pub struct ScriptReductionTrace {
    pub bytecode: Vec<u8>,
    pub range: Range,
    pub source: Vec<ScriptReductionTrace>,
    pub errors: Vec<CompileError>,
}

impl ScriptReductionTrace {
    fn leaf(bytecode: Vec<u8>, range: Range) -> Self {
        Self {
            bytecode,
            range,
            source: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Reduce a resolved script to bytecode.
pub(crate) fn reduce_script(
    resolved: &ResolvedScript,
    compiler: &Compiler<'_>,
) -> ScriptReductionTrace {
    let nodes: Vec<ScriptReductionTrace> = resolved
        .iter()
        .map(|segment| reduce_segment(segment, compiler))
        .collect();

    let bytecode = nodes
        .iter()
        .flat_map(|node| node.bytecode.iter().copied())
        .collect();
    let range = merge_ranges(&nodes.iter().map(|node| node.range).collect::<Vec<_>>());
    let errors = nodes
        .iter()
        .flat_map(|node| node.errors.iter().cloned())
        .collect();
    ScriptReductionTrace {
        bytecode,
        range,
        source: nodes,
        errors,
    }
}

fn reduce_segment(segment: &ResolvedSegment, compiler: &Compiler<'_>) -> ScriptReductionTrace {
    match segment {
        ResolvedSegment::Bytecode { value, range, .. } => {
            ScriptReductionTrace::leaf(value.clone(), *range)
        }
        ResolvedSegment::Comment { range, .. } => ScriptReductionTrace::leaf(Vec::new(), *range),
        ResolvedSegment::Error { value, range } => ScriptReductionTrace {
            bytecode: Vec::new(),
            range: *range,
            source: Vec::new(),
            errors: vec![CompileError::resolve(*range, value.clone())],
        },
        ResolvedSegment::Push { value, range } => {
            let inner = reduce_script(value, compiler);
            ScriptReductionTrace {
                bytecode: encode_data_push(&inner.bytecode),
                range: *range,
                errors: inner.errors.clone(),
                source: vec![inner],
            }
        }
        ResolvedSegment::Evaluation { value, range } => {
            let inner = reduce_script(value, compiler);
            let mut errors = inner.errors.clone();
            let bytecode = if errors.is_empty() {
                evaluate_inline(&inner.bytecode, *range, compiler, &mut errors)
            } else {
                Vec::new()
            };
            ScriptReductionTrace {
                bytecode,
                range: *range,
                errors,
                source: vec![inner],
            }
        }
    }
}

/// Run an evaluation's aggregated bytecode and return the top stack item of
/// the final state (empty when the stack is empty).
fn evaluate_inline(
    bytecode: &[u8],
    range: Range,
    compiler: &Compiler<'_>,
    errors: &mut Vec<CompileError>,
) -> Vec<u8> {
    let (Some(vm), Some(create_state)) = (compiler.vm, compiler.create_state.as_ref()) else {
        errors.push(CompileError::reduce(
            range,
            "Both a virtual machine and a state factory are required to reduce evaluations.",
        ));
        return Vec::new();
    };
    let instructions = parse_bytecode(bytecode);
    if instructions_are_malformed(&instructions) {
        errors.push(CompileError::reduce(
            range,
            format!(
                "The bytecode generated within this evaluation is malformed: {}",
                disassemble_instructions(&instructions)
            ),
        ));
        return Vec::new();
    }
    let samples = vm.debug(create_state(instructions));
    let Some(final_state) = samples.last() else {
        errors.push(CompileError::reduce(range, "Evaluation produced no states."));
        return Vec::new();
    };
    if let Some(error) = &final_state.error {
        errors.push(CompileError::reduce(
            range,
            format!("Failed evaluation: {error}."),
        ));
        return Vec::new();
    }
    debug!(stack_depth = final_state.stack.len(), "inline evaluation complete");
    final_state.stack.last().cloned().unwrap_or_default()
}
