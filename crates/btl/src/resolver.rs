//! Identifier resolution.
//!
//! Resolution order is deterministic, first match wins: opcode identifiers,
//! then variables (built-ins and declared, through their operation tables),
//! then nested scripts, which are compiled recursively with cycle detection
//! over the explicit `source_script_ids` chain.

use crate::ast::{BytecodeSource, LiteralType, ResolvedScript, ResolvedSegment, ScriptSegment};
use crate::compiler::Compiler;
use crate::environment::{OperationsTable, VariableType};
use crate::error::format_errors;
use crate::range::Range;

use bitauth_vm::encode_bigint;

/// What an identifier resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Opcode,
    Variable,
    Script,
}

/// A successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedIdentifier {
    pub bytecode: Vec<u8>,
    pub kind: IdentifierKind,
    /// For script identifiers, the nested compilation's resolved tree.
    pub source: Option<ResolvedScript>,
}

/// The phase in which resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveErrorKind {
    UnknownIdentifier,
    Variable,
    Script,
}

/// A failed resolution.
#[derive(Debug, Clone)]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    pub message: String,
    pub script_id: Option<String>,
}

/// Resolve one identifier against the environment.
pub(crate) fn resolve_identifier(
    compiler: &Compiler<'_>,
    identifier: &str,
    source_script_ids: &[String],
) -> Result<ResolvedIdentifier, ResolveError> {
    if let Some(&opcode) = compiler.environment.opcodes.get(identifier) {
        return Ok(ResolvedIdentifier {
            bytecode: vec![opcode],
            kind: IdentifierKind::Opcode,
            source: None,
        });
    }
    if let Some(result) = resolve_variable(compiler, identifier) {
        return match result {
            Ok(bytecode) => Ok(ResolvedIdentifier {
                bytecode,
                kind: IdentifierKind::Variable,
                source: None,
            }),
            Err(message) => Err(ResolveError {
                kind: ResolveErrorKind::Variable,
                message,
                script_id: None,
            }),
        };
    }
    if compiler.environment.scripts.contains_key(identifier) {
        return resolve_script(compiler, identifier, source_script_ids);
    }
    Err(ResolveError {
        kind: ResolveErrorKind::UnknownIdentifier,
        message: format!("Unknown identifier '{identifier}'."),
        script_id: None,
    })
}

/// Try to resolve `identifier` as a variable reference.
///
/// Returns `None` when the identifier does not name a built-in or declared
/// variable, so resolution can continue with scripts.
fn resolve_variable(
    compiler: &Compiler<'_>,
    identifier: &str,
) -> Option<Result<Vec<u8>, String>> {
    let (variable_id, operation_id) = match identifier.split_once('.') {
        Some((variable_id, operation_id)) => (variable_id, Some(operation_id)),
        None => (identifier, None),
    };
    let operations = &compiler.environment.operations;
    let (type_name, table) = match variable_id {
        "current_block_height" => (
            "current_block_height",
            operations.current_block_height.as_ref(),
        ),
        "current_block_time" => ("current_block_time", operations.current_block_time.as_ref()),
        "signing_serialization" => (
            "signing_serialization",
            operations.signing_serialization.as_ref(),
        ),
        _ => {
            let variable = compiler.environment.variables.get(variable_id)?;
            let table = match variable.variable_type {
                VariableType::Key => operations.key.as_ref(),
                VariableType::HdKey => operations.hd_key.as_ref(),
                VariableType::AddressData => operations.address_data.as_ref(),
                VariableType::WalletData => operations.wallet_data.as_ref(),
            };
            (variable.variable_type.name(), table)
        }
    };
    Some(dispatch_operation(
        compiler,
        identifier,
        variable_id,
        operation_id,
        type_name,
        table,
    ))
}

fn dispatch_operation(
    compiler: &Compiler<'_>,
    identifier: &str,
    variable_id: &str,
    operation_id: Option<&str>,
    type_name: &str,
    table: Option<&OperationsTable>,
) -> Result<Vec<u8>, String> {
    let Some(table) = table else {
        return Err(format!(
            "Identifier \"{identifier}\" refers to a {type_name} variable, but the \
             \"{type_name}\" operation type is not included in this compilation environment."
        ));
    };
    match table {
        OperationsTable::Direct(operation) => {
            operation(identifier, compiler.data, compiler.environment)
        }
        OperationsTable::ById(operations) => {
            let Some(operation_id) = operation_id else {
                let example = operations
                    .keys()
                    .next()
                    .map(String::as_str)
                    .unwrap_or("operation");
                return Err(format!(
                    "The identifier \"{variable_id}\" requires an operation identifier, \
                     e.g. '{variable_id}.{example}'."
                ));
            };
            let Some(operation) = operations.get(operation_id) else {
                return Err(format!(
                    "The identifier \"{identifier}\" refers to a {type_name} operation \
                     \"{operation_id}\" which is not available to this compilation environment."
                ));
            };
            operation(identifier, compiler.data, compiler.environment)
        }
    }
}

/// Resolve a nested script identifier by compiling it.
fn resolve_script(
    compiler: &Compiler<'_>,
    script_id: &str,
    source_script_ids: &[String],
) -> Result<ResolvedIdentifier, ResolveError> {
    if source_script_ids.iter().any(|id| id == script_id) {
        let chain = source_script_ids
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(script_id))
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(ResolveError {
            kind: ResolveErrorKind::Script,
            message: format!(
                "Circular dependency: the script \"{script_id}\" is already being compiled. \
                 Resolution chain: {chain}."
            ),
            script_id: Some(script_id.to_string()),
        });
    }
    match compiler.compile_nested(script_id, source_script_ids) {
        Ok(output) => Ok(ResolvedIdentifier {
            bytecode: output.bytecode,
            kind: IdentifierKind::Script,
            source: Some(output.resolved),
        }),
        Err(failure) => Err(ResolveError {
            kind: ResolveErrorKind::Script,
            message: format!(
                "Compilation error in resolved script \"{script_id}\": {}",
                format_errors(&failure.errors)
            ),
            script_id: Some(script_id.to_string()),
        }),
    }
}

/// Build the resolved tree for a list of parsed segments.
///
/// An empty segment list resolves to a single empty comment spanning the
/// parent's range, so reduction always sees at least one ranged node.
pub(crate) fn resolve_script_segments(
    segments: &[ScriptSegment],
    parent_range: Range,
    compiler: &Compiler<'_>,
    source_script_ids: &[String],
) -> ResolvedScript {
    if segments.is_empty() {
        return vec![ResolvedSegment::Comment {
            value: String::new(),
            range: parent_range,
        }];
    }
    segments
        .iter()
        .map(|segment| resolve_segment(segment, compiler, source_script_ids))
        .collect()
}

fn resolve_segment(
    segment: &ScriptSegment,
    compiler: &Compiler<'_>,
    source_script_ids: &[String],
) -> ResolvedSegment {
    match segment {
        ScriptSegment::Identifier { name, range } => {
            match resolve_identifier(compiler, name, source_script_ids) {
                Ok(resolved) => ResolvedSegment::Bytecode {
                    value: resolved.bytecode,
                    source: match resolved.kind {
                        IdentifierKind::Opcode => BytecodeSource::Opcode {
                            opcode: name.clone(),
                        },
                        IdentifierKind::Variable => BytecodeSource::Variable {
                            variable: name.clone(),
                        },
                        IdentifierKind::Script => BytecodeSource::Script {
                            script: name.clone(),
                            source: resolved.source.unwrap_or_default(),
                        },
                    },
                    range: *range,
                },
                Err(error) => ResolvedSegment::Error {
                    value: error.message,
                    range: *range,
                },
            }
        }
        ScriptSegment::Push { segments, range } => ResolvedSegment::Push {
            value: resolve_script_segments(segments, *range, compiler, source_script_ids),
            range: *range,
        },
        ScriptSegment::Evaluation { segments, range } => ResolvedSegment::Evaluation {
            value: resolve_script_segments(segments, *range, compiler, source_script_ids),
            range: *range,
        },
        ScriptSegment::BigIntLiteral { value, range } => ResolvedSegment::Bytecode {
            value: encode_bigint(value),
            source: BytecodeSource::Literal {
                literal_type: LiteralType::BigIntLiteral,
            },
            range: *range,
        },
        ScriptSegment::HexLiteral { value, range } => match hex::decode(value) {
            Ok(bytes) => ResolvedSegment::Bytecode {
                value: bytes,
                source: BytecodeSource::Literal {
                    literal_type: LiteralType::HexLiteral,
                },
                range: *range,
            },
            Err(_) => ResolvedSegment::Error {
                value: format!("Invalid hex literal '0x{value}'."),
                range: *range,
            },
        },
        ScriptSegment::Utf8Literal { value, range } => ResolvedSegment::Bytecode {
            value: value.as_bytes().to_vec(),
            source: BytecodeSource::Literal {
                literal_type: LiteralType::Utf8Literal,
            },
            range: *range,
        },
        ScriptSegment::Comment { value, range } => ResolvedSegment::Comment {
            value: value.clone(),
            range: *range,
        },
    }
}
