//! Parse-tree and resolved-tree nodes.
//!
//! Both trees are immutable values; every node carries the source [`Range`]
//! it came from so that later phases can report accurate locations.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::range::Range;

/// A node of the BTL parse tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptSegment {
    /// An identifier to be resolved against the compilation environment.
    Identifier { name: String, range: Range },
    /// `<...>`: the child script's bytes, wrapped in a minimal data push.
    Push {
        segments: Vec<ScriptSegment>,
        range: Range,
    },
    /// `$(...)`: the child script is evaluated at compile time; the top of
    /// the final stack becomes this segment's bytecode.
    Evaluation {
        segments: Vec<ScriptSegment>,
        range: Range,
    },
    /// A decimal integer literal, encoded as a script number.
    BigIntLiteral { value: BigInt, range: Range },
    /// A hex literal; the value holds the digits without the `0x` prefix.
    HexLiteral { value: String, range: Range },
    /// A quoted UTF-8 literal.
    Utf8Literal { value: String, range: Range },
    /// A comment, retained for tooling.
    Comment { value: String, range: Range },
}

impl ScriptSegment {
    pub fn range(&self) -> Range {
        match self {
            ScriptSegment::Identifier { range, .. }
            | ScriptSegment::Push { range, .. }
            | ScriptSegment::Evaluation { range, .. }
            | ScriptSegment::BigIntLiteral { range, .. }
            | ScriptSegment::HexLiteral { range, .. }
            | ScriptSegment::Utf8Literal { range, .. }
            | ScriptSegment::Comment { range, .. } => *range,
        }
    }
}

/// A parsed script: its segments plus the range of the whole source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedScript {
    pub segments: Vec<ScriptSegment>,
    pub range: Range,
}

/// The literal kind behind a resolved bytecode segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralType {
    BigIntLiteral,
    HexLiteral,
    Utf8Literal,
}

/// Where a resolved bytecode segment's bytes came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BytecodeSource {
    Literal { literal_type: LiteralType },
    Opcode { opcode: String },
    Variable { variable: String },
    Script { script: String, source: ResolvedScript },
}

/// A node of the resolved tree.
///
/// An identifier resolves to either a `Bytecode` segment or an `Error`
/// segment, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedSegment {
    Bytecode {
        value: Vec<u8>,
        source: BytecodeSource,
        range: Range,
    },
    Push {
        value: ResolvedScript,
        range: Range,
    },
    Evaluation {
        value: ResolvedScript,
        range: Range,
    },
    Comment {
        value: String,
        range: Range,
    },
    Error {
        value: String,
        range: Range,
    },
}

impl ResolvedSegment {
    pub fn range(&self) -> Range {
        match self {
            ResolvedSegment::Bytecode { range, .. }
            | ResolvedSegment::Push { range, .. }
            | ResolvedSegment::Evaluation { range, .. }
            | ResolvedSegment::Comment { range, .. }
            | ResolvedSegment::Error { range, .. } => *range,
        }
    }
}

/// The resolved form of a script: an ordered sequence of segments.
pub type ResolvedScript = Vec<ResolvedSegment>;
