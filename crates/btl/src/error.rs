//! Compilation diagnostics.
//!
//! Compiler errors are plain values collected into lists; each carries the
//! phase that produced it and the source range it refers to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::range::Range;

/// The compiler phase that detected an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Tokenization or syntax error.
    Parse,
    /// Identifier resolution error (unknown identifier, bad operation,
    /// circular script dependency).
    Resolve,
    /// Script reduction error (failed or unavailable evaluation, malformed
    /// generated bytecode).
    Reduce,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse error",
            ErrorKind::Resolve => "resolution error",
            ErrorKind::Reduce => "reduction error",
        }
    }
}

/// A single diagnostic with its source range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub range: Range,
    pub message: String,
}

impl CompileError {
    pub fn parse(range: Range, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            range,
            message: message.into(),
        }
    }

    pub fn resolve(range: Range, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Resolve,
            range,
            message: message.into(),
        }
    }

    pub fn reduce(range: Range, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Reduce,
            range,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}: {} [{}:{}]",
            self.kind.name(),
            self.message,
            self.range.start_line,
            self.range.start_column
        )
    }
}

impl std::error::Error for CompileError {}

/// Join several diagnostics into a single human-readable string.
pub fn format_errors(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(CompileError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_position() {
        let error = CompileError::resolve(
            Range {
                start_line: 3,
                start_column: 7,
                end_line: 3,
                end_column: 12,
            },
            "unknown identifier 'foo'",
        );
        assert_eq!(
            error.to_string(),
            "resolution error: unknown identifier 'foo' [3:7]"
        );
    }
}
