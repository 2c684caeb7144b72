//! Hand-written recursive descent parser for BTL.
//!
//! The token stream is produced by the logos lexer; this module tracks
//! byte-span to line/column conversion and builds the ranged
//! [`ScriptSegment`] tree.

use num_bigint::BigInt;

use crate::ast::{ParsedScript, ScriptSegment};
use crate::error::CompileError;
use crate::lexer::Token;
use crate::range::{LineIndex, Range};

/// Parse BTL source into a ranged segment tree.
pub fn parse_script(source: &str) -> Result<ParsedScript, Vec<CompileError>> {
    let index = LineIndex::new(source);
    let tokens = lex(source, &index)?;
    let mut stream = TokenStream::new(&tokens);
    let segments = parse_segments(&mut stream, None)?;
    Ok(ParsedScript {
        segments,
        range: index.full_range(),
    })
}

fn lex(source: &str, index: &LineIndex<'_>) -> Result<Vec<(Token, Range)>, Vec<CompileError>> {
    use logos::Logos;

    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let range = index.range(lexer.span());
        match result {
            Ok(token) => tokens.push((token, range)),
            Err(()) => {
                return Err(vec![CompileError::parse(
                    range,
                    format!("unrecognized character sequence '{}'", lexer.slice()),
                )])
            }
        }
    }
    Ok(tokens)
}

/// Token stream with single-token lookahead.
struct TokenStream<'t> {
    tokens: &'t [(Token, Range)],
    position: usize,
}

impl<'t> TokenStream<'t> {
    fn new(tokens: &'t [(Token, Range)]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn peek(&self) -> Option<&(Token, Range)> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&(Token, Range)> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Range of the end of input (after the final token).
    fn end_range(&self) -> Range {
        self.tokens
            .last()
            .map(|(_, range)| Range {
                start_line: range.end_line,
                start_column: range.end_column,
                end_line: range.end_line,
                end_column: range.end_column,
            })
            .unwrap_or_default()
    }
}

/// Which grouping construct is currently open.
#[derive(Clone, Copy, PartialEq)]
enum Grouping {
    Push,
    Evaluation,
}

impl Grouping {
    fn closer(self) -> Token {
        match self {
            Grouping::Push => Token::PushClose,
            Grouping::Evaluation => Token::EvaluationClose,
        }
    }

    fn description(self) -> &'static str {
        match self {
            Grouping::Push => "push ('<')",
            Grouping::Evaluation => "evaluation ('$(')",
        }
    }
}

/// Parse segments until the terminator (or end of input at the top level).
///
/// Returns the segments and leaves the terminating token consumed; the
/// caller receives its range through `parse_grouped`.
fn parse_segments(
    stream: &mut TokenStream<'_>,
    terminator: Option<Grouping>,
) -> Result<Vec<ScriptSegment>, Vec<CompileError>> {
    let mut segments = Vec::new();
    loop {
        let Some((token, range)) = stream.peek().cloned().map(|(t, r)| (t, r)) else {
            return match terminator {
                None => Ok(segments),
                Some(grouping) => Err(vec![CompileError::parse(
                    stream.end_range(),
                    format!("unexpected end of script inside {}", grouping.description()),
                )]),
            };
        };
        match token {
            Token::PushOpen => {
                stream.advance();
                let segment = parse_grouped(stream, Grouping::Push, range)?;
                segments.push(segment);
            }
            Token::EvaluationOpen => {
                stream.advance();
                let segment = parse_grouped(stream, Grouping::Evaluation, range)?;
                segments.push(segment);
            }
            Token::PushClose | Token::EvaluationClose => {
                if terminator.map(Grouping::closer) == Some(token.clone()) {
                    stream.advance();
                    return Ok(segments);
                }
                return Err(vec![CompileError::parse(
                    range,
                    format!("unexpected {}", token.describe()),
                )]);
            }
            other => {
                stream.advance();
                segments.push(leaf_segment(other, range)?);
            }
        }
    }
}

fn parse_grouped(
    stream: &mut TokenStream<'_>,
    grouping: Grouping,
    open_range: Range,
) -> Result<ScriptSegment, Vec<CompileError>> {
    let close_range = stream
        .tokens
        .get(find_closer_position(stream, grouping)?)
        .map(|(_, range)| *range);
    let segments = parse_segments(stream, Some(grouping))?;
    let range = match close_range {
        Some(close) => open_range.merge(&close),
        None => open_range,
    };
    Ok(match grouping {
        Grouping::Push => ScriptSegment::Push { segments, range },
        Grouping::Evaluation => ScriptSegment::Evaluation { segments, range },
    })
}

/// Locate the matching closer for the just-opened grouping, for range
/// bookkeeping. Nesting of both grouping kinds is tracked together.
fn find_closer_position(
    stream: &TokenStream<'_>,
    grouping: Grouping,
) -> Result<usize, Vec<CompileError>> {
    let mut depth = 0usize;
    for (offset, (token, _)) in stream.tokens[stream.position..].iter().enumerate() {
        match token {
            Token::PushOpen | Token::EvaluationOpen => depth += 1,
            Token::PushClose | Token::EvaluationClose => {
                if depth == 0 {
                    return Ok(stream.position + offset);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Err(vec![CompileError::parse(
        stream.end_range(),
        format!("unexpected end of script inside {}", grouping.description()),
    )])
}

fn leaf_segment(token: Token, range: Range) -> Result<ScriptSegment, Vec<CompileError>> {
    Ok(match token {
        Token::Identifier(name) => ScriptSegment::Identifier { name, range },
        Token::IntegerLiteral(digits) => {
            let value = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(|| {
                vec![CompileError::parse(
                    range,
                    format!("invalid integer literal '{digits}'"),
                )]
            })?;
            ScriptSegment::BigIntLiteral { value, range }
        }
        Token::HexLiteral(digits) => {
            if digits.is_empty() {
                return Err(vec![CompileError::parse(
                    range,
                    "hex literal requires at least one byte",
                )]);
            }
            if digits.len() % 2 != 0 {
                return Err(vec![CompileError::parse(
                    range,
                    format!("hex literal '0x{digits}' has an odd number of digits"),
                )]);
            }
            ScriptSegment::HexLiteral {
                value: digits,
                range,
            }
        }
        Token::DoubleQuotedLiteral(value) | Token::SingleQuotedLiteral(value) => {
            ScriptSegment::Utf8Literal { value, range }
        }
        Token::LineComment(value) | Token::BlockComment(value) => {
            ScriptSegment::Comment { value, range }
        }
        Token::PushOpen
        | Token::PushClose
        | Token::EvaluationOpen
        | Token::EvaluationClose => {
            // Grouping tokens are handled by parse_segments.
            return Err(vec![CompileError::parse(
                range,
                format!("unexpected {}", token.describe()),
            )]);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedScript {
        parse_script(source).expect("parse succeeds")
    }

    fn parse_error(source: &str) -> CompileError {
        parse_script(source).expect_err("parse fails")[0].clone()
    }

    #[test]
    fn test_parse_hex_literal() {
        let parsed = parse("0x0102");
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(
            parsed.segments[0],
            ScriptSegment::HexLiteral {
                value: "0102".to_string(),
                range: Range {
                    start_line: 1,
                    start_column: 1,
                    end_line: 1,
                    end_column: 7,
                },
            }
        );
    }

    #[test]
    fn test_parse_push_of_string() {
        let parsed = parse("<'abc'>");
        let ScriptSegment::Push { segments, range } = &parsed.segments[0] else {
            panic!("expected push");
        };
        assert_eq!(
            segments[0],
            ScriptSegment::Utf8Literal {
                value: "abc".to_string(),
                range: Range {
                    start_line: 1,
                    start_column: 2,
                    end_line: 1,
                    end_column: 7,
                },
            }
        );
        assert_eq!(range.start_column, 1);
        assert_eq!(range.end_column, 8);
    }

    #[test]
    fn test_parse_nested_evaluation() {
        let parsed = parse("$(<1> <2> OP_ADD)");
        let ScriptSegment::Evaluation { segments, .. } = &parsed.segments[0] else {
            panic!("expected evaluation");
        };
        assert_eq!(segments.len(), 3);
        assert!(matches!(segments[0], ScriptSegment::Push { .. }));
        assert!(matches!(
            &segments[2],
            ScriptSegment::Identifier { name, .. } if name == "OP_ADD"
        ));
    }

    #[test]
    fn test_parse_negative_integer() {
        let parsed = parse("-42");
        assert!(matches!(
            &parsed.segments[0],
            ScriptSegment::BigIntLiteral { value, .. } if *value == BigInt::from(-42)
        ));
    }

    #[test]
    fn test_parse_comments_retained() {
        let parsed = parse("// note\nOP_1 /* inline */");
        assert_eq!(parsed.segments.len(), 3);
        assert!(matches!(
            &parsed.segments[0],
            ScriptSegment::Comment { value, .. } if value == "note"
        ));
        assert!(matches!(
            &parsed.segments[2],
            ScriptSegment::Comment { value, .. } if value == "inline"
        ));
    }

    #[test]
    fn test_parse_empty_source() {
        let parsed = parse("");
        assert!(parsed.segments.is_empty());
        assert_eq!(parsed.range, Range::default());
    }

    #[test]
    fn test_error_unterminated_push() {
        let error = parse_error("<0x01");
        assert!(error.message.contains("unexpected end of script"));
        assert!(error.message.contains("push"));
    }

    #[test]
    fn test_error_stray_closer() {
        let error = parse_error("0x01 >");
        assert!(error.message.contains("unexpected '>'"));
        assert_eq!(error.range.start_column, 6);
    }

    #[test]
    fn test_error_mismatched_closer() {
        let error = parse_error("<0x01)");
        assert!(error.message.contains("unexpected ')'"));
    }

    #[test]
    fn test_error_odd_hex() {
        let error = parse_error("0x123");
        assert!(error.message.contains("odd number of digits"));
    }

    #[test]
    fn test_error_empty_hex() {
        let error = parse_error("0x");
        assert!(error.message.contains("at least one byte"));
    }

    #[test]
    fn test_multiline_ranges() {
        let parsed = parse("OP_1\nOP_2");
        assert_eq!(parsed.segments[1].range().start_line, 2);
        assert_eq!(parsed.segments[1].range().start_column, 1);
        assert_eq!(parsed.range.end_line, 2);
        assert_eq!(parsed.range.end_column, 5);
    }
}
