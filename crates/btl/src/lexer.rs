//! Lexical analysis for the Bitauth Template Language.
//!
//! Tokenization uses logos. Comments are real tokens (the parse tree keeps
//! them for tooling); only whitespace is skipped.

use logos::Logos;

/// A BTL token.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    /// `<` opens a push.
    #[token("<")]
    PushOpen,

    /// `>` closes a push.
    #[token(">")]
    PushClose,

    /// `$(` opens a compile-time evaluation.
    #[token("$(")]
    EvaluationOpen,

    /// `)` closes a compile-time evaluation.
    #[token(")")]
    EvaluationClose,

    /// An identifier, with optional dotted operation segments.
    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*", |lex| lex.slice().to_owned())]
    Identifier(String),

    /// A hex literal; the value excludes the `0x` prefix.
    #[regex(r"0x[0-9A-Fa-f]*", |lex| lex.slice()[2..].to_owned())]
    HexLiteral(String),

    /// A decimal integer literal (arbitrary precision).
    #[regex(r"-?[0-9]+", |lex| lex.slice().to_owned())]
    IntegerLiteral(String),

    /// A UTF-8 literal in double quotes.
    #[regex(r#""[^"]*""#, |lex| trim_delimiters(lex.slice(), 1))]
    DoubleQuotedLiteral(String),

    /// A UTF-8 literal in single quotes.
    #[regex(r"'[^']*'", |lex| trim_delimiters(lex.slice(), 1))]
    SingleQuotedLiteral(String),

    /// A `//` comment, value excludes the delimiter.
    #[regex(r"//[^\n]*", |lex| trim_line_comment(lex.slice()))]
    LineComment(String),

    /// A `/* */` comment, value excludes the delimiters.
    #[regex(r"/\*[^*]*\*+(?:[^*/][^*]*\*+)*/", |lex| trim_block_comment(lex.slice()))]
    BlockComment(String),
}

impl Token {
    /// Short description used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::PushOpen => "'<'".to_string(),
            Token::PushClose => "'>'".to_string(),
            Token::EvaluationOpen => "'$('".to_string(),
            Token::EvaluationClose => "')'".to_string(),
            Token::Identifier(name) => format!("identifier '{name}'"),
            Token::HexLiteral(value) => format!("hex literal '0x{value}'"),
            Token::IntegerLiteral(value) => format!("integer literal '{value}'"),
            Token::DoubleQuotedLiteral(value) | Token::SingleQuotedLiteral(value) => {
                format!("string literal '{value}'")
            }
            Token::LineComment(_) | Token::BlockComment(_) => "comment".to_string(),
        }
    }
}

fn trim_delimiters(slice: &str, width: usize) -> String {
    slice[width..slice.len() - width].to_owned()
}

fn trim_line_comment(slice: &str) -> String {
    slice[2..].trim().to_owned()
}

fn trim_block_comment(slice: &str) -> String {
    slice[2..slice.len() - 2].trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Token::lexer(source)
            .map(|token| token.expect("valid token"))
            .collect()
    }

    #[test]
    fn test_lex_structure() {
        assert_eq!(
            lex("<abc> $(OP_1)"),
            vec![
                Token::PushOpen,
                Token::Identifier("abc".to_string()),
                Token::PushClose,
                Token::EvaluationOpen,
                Token::Identifier("OP_1".to_string()),
                Token::EvaluationClose,
            ]
        );
    }

    #[test]
    fn test_lex_literals() {
        assert_eq!(
            lex("0xDEADbeef 42 -7 \"hi\" 'yo'"),
            vec![
                Token::HexLiteral("DEADbeef".to_string()),
                Token::IntegerLiteral("42".to_string()),
                Token::IntegerLiteral("-7".to_string()),
                Token::DoubleQuotedLiteral("hi".to_string()),
                Token::SingleQuotedLiteral("yo".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_dotted_identifier() {
        assert_eq!(
            lex("key.signature.all_outputs"),
            vec![Token::Identifier("key.signature.all_outputs".to_string())]
        );
    }

    #[test]
    fn test_lex_comments_are_tokens() {
        assert_eq!(
            lex("// line\n/* block */"),
            vec![
                Token::LineComment("line".to_string()),
                Token::BlockComment("block".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_block_comment_with_stars() {
        assert_eq!(
            lex("/* a * b **/"),
            vec![Token::BlockComment("a * b *".to_string())]
        );
    }

    #[test]
    fn test_hex_prefers_longest_match() {
        assert_eq!(lex("0x00"), vec![Token::HexLiteral("00".to_string())]);
        // A bare prefix still lexes as a (empty) hex literal; the parser
        // rejects it.
        assert_eq!(lex("0x"), vec![Token::HexLiteral(String::new())]);
    }

    #[test]
    fn test_invalid_character_is_an_error() {
        let results: Vec<_> = Token::lexer("@").collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
