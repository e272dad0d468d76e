// Lexer for `.ir` program files.
//
// Tokenizes the text written by `emit.rs`. Uses the `logos` crate for
// DFA-based lexing; whitespace (including newlines) and `//` comments are
// insignificant.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// `.ir` token types.
///
/// References (`%3`, `#12`, `&0`) carry their index. Identifiers carry no
/// value; use the span to retrieve the text from the source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("irsmith-ir")]
    Header,
    #[token("seed")]
    Seed,
    #[token("types")]
    Types,
    #[token("func")]
    Func,
    #[token("prim")]
    Prim,
    #[token("struct")]
    Struct,
    #[token("union")]
    Union,
    #[token("ptr")]
    Ptr,
    #[token("size")]
    Size,
    #[token("at")]
    At,

    // ── Symbols ──
    #[token("->")]
    Arrow,
    #[token("@")]
    AtSign,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,

    // ── References ──
    /// Node reference `%N`.
    #[regex(r"%[0-9]+", parse_ref)]
    NodeRef(u32),

    /// Type reference `#N`.
    #[regex(r"#[0-9]+", parse_ref)]
    TypeRef(u32),

    /// Entity reference `&N`.
    #[regex(r"&[0-9]+", parse_ref)]
    EntityRef(u32),

    // ── Literals ──
    /// Integer literal, possibly negative. Wide enough for every mode.
    #[regex(r"-?[0-9]+", parse_int)]
    Int(i128),

    // ── Identifier ──
    //
    // Keywords win over this regex for equal-length matches; longer
    // identifiers such as `struct_0` still lex as Ident.
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Header => write!(f, "irsmith-ir"),
            Token::Seed => write!(f, "seed"),
            Token::Types => write!(f, "types"),
            Token::Func => write!(f, "func"),
            Token::Prim => write!(f, "prim"),
            Token::Struct => write!(f, "struct"),
            Token::Union => write!(f, "union"),
            Token::Ptr => write!(f, "ptr"),
            Token::Size => write!(f, "size"),
            Token::At => write!(f, "at"),
            Token::Arrow => write!(f, "->"),
            Token::AtSign => write!(f, "@"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::NodeRef(n) => write!(f, "%{n}"),
            Token::TypeRef(n) => write!(f, "#{n}"),
            Token::EntityRef(n) => write!(f, "&{n}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_ref(lex: &mut logos::Lexer<'_, Token>) -> Option<u32> {
    lex.slice()[1..].parse().ok()
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i128> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex an `.ir` string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(result.errors.is_empty(), "lex errors: {:?}", result.errors);
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn header_and_seed() {
        assert_eq!(
            tokens("irsmith-ir 1\nseed 18446744073709551615"),
            vec![
                Token::Header,
                Token::Int(1),
                Token::Seed,
                Token::Int(u64::MAX as i128),
            ]
        );
    }

    #[test]
    fn references() {
        assert_eq!(
            tokens("%12 #3 &0"),
            vec![Token::NodeRef(12), Token::TypeRef(3), Token::EntityRef(0)]
        );
    }

    #[test]
    fn node_line() {
        assert_eq!(
            tokens("%9 = Const[-1] Is @%0 ()"),
            vec![
                Token::NodeRef(9),
                Token::Equals,
                Token::Ident,
                Token::LBracket,
                Token::Int(-1),
                Token::RBracket,
                Token::Ident,
                Token::AtSign,
                Token::NodeRef(0),
                Token::LParen,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn keywords_vs_identifiers() {
        assert_eq!(
            tokens("struct struct_0 union_3 at size"),
            vec![
                Token::Struct,
                Token::Ident,
                Token::Ident,
                Token::At,
                Token::Size,
            ]
        );
    }

    #[test]
    fn arrow_and_negative_int() {
        assert_eq!(
            tokens("() -> (Is) -5"),
            vec![
                Token::LParen,
                Token::RParen,
                Token::Arrow,
                Token::LParen,
                Token::Ident,
                Token::RParen,
                Token::Int(-5),
            ]
        );
    }

    #[test]
    fn comments_skipped() {
        assert_eq!(tokens("// header\nseed 3 // trailing"), vec![Token::Seed, Token::Int(3)]);
    }

    #[test]
    fn error_recovery() {
        let result = lex("seed $ 3");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 5, end: 6 });
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn spans_correct() {
        let result = lex("func _main");
        assert_eq!(result.tokens[1].1, Span { start: 5, end: 10 });
    }
}
