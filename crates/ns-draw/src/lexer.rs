//! Tokenizer for draw expressions.
//!
//! The surface syntax is Python-flavoured: `and`/`or`/`not` keywords, `**` for
//! powers, `//` for floor division, `&`/`|`/`~` as elementwise boolean
//! operators, and `[...]` subscripts with optional `a:b` slices.

use crate::error::{DrawError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    And,
    Or,
    Not,
    True,
    False,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
}

/// Byte range of a token or node in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl Span {
    pub(crate) fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub(crate) fn to(self, other: Span) -> Span {
        Span { start: self.start.min(other.start), end: self.end.max(other.end) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub(crate) fn line_col_1based(input: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    let mut line: usize = 1;
    let mut col: usize = 1;
    for &b in &input.as_bytes()[..offset] {
        if b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

pub(crate) fn syntax_err(input: &str, span: Span, msg: impl Into<String>) -> DrawError {
    let (line, col) = line_col_1based(input, span.start);
    DrawError::Syntax { expr: input.to_string(), line, col, msg: msg.into() }
}

pub(crate) fn unsupported_err(input: &str, span: Span, msg: impl Into<String>) -> DrawError {
    let (line, col) = line_col_1based(input, span.start);
    DrawError::Unsupported {
        expr: input.to_string(),
        msg: format!("line {line}, col {col}: {}", msg.into()),
    }
}

fn keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "not" => Some(TokenKind::Not),
        "True" => Some(TokenKind::True),
        "False" => Some(TokenKind::False),
        _ => None,
    }
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    if let Some((start, ch)) = input.char_indices().find(|(_, ch)| !ch.is_ascii()) {
        return Err(syntax_err(
            input,
            Span::new(start, start + ch.len_utf8()),
            format!("non-ASCII character {ch:?} is not supported"),
        ));
    }

    let bytes = input.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i: usize = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if i + 1 < bytes.len() {
            let kind = match &input[i..i + 2] {
                "**" => Some(TokenKind::DoubleStar),
                "//" => Some(TokenKind::DoubleSlash),
                "==" => Some(TokenKind::EqEq),
                "!=" => Some(TokenKind::Ne),
                "<=" => Some(TokenKind::Le),
                ">=" => Some(TokenKind::Ge),
                _ => None,
            };
            if let Some(kind) = kind {
                tokens.push(Token { kind, span: Span::new(i, i + 2) });
                i += 2;
                continue;
            }
        }

        let start = i;
        let single = match b {
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Star),
            b'/' => Some(TokenKind::Slash),
            b'%' => Some(TokenKind::Percent),
            b'&' => Some(TokenKind::Amp),
            b'|' => Some(TokenKind::Pipe),
            b'^' => Some(TokenKind::Caret),
            b'~' => Some(TokenKind::Tilde),
            b'<' => Some(TokenKind::Lt),
            b'>' => Some(TokenKind::Gt),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b',' => Some(TokenKind::Comma),
            b':' => Some(TokenKind::Colon),
            _ => None,
        };
        if let Some(kind) = single {
            i += 1;
            tokens.push(Token { kind, span: Span::new(start, i) });
            continue;
        }

        let kind = match b {
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i += 1;
                TokenKind::Dot
            }
            _ if b.is_ascii_digit() || b == b'.' => {
                let mut is_float = false;
                while i < bytes.len() {
                    let c = bytes[i];
                    if c.is_ascii_digit() {
                        i += 1;
                    } else if c == b'.' && !is_float {
                        is_float = true;
                        i += 1;
                    } else if (c == b'e' || c == b'E') && i > start {
                        is_float = true;
                        i += 1;
                        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                            i += 1;
                        }
                    } else {
                        break;
                    }
                }
                let s = &input[start..i];
                if is_float {
                    let n: f64 = s.parse().map_err(|_| {
                        syntax_err(input, Span::new(start, i), format!("invalid number: '{s}'"))
                    })?;
                    TokenKind::Float(n)
                } else {
                    let n: i64 = s.parse().map_err(|_| {
                        syntax_err(input, Span::new(start, i), format!("invalid integer: '{s}'"))
                    })?;
                    TokenKind::Int(n)
                }
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let ident = &input[start..i];
                keyword(ident).unwrap_or_else(|| TokenKind::Ident(ident.to_string()))
            }
            b'\'' | b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(syntax_err(
                        input,
                        Span::new(start, i),
                        "unterminated string literal",
                    ));
                }
                i += 1;
                TokenKind::Str(input[start + 1..i - 1].to_string())
            }
            b'=' => {
                return Err(syntax_err(
                    input,
                    Span::new(i, i + 1),
                    "unexpected '=' (use '==' for comparison)",
                ));
            }
            _ => {
                return Err(syntax_err(
                    input,
                    Span::new(i, i + 1),
                    format!("unexpected character: '{}'", b as char),
                ));
            }
        };

        tokens.push(Token { kind, span: Span::new(start, i) });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers_ints_and_floats() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 3E-2"),
            vec![
                TokenKind::Int(1),
                TokenKind::Float(2.5),
                TokenKind::Float(0.5),
                TokenKind::Float(1000.0),
                TokenKind::Float(0.03),
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("not a and b or True"),
            vec![
                TokenKind::Not,
                TokenKind::Ident("a".into()),
                TokenKind::And,
                TokenKind::Ident("b".into()),
                TokenKind::Or,
                TokenKind::True,
            ]
        );
    }

    #[test]
    fn two_char_operators_win() {
        assert_eq!(
            kinds("a**2 // 3 <= b != c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::DoubleStar,
                TokenKind::Int(2),
                TokenKind::DoubleSlash,
                TokenKind::Int(3),
                TokenKind::Le,
                TokenKind::Ident("b".into()),
                TokenKind::Ne,
                TokenKind::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn attribute_dot_is_separate_token() {
        assert_eq!(
            kinds("np.exp(x)"),
            vec![
                TokenKind::Ident("np".into()),
                TokenKind::Dot,
                TokenKind::Ident("exp".into()),
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn slices_and_strings() {
        assert_eq!(
            kinds("x[:2] 'foo'"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::LBracket,
                TokenKind::Colon,
                TokenKind::Int(2),
                TokenKind::RBracket,
                TokenKind::Str("foo".into()),
            ]
        );
    }

    #[test]
    fn spans_report_line_and_column() {
        let err = tokenize("a +\n  $b").unwrap_err();
        match err {
            DrawError::Syntax { line, col, .. } => {
                assert_eq!((line, col), (2, 3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn single_equals_is_rejected() {
        let err = tokenize("a = 1").unwrap_err();
        assert!(err.to_string().contains("'=='"));
    }

    #[test]
    fn non_ascii_is_rejected() {
        assert!(matches!(tokenize("pt > 5 µ"), Err(DrawError::Syntax { .. })));
    }
}
