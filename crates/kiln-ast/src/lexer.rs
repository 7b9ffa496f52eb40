//! Lexer for kiln source.
//!
//! The [`Lexer`] converts source text into [`Token`]s, dispatching on the
//! first character. Line comments (`//`, including `///` doc comments) are
//! skipped along with whitespace.

use kiln_core::Span;

use crate::error::ParseError;
use crate::token::{Token, TokenKind, lookup_keyword};

/// Lexer over one source string.
pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    offset: usize,
    errors: Vec<ParseError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            offset: 0,
            errors: Vec::new(),
        }
    }

    /// Lex the whole input. The returned list always ends with `Eof`.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<ParseError>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            tokens.push(token);
            if token.kind == TokenKind::Eof {
                break;
            }
        }
        (tokens, self.errors)
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_trivia();
            let start = self.offset;
            let Some(c) = self.peek() else {
                return self.make(TokenKind::Eof, start);
            };

            let kind = match c {
                b'"' => self.scan_string(start),
                b'0'..=b'9' => self.scan_number(),
                b'@' => {
                    self.offset += 1;
                    self.eat_ident_chars();
                    Some(TokenKind::Builtin)
                }
                c if is_ident_start(c) => {
                    self.eat_ident_chars();
                    let text = &self.source[start..self.offset];
                    Some(lookup_keyword(text).unwrap_or(TokenKind::Identifier))
                }
                _ => self.scan_punct(),
            };

            match kind {
                Some(kind) => return self.make(kind, start),
                // Error already recorded; keep scanning past the bad input.
                None => continue,
            }
        }
    }

    // =========================================
    // Internal: scanning helpers
    // =========================================

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.offset + n).copied()
    }

    fn make(&self, kind: TokenKind, start: usize) -> Token {
        Token::new(kind, Span::new(start as u32, self.offset as u32))
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.offset += 1;
            } else if c == b'/' && self.peek_at(1) == Some(b'/') {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.offset += 1;
                }
            } else {
                break;
            }
        }
    }

    fn eat_ident_chars(&mut self) {
        while self.peek().is_some_and(is_ident_continue) {
            self.offset += 1;
        }
    }

    fn scan_string(&mut self, start: usize) -> Option<TokenKind> {
        self.offset += 1;
        while let Some(c) = self.peek() {
            match c {
                b'"' => {
                    self.offset += 1;
                    return Some(TokenKind::StringLiteral);
                }
                b'\\' => self.offset += 2,
                b'\n' => break,
                _ => self.offset += 1,
            }
        }
        self.offset = self.offset.min(self.bytes.len());
        self.errors.push(ParseError::UnterminatedString {
            span: Span::new(start as u32, self.offset as u32),
        });
        None
    }

    fn scan_number(&mut self) -> Option<TokenKind> {
        let radix_prefix = self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x' | b'b' | b'o'));
        if radix_prefix {
            self.offset += 2;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.offset += 1;
            }
            return Some(TokenKind::IntLiteral);
        }

        let mut kind = TokenKind::IntLiteral;
        self.eat_digits();
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            kind = TokenKind::FloatLiteral;
            self.offset += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                kind = TokenKind::FloatLiteral;
                self.offset += 1 + sign;
                self.eat_digits();
            }
        }
        Some(kind)
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
            self.offset += 1;
        }
    }

    fn scan_punct(&mut self) -> Option<TokenKind> {
        let c = self.peek()?;
        let next = self.peek_at(1);
        let (kind, len) = match (c, next) {
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::BangEq, 2),
            (b'<', Some(b'=')) => (TokenKind::LtEq, 2),
            (b'>', Some(b'=')) => (TokenKind::GtEq, 2),
            (b'.', Some(b'*')) => (TokenKind::DotStar, 2),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'&', _) => (TokenKind::Ampersand, 1),
            (b'?', _) => (TokenKind::Question, 1),
            _ => {
                let ch = self.source[self.offset..].chars().next().unwrap_or('\u{fffd}');
                let start = self.offset;
                self.offset += ch.len_utf8().max(1);
                self.errors.push(ParseError::UnexpectedChar {
                    ch,
                    span: Span::new(start as u32, self.offset as u32),
                });
                return None;
            }
        };
        self.offset += len;
        Some(kind)
    }
}

#[inline]
fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[inline]
fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(src).tokenize();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_var_decl() {
        assert_eq!(
            kinds("pub const x: u8 = 42;"),
            vec![
                TokenKind::Pub,
                TokenKind::Const,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::IntLiteral,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            kinds("1.5 0xff 2e3 1_000"),
            vec![
                TokenKind::FloatLiteral,
                TokenKind::IntLiteral,
                TokenKind::FloatLiteral,
                TokenKind::IntLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            kinds("a.* == b != &c <= d"),
            vec![
                TokenKind::Identifier,
                TokenKind::DotStar,
                TokenKind::EqEq,
                TokenKind::Identifier,
                TokenKind::BangEq,
                TokenKind::Ampersand,
                TokenKind::Identifier,
                TokenKind::LtEq,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_skips_comments() {
        assert_eq!(
            kinds("/// doc\nconst // trailing\n"),
            vec![TokenKind::Const, TokenKind::Eof]
        );
    }

    #[test]
    fn lex_builtin_and_string() {
        let src = r#"@export(f, "sym")"#;
        let (tokens, _) = Lexer::new(src).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Builtin);
        assert_eq!(tokens[0].text(src), "@export");
        assert_eq!(tokens[4].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[4].text(src), "\"sym\"");
    }

    #[test]
    fn lex_reports_bad_char_and_continues() {
        let (tokens, errors) = Lexer::new("const $ x").tokenize();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ParseError::UnexpectedChar { ch: '$', .. }));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn lex_unterminated_string() {
        let (_, errors) = Lexer::new("\"abc").tokenize();
        assert!(matches!(errors[0], ParseError::UnterminatedString { .. }));
    }
}
