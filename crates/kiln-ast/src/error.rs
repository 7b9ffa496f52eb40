//! Lexer and parser errors.

use kiln_core::Span;
use thiserror::Error;

/// Errors produced while turning source text into an AST.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An unexpected character was encountered.
    #[error("at {span}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, span: Span },

    /// A string literal was not properly terminated.
    #[error("at {span}: unterminated string literal")]
    UnterminatedString { span: Span },

    /// A numeric literal could not be parsed.
    #[error("at {span}: invalid number literal: {detail}")]
    InvalidNumber { span: Span, detail: String },

    /// A specific token was expected but something else was found.
    #[error("at {span}: expected {expected}, found {found}")]
    Expected {
        /// What the parser was looking for.
        expected: String,
        /// Description of the token actually present.
        found: String,
        span: Span,
    },
}

impl ParseError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedChar { span, .. } => *span,
            ParseError::UnterminatedString { span } => *span,
            ParseError::InvalidNumber { span, .. } => *span,
            ParseError::Expected { span, .. } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_span() {
        let err = ParseError::Expected {
            expected: "';'".into(),
            found: "'}'".into(),
            span: Span::new(10, 11),
        };
        assert_eq!(err.to_string(), "at 10..11: expected ';', found '}'");
        assert_eq!(err.span(), Span::new(10, 11));
    }
}
