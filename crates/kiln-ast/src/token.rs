//! Token types for the kiln lexer.

use kiln_core::Span;
use std::fmt;

/// A token from the source code.
///
/// Tokens do not own their text; [`Token::text`] slices it back out of the
/// source the lexer ran over.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The type of token.
    pub kind: TokenKind,
    /// Location in source.
    pub span: Span,
}

impl Token {
    #[inline]
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The token's lexeme within `source`.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        let end = (self.span.end as usize).min(source.len());
        let start = (self.span.start as usize).min(end);
        &source[start..end]
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {:?}", self.kind, self.span)
    }
}

/// All token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // =========================================
    // Literals and names
    // =========================================
    /// Integer literal: `42`, `0xff`, `0b1010`, `1_000`
    IntLiteral,
    /// Float literal: `1.5`, `2.0e3`
    FloatLiteral,
    /// String literal: `"hello"`
    StringLiteral,
    /// User-defined identifier
    Identifier,
    /// Builtin call name: `@as`, `@export`
    Builtin,

    // =========================================
    // Keywords
    // =========================================
    Fn,
    Const,
    Var,
    Pub,
    Export,
    Extern,
    Inline,
    ThreadLocal,
    Comptime,
    Test,
    UsingNamespace,
    Return,
    If,
    Else,
    While,
    Break,
    Continue,
    True,
    False,
    Null,
    Undefined,
    Unreachable,
    And,
    Or,
    Align,
    LinkSection,
    CallConv,

    // =========================================
    // Punctuation
    // =========================================
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    /// `.*`
    DotStar,
    Assign,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Ampersand,
    Question,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Whether this token can begin a top-level item.
    pub fn starts_item(self) -> bool {
        matches!(
            self,
            TokenKind::Fn
                | TokenKind::Const
                | TokenKind::Var
                | TokenKind::Pub
                | TokenKind::Export
                | TokenKind::Extern
                | TokenKind::Inline
                | TokenKind::ThreadLocal
                | TokenKind::Comptime
                | TokenKind::Test
                | TokenKind::UsingNamespace
        )
    }

    /// Human readable description used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::IntLiteral => "integer literal",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::Identifier => "identifier",
            TokenKind::Builtin => "builtin",
            TokenKind::Fn => "'fn'",
            TokenKind::Const => "'const'",
            TokenKind::Var => "'var'",
            TokenKind::Pub => "'pub'",
            TokenKind::Export => "'export'",
            TokenKind::Extern => "'extern'",
            TokenKind::Inline => "'inline'",
            TokenKind::ThreadLocal => "'threadlocal'",
            TokenKind::Comptime => "'comptime'",
            TokenKind::Test => "'test'",
            TokenKind::UsingNamespace => "'usingnamespace'",
            TokenKind::Return => "'return'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::Break => "'break'",
            TokenKind::Continue => "'continue'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::Undefined => "'undefined'",
            TokenKind::Unreachable => "'unreachable'",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Align => "'align'",
            TokenKind::LinkSection => "'linksection'",
            TokenKind::CallConv => "'callconv'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Colon => "':'",
            TokenKind::Dot => "'.'",
            TokenKind::DotStar => "'.*'",
            TokenKind::Assign => "'='",
            TokenKind::EqEq => "'=='",
            TokenKind::BangEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Bang => "'!'",
            TokenKind::Ampersand => "'&'",
            TokenKind::Question => "'?'",
            TokenKind::Eof => "end of file",
        }
    }
}

/// Look up a keyword by its text.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "fn" => TokenKind::Fn,
        "const" => TokenKind::Const,
        "var" => TokenKind::Var,
        "pub" => TokenKind::Pub,
        "export" => TokenKind::Export,
        "extern" => TokenKind::Extern,
        "inline" => TokenKind::Inline,
        "threadlocal" => TokenKind::ThreadLocal,
        "comptime" => TokenKind::Comptime,
        "test" => TokenKind::Test,
        "usingnamespace" => TokenKind::UsingNamespace,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "undefined" => TokenKind::Undefined,
        "unreachable" => TokenKind::Unreachable,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "align" => TokenKind::Align,
        "linksection" => TokenKind::LinkSection,
        "callconv" => TokenKind::CallConv,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_resolve() {
        assert_eq!(lookup_keyword("threadlocal"), Some(TokenKind::ThreadLocal));
        assert_eq!(lookup_keyword("usingnamespace"), Some(TokenKind::UsingNamespace));
        assert_eq!(lookup_keyword("foo"), None);
    }

    #[test]
    fn token_text_slices_source() {
        let src = "const abc = 1;";
        let tok = Token::new(TokenKind::Identifier, Span::new(6, 9));
        assert_eq!(tok.text(src), "abc");
    }
}
