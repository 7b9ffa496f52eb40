//! Recursive-descent parser.
//!
//! Parses one source file into an [`ast::File`](crate::ast::File). Errors are
//! collected rather than returned at the first failure: after a bad item the
//! parser skips ahead to the next token that can start a top-level
//! declaration and carries on.

use kiln_core::{ArithOp, CmpOp, PtrSize, Span};
use ordered_float::OrderedFloat;

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

type PResult<T> = Result<T, ParseError>;

/// Parse a complete source file.
pub fn parse(source: &str) -> Result<File, Vec<ParseError>> {
    let (tokens, mut errors) = Lexer::new(source).tokenize();
    let mut parser = Parser::new(source, tokens);
    let file = parser.parse_file();
    errors.extend(parser.errors);
    if errors.is_empty() {
        Ok(file)
    } else {
        errors.sort_by_key(|e| e.span().start);
        Err(errors)
    }
}

/// Parser state over a token list.
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    prev_end: u32,
    errors: Vec<ParseError>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            prev_end: 0,
            errors: Vec::new(),
        }
    }

    // =========================================
    // Token access
    // =========================================

    fn peek(&self) -> Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Token {
        let idx = (self.pos + n).min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(idx)
            .copied()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, Span::point(self.prev_end)))
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
            self.prev_end = token.span.end;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        self.eat(kind)
            .ok_or_else(|| self.error_expected(kind.describe()))
    }

    fn error_expected(&self, expected: &str) -> ParseError {
        let found = self.peek();
        ParseError::Expected {
            expected: expected.to_string(),
            found: found.kind.describe().to_string(),
            span: found.span,
        }
    }

    fn expect_ident(&mut self) -> PResult<Ident> {
        let token = self.expect(TokenKind::Identifier)?;
        Ok(Ident {
            name: token.text(self.source).to_string(),
            span: token.span,
        })
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    // =========================================
    // Items
    // =========================================

    fn parse_file(&mut self) -> File {
        let mut items = Vec::new();
        while !self.at(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.errors.push(err);
                    self.recover(before);
                }
            }
        }
        File { items }
    }

    /// Skip to the next token that can begin an item at brace depth zero.
    fn recover(&mut self, before: usize) {
        if self.pos == before {
            self.advance();
        }
        let mut depth = 0usize;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth = depth.saturating_sub(1),
                kind if depth == 0 && kind.starts_item() => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_item(&mut self) -> PResult<Item> {
        let start = self.peek().span.start;
        let is_pub = self.eat(TokenKind::Pub).is_some();
        let modifiers = self.parse_modifiers()?;

        let kind = match self.peek().kind {
            TokenKind::Fn => ItemKind::Fn(self.parse_fn_decl(modifiers)?),
            TokenKind::Const | TokenKind::Var => ItemKind::Var(self.parse_var_decl(modifiers)?),
            TokenKind::Comptime if modifiers.flags.is_empty() => {
                self.advance();
                ItemKind::Comptime(self.parse_block()?)
            }
            TokenKind::Test if modifiers.flags.is_empty() => {
                self.advance();
                let name_tok = self.expect(TokenKind::StringLiteral)?;
                let name = unescape(name_tok.text(self.source));
                ItemKind::Test {
                    name,
                    body: self.parse_block()?,
                }
            }
            TokenKind::UsingNamespace if modifiers.flags.is_empty() => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                ItemKind::UsingNamespace(expr)
            }
            TokenKind::Identifier
                if modifiers.flags.is_empty() && self.peek_nth(1).kind == TokenKind::Colon =>
            {
                let name = self.expect_ident()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_expr()?;
                let default = match self.eat(TokenKind::Assign) {
                    Some(_) => Some(self.parse_expr()?),
                    None => None,
                };
                if !self.at(TokenKind::Eof) {
                    self.expect(TokenKind::Comma)?;
                }
                ItemKind::Field { name, ty, default }
            }
            _ => return Err(self.error_expected("declaration")),
        };

        Ok(Item {
            kind,
            is_pub,
            span: self.span_from(start),
        })
    }

    fn parse_modifiers(&mut self) -> PResult<Modifiers> {
        let mut modifiers = Modifiers::default();
        loop {
            let token = self.peek();
            let flag = match token.kind {
                TokenKind::Export => ModifierFlags::EXPORT,
                TokenKind::Extern => ModifierFlags::EXTERN,
                TokenKind::Inline => ModifierFlags::INLINE,
                TokenKind::ThreadLocal => ModifierFlags::THREADLOCAL,
                _ => return Ok(modifiers),
            };
            self.advance();
            modifiers.insert(flag, token.span);
            if flag == ModifierFlags::EXTERN
                && let Some(lib) = self.eat(TokenKind::StringLiteral)
            {
                modifiers.extern_lib = Some((unescape(lib.text(self.source)), lib.span));
            }
        }
    }

    fn parse_fn_decl(&mut self, modifiers: Modifiers) -> PResult<FnDecl> {
        let fn_tok = self.expect(TokenKind::Fn)?;
        let name = self.expect_ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) {
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type_expr()?;
            params.push(Param { name, ty });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        let align = self.parse_paren_clause(TokenKind::Align)?;
        let section = self.parse_paren_clause(TokenKind::LinkSection)?;
        let callconv = self.parse_paren_clause(TokenKind::CallConv)?;
        let return_type = self.parse_type_expr()?;

        let body = if self.at(TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            self.expect(TokenKind::Semicolon)?;
            None
        };

        Ok(FnDecl {
            name,
            modifiers,
            params,
            return_type,
            callconv,
            align,
            section,
            body,
            fn_span: fn_tok.span,
        })
    }

    /// `keyword ( expr )`, if present.
    fn parse_paren_clause(&mut self, keyword: TokenKind) -> PResult<Option<Expr>> {
        if self.eat(keyword).is_none() {
            return Ok(None);
        }
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Some(expr))
    }

    fn parse_var_decl(&mut self, modifiers: Modifiers) -> PResult<VarDecl> {
        let mut_tok = self.advance();
        let is_mutable = mut_tok.kind == TokenKind::Var;
        let name = self.expect_ident()?;
        let ty = match self.eat(TokenKind::Colon) {
            Some(_) => Some(self.parse_type_expr()?),
            None => None,
        };
        let align = self.parse_paren_clause(TokenKind::Align)?;
        let section = self.parse_paren_clause(TokenKind::LinkSection)?;
        let init = match self.eat(TokenKind::Assign) {
            Some(_) => Some(self.parse_expr()?),
            None => None,
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(VarDecl {
            name,
            modifiers,
            is_mutable,
            mut_span: mut_tok.span,
            ty,
            align,
            section,
            init,
        })
    }

    // =========================================
    // Statements
    // =========================================

    fn parse_block(&mut self) -> PResult<Block> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block {
            stmts,
            span: self.span_from(open.span.start),
        })
    }

    /// A braced block, or a single statement standing in for one.
    fn parse_body(&mut self) -> PResult<Block> {
        if self.at(TokenKind::LBrace) {
            return self.parse_block();
        }
        let stmt = self.parse_stmt()?;
        let span = stmt.span;
        Ok(Block {
            stmts: vec![stmt],
            span,
        })
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let start = self.peek().span.start;
        let kind = match self.peek().kind {
            TokenKind::Const | TokenKind::Var => {
                let is_mutable = self.advance().kind == TokenKind::Var;
                let name = self.expect_ident()?;
                let ty = match self.eat(TokenKind::Colon) {
                    Some(_) => Some(self.parse_type_expr()?),
                    None => None,
                };
                self.expect(TokenKind::Assign)?;
                let init = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Local(LocalDecl {
                    name,
                    is_mutable,
                    ty,
                    init,
                })
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Return(value)
            }
            TokenKind::If => return self.parse_if(),
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.parse_body()?;
                StmtKind::While { cond, body }
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            TokenKind::Comptime => {
                self.advance();
                StmtKind::Comptime(self.parse_block()?)
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Continue
            }
            _ => {
                let expr = self.parse_expr()?;
                let kind = match self.eat(TokenKind::Assign) {
                    Some(_) => StmtKind::Assign {
                        target: expr,
                        value: self.parse_expr()?,
                    },
                    None => StmtKind::Expr(expr),
                };
                self.expect(TokenKind::Semicolon)?;
                kind
            }
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::If)?.span.start;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_body = self.parse_body()?;
        let else_body = if self.eat(TokenKind::Else).is_some() {
            if self.at(TokenKind::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                let block = self.parse_body()?;
                let span = block.span;
                Some(Box::new(Stmt {
                    kind: StmtKind::Block(block),
                    span,
                }))
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            span: self.span_from(start),
        })
    }

    // =========================================
    // Expressions
    // =========================================

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    /// A type in a position where a following `{` opens a body.
    fn parse_type_expr(&mut self) -> PResult<Expr> {
        self.parse_prefix(false)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(TokenKind::Or).is_some() {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_cmp()?;
        while self.eat(TokenKind::And).is_some() {
            let rhs = self.parse_cmp()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> PResult<Expr> {
        let lhs = self.parse_add()?;
        let op = match self.peek().kind {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::BangEq => CmpOp::Neq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::Lte,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::Gte,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(binary(BinaryOp::Cmp(op), lhs, rhs))
    }

    fn parse_add(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = binary(BinaryOp::Arith(op), lhs, rhs);
        }
    }

    fn parse_mul(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_prefix(true)?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                TokenKind::Percent => ArithOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_prefix(true)?;
            lhs = binary(BinaryOp::Arith(op), lhs, rhs);
        }
    }

    fn parse_prefix(&mut self, allow_init: bool) -> PResult<Expr> {
        let start = self.peek().span.start;
        let unary = |this: &mut Self, op: UnaryOp| -> PResult<Expr> {
            this.advance();
            let operand = this.parse_prefix(allow_init)?;
            Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                this.span_from(start),
            ))
        };

        match self.peek().kind {
            TokenKind::Minus => unary(self, UnaryOp::Negate),
            TokenKind::Bang => unary(self, UnaryOp::Not),
            TokenKind::Ampersand => unary(self, UnaryOp::AddressOf),
            TokenKind::Question => {
                self.advance();
                let child = self.parse_prefix(allow_init)?;
                Ok(Expr::new(
                    ExprKind::OptionalType(Box::new(child)),
                    self.span_from(start),
                ))
            }
            TokenKind::Star => {
                self.advance();
                self.finish_ptr_type(start, PtrSize::One, None, allow_init)
            }
            TokenKind::LBracket => self.parse_bracket_type(start, allow_init),
            _ => self.parse_postfix(),
        }
    }

    /// `[*]T`, `[*c]T`, `[*:s]T`, `[]T`, `[:s]T`, `[N]T`, `[N:s]T`, `[N]T{..}`.
    fn parse_bracket_type(&mut self, start: u32, allow_init: bool) -> PResult<Expr> {
        self.expect(TokenKind::LBracket)?;

        if self.eat(TokenKind::Star).is_some() {
            let mut size = PtrSize::Many;
            let mut sentinel = None;
            if self.at(TokenKind::Identifier) && self.peek().text(self.source) == "c" {
                self.advance();
                size = PtrSize::C;
            } else if self.eat(TokenKind::Colon).is_some() {
                sentinel = Some(Box::new(self.parse_expr()?));
            }
            self.expect(TokenKind::RBracket)?;
            return self.finish_ptr_type(start, size, sentinel, allow_init);
        }

        if self.eat(TokenKind::RBracket).is_some() {
            return self.finish_ptr_type(start, PtrSize::Slice, None, allow_init);
        }

        if self.eat(TokenKind::Colon).is_some() {
            let sentinel = Some(Box::new(self.parse_expr()?));
            self.expect(TokenKind::RBracket)?;
            return self.finish_ptr_type(start, PtrSize::Slice, sentinel, allow_init);
        }

        let len = self.parse_expr()?;
        let sentinel = match self.eat(TokenKind::Colon) {
            Some(_) => Some(Box::new(self.parse_expr()?)),
            None => None,
        };
        self.expect(TokenKind::RBracket)?;
        let child = self.parse_prefix(false)?;
        let array_ty = Expr::new(
            ExprKind::ArrayType {
                len: Box::new(len),
                sentinel,
                child: Box::new(child),
            },
            self.span_from(start),
        );

        if !allow_init || !self.at(TokenKind::LBrace) {
            return Ok(array_ty);
        }
        self.advance();
        let mut elems = Vec::new();
        while !self.at(TokenKind::RBrace) {
            elems.push(self.parse_expr()?);
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::new(
            ExprKind::ArrayInit {
                ty: Box::new(array_ty),
                elems,
            },
            self.span_from(start),
        ))
    }

    fn finish_ptr_type(
        &mut self,
        start: u32,
        size: PtrSize,
        sentinel: Option<Box<Expr>>,
        allow_init: bool,
    ) -> PResult<Expr> {
        let is_const = self.eat(TokenKind::Const).is_some();
        let child = self.parse_prefix(allow_init)?;
        Ok(Expr::new(
            ExprKind::PtrType {
                size,
                is_const,
                sentinel,
                child: Box::new(child),
            },
            self.span_from(start),
        ))
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let start = self.peek().span.start;
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(TokenKind::LParen).is_some() {
                let args = self.parse_args()?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    self.span_from(start),
                );
            } else if self.eat(TokenKind::DotStar).is_some() {
                expr = Expr::new(ExprKind::Deref(Box::new(expr)), self.span_from(start));
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an already consumed `(`.
    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.peek();
        let text = token.text(self.source);
        let kind = match token.kind {
            TokenKind::IntLiteral => ExprKind::Int(parse_int(text, token.span)?),
            TokenKind::FloatLiteral => {
                let cleaned: String = text.chars().filter(|&c| c != '_').collect();
                let value = cleaned.parse::<f64>().map_err(|e| ParseError::InvalidNumber {
                    span: token.span,
                    detail: e.to_string(),
                })?;
                ExprKind::Float(OrderedFloat(value))
            }
            TokenKind::StringLiteral => ExprKind::Str(unescape(text)),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Undefined => ExprKind::Undefined,
            TokenKind::Unreachable => ExprKind::Unreachable,
            TokenKind::Identifier => ExprKind::Ident(text.to_string()),
            TokenKind::Builtin => {
                let name = text.trim_start_matches('@').to_string();
                self.advance();
                self.expect(TokenKind::LParen)?;
                let args = self.parse_args()?;
                return Ok(Expr::new(
                    ExprKind::Builtin { name, args },
                    self.span_from(token.span.start),
                ));
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.error_expected("expression")),
        };
        self.advance();
        Ok(Expr::new(kind, token.span))
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.merge(rhs.span);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn parse_int(text: &str, span: Span) -> PResult<i128> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (digits, radix) = match cleaned.get(..2) {
        Some("0x") => (&cleaned[2..], 16),
        Some("0b") => (&cleaned[2..], 2),
        Some("0o") => (&cleaned[2..], 8),
        _ => (cleaned.as_str(), 10),
    };
    i128::from_str_radix(digits, radix).map_err(|e| ParseError::InvalidNumber {
        span,
        detail: e.to_string(),
    })
}

/// Strip quotes and resolve escapes of a string literal lexeme.
fn unescape(lexeme: &str) -> String {
    let inner = lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(lexeme);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(src: &str) -> File {
        parse(src).unwrap_or_else(|errs| panic!("parse failed: {:?}", errs))
    }

    #[test]
    fn parse_const_with_type() {
        let file = parse_ok("pub const x: u8 = 42;");
        assert_eq!(file.items.len(), 1);
        let item = &file.items[0];
        assert!(item.is_pub);
        assert_eq!(item.span, Span::new(0, 21));
        let ItemKind::Var(var) = &item.kind else {
            panic!("expected var decl");
        };
        assert_eq!(var.name.name, "x");
        assert!(!var.is_mutable);
        assert!(matches!(var.ty.as_ref().map(|t| &t.kind), Some(ExprKind::Ident(n)) if n == "u8"));
        assert!(matches!(var.init.as_ref().map(|e| &e.kind), Some(ExprKind::Int(42))));
    }

    #[test]
    fn parse_exported_fn() {
        let file = parse_ok("export fn add(a: i32, b: i32) i32 { return a + b; }");
        let item = &file.items[0];
        assert!(item.is_exported());
        let ItemKind::Fn(func) = &item.kind else {
            panic!("expected fn");
        };
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.params[1].name.name, "b");
        let body = func.body.as_ref().expect("body");
        assert_eq!(body.stmts.len(), 1);
        assert!(matches!(body.stmts[0].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn parse_extern_prototype() {
        let file = parse_ok("extern \"c\" fn puts(s: [*c]const u8) i32;");
        let ItemKind::Fn(func) = &file.items[0].kind else {
            panic!("expected fn");
        };
        assert!(func.body.is_none());
        assert_eq!(func.modifiers.extern_lib.as_ref().map(|(n, _)| n.as_str()), Some("c"));
        assert!(matches!(
            func.params[0].ty.kind,
            ExprKind::PtrType { size: PtrSize::C, is_const: true, .. }
        ));
    }

    #[test]
    fn parse_array_type_return_does_not_swallow_body() {
        let file = parse_ok("fn f() [4]u8 { return undefined; }");
        let ItemKind::Fn(func) = &file.items[0].kind else {
            panic!("expected fn");
        };
        assert!(matches!(func.return_type.kind, ExprKind::ArrayType { .. }));
        assert!(func.body.is_some());
    }

    #[test]
    fn parse_array_init_and_address_of() {
        let file = parse_ok("var arr = [4]u8{ 1, 2, 3, 4 };\nconst s: []u8 = &arr;");
        let ItemKind::Var(arr) = &file.items[0].kind else {
            panic!("expected var");
        };
        assert!(matches!(
            arr.init.as_ref().map(|e| &e.kind),
            Some(ExprKind::ArrayInit { elems, .. }) if elems.len() == 4
        ));
        let ItemKind::Var(s) = &file.items[1].kind else {
            panic!("expected var");
        };
        assert!(matches!(
            s.init.as_ref().map(|e| &e.kind),
            Some(ExprKind::Unary { op: UnaryOp::AddressOf, .. })
        ));
    }

    #[test]
    fn parse_precedence() {
        let file = parse_ok("const x = 1 + 2 * 3 < 10 and true;");
        let ItemKind::Var(var) = &file.items[0].kind else {
            panic!("expected var");
        };
        let Some(ExprKind::Binary { op, lhs, .. }) = var.init.as_ref().map(|e| &e.kind) else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::And);
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Cmp(CmpOp::Lt), .. }));
    }

    #[test]
    fn parse_statements() {
        let src = r#"
fn f(n: u32) u32 {
    var i: u32 = 0;
    while (i < n) {
        i = i + 1;
    }
    if (i == 0) { return 1; } else if (i == 1) { return 2; } else { return i; }
}
"#;
        let file = parse_ok(src);
        let ItemKind::Fn(func) = &file.items[0].kind else {
            panic!("expected fn");
        };
        let stmts = &func.body.as_ref().expect("body").stmts;
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0].kind, StmtKind::Local(LocalDecl { is_mutable: true, .. })));
        assert!(matches!(stmts[1].kind, StmtKind::While { .. }));
        assert!(matches!(stmts[2].kind, StmtKind::If { else_body: Some(_), .. }));
    }

    #[test]
    fn parse_unbraced_bodies() {
        let src = r#"
fn f(n: u32) u32 {
    var i: u32 = 0;
    while (i < n) i = i + 1;
    if (i == 3) return 0; else return i;
}
"#;
        let file = parse_ok(src);
        let ItemKind::Fn(func) = &file.items[0].kind else {
            panic!("expected fn");
        };
        let stmts = &func.body.as_ref().expect("body").stmts;
        assert_eq!(stmts.len(), 3);
        let StmtKind::While { body, .. } = &stmts[1].kind else {
            panic!("expected while");
        };
        assert_eq!(body.stmts.len(), 1);
        assert!(matches!(body.stmts[0].kind, StmtKind::Assign { .. }));
        let StmtKind::If { then_body, else_body: Some(else_body), .. } = &stmts[2].kind else {
            panic!("expected if with else");
        };
        assert_eq!(then_body.stmts.len(), 1);
        assert!(matches!(then_body.stmts[0].kind, StmtKind::Return(Some(_))));
        let StmtKind::Block(else_block) = &else_body.kind else {
            panic!("expected else block");
        };
        assert_eq!(else_block.stmts.len(), 1);
    }

    #[test]
    fn parse_unbraced_loop_control_and_builtins() {
        let src = r#"
comptime { if (debug) @compileError("debug build"); }
fn g() void { while (true) { if (done) break; if (skip) continue; } }
"#;
        let file = parse_ok(src);
        let ItemKind::Comptime(block) = &file.items[0].kind else {
            panic!("expected comptime");
        };
        let StmtKind::If { then_body, .. } = &block.stmts[0].kind else {
            panic!("expected if");
        };
        let StmtKind::Expr(expr) = &then_body.stmts[0].kind else {
            panic!("expected an expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Builtin { .. }));
        assert!(parse("fn h() void { if (x) }").is_err());
    }

    #[test]
    fn parse_misc_items() {
        let src = r#"
comptime { @compileError("boom"); }
test "adds" { }
usingnamespace other;
threadlocal var counter: u32 = 0;
"#;
        let file = parse_ok(src);
        let tags: Vec<ItemTag> = file.items.iter().map(Item::tag).collect();
        assert_eq!(
            tags,
            vec![ItemTag::Comptime, ItemTag::Test, ItemTag::UsingNamespace, ItemTag::Var]
        );
        let mods = file.items[3].modifiers().expect("modifiers");
        assert!(mods.contains(ModifierFlags::THREADLOCAL));
    }

    #[test]
    fn parse_vector_and_optional_types() {
        let file = parse_ok("fn f(a: @Vector(4, f32), b: ?*const u8) void {}");
        let ItemKind::Fn(func) = &file.items[0].kind else {
            panic!("expected fn");
        };
        let ExprKind::Builtin { name, .. } = &func.params[0].ty.kind else {
            panic!("expected builtin");
        };
        assert_eq!(name, "Vector");
        assert!(matches!(func.params[1].ty.kind, ExprKind::OptionalType(_)));
    }

    #[test]
    fn parse_recovers_at_next_item() {
        let errs = parse("const a = ;\nconst b = 2;\nfn g( {}\nconst c = 3;").unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(matches!(errs[0], ParseError::Expected { .. }));
    }

    #[test]
    fn parse_int_literal_overflow() {
        let errs = parse("const big = 0xffffffffffffffffffffffffffffffffff;").unwrap_err();
        assert!(matches!(errs[0], ParseError::InvalidNumber { .. }));
    }

    #[test]
    fn parse_field_item() {
        let file = parse_ok("x: u32 = 5,\ny: bool");
        assert_eq!(file.items.len(), 2);
        assert_eq!(file.items[0].tag(), ItemTag::Field);
    }
}
