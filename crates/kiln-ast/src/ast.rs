//! Abstract syntax tree.
//!
//! The tree is fully owned so a parsed file can outlive the parse call and be
//! swapped out wholesale when its source changes. Every node carries the
//! [`Span`] of its source text; an item's span covers the whole declaration,
//! which is what content hashing reads.

use bitflags::bitflags;
use kiln_core::{ArithOp, CmpOp, PtrSize, Span};
use ordered_float::OrderedFloat;

// ============================================================================
// Items
// ============================================================================

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct File {
    pub items: Vec<Item>,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    /// `pub` visibility marker.
    pub is_pub: bool,
    /// Full source range of the declaration.
    pub span: Span,
}

/// Item tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemTag {
    Fn,
    Var,
    Comptime,
    Test,
    UsingNamespace,
    Field,
}

/// Top-level declaration payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Fn(FnDecl),
    Var(VarDecl),
    Comptime(Block),
    Test { name: String, body: Block },
    UsingNamespace(Expr),
    Field {
        name: Ident,
        ty: Expr,
        default: Option<Expr>,
    },
}

impl Item {
    pub fn tag(&self) -> ItemTag {
        match &self.kind {
            ItemKind::Fn(_) => ItemTag::Fn,
            ItemKind::Var(_) => ItemTag::Var,
            ItemKind::Comptime(_) => ItemTag::Comptime,
            ItemKind::Test { .. } => ItemTag::Test,
            ItemKind::UsingNamespace(_) => ItemTag::UsingNamespace,
            ItemKind::Field { .. } => ItemTag::Field,
        }
    }

    /// The declared name, for items that have one.
    pub fn name(&self) -> Option<&Ident> {
        match &self.kind {
            ItemKind::Fn(f) => Some(&f.name),
            ItemKind::Var(v) => Some(&v.name),
            ItemKind::Field { name, .. } => Some(name),
            ItemKind::Comptime(_) | ItemKind::Test { .. } | ItemKind::UsingNamespace(_) => None,
        }
    }

    pub fn modifiers(&self) -> Option<&Modifiers> {
        match &self.kind {
            ItemKind::Fn(f) => Some(&f.modifiers),
            ItemKind::Var(v) => Some(&v.modifiers),
            _ => None,
        }
    }

    /// Whether the item carries the `export` modifier.
    pub fn is_exported(&self) -> bool {
        self.modifiers()
            .is_some_and(|m| m.flags.contains(ModifierFlags::EXPORT))
    }
}

/// An identifier with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

bitflags! {
    /// Declaration modifier keywords.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierFlags: u8 {
        const EXPORT = 1 << 0;
        const EXTERN = 1 << 1;
        const INLINE = 1 << 2;
        const THREADLOCAL = 1 << 3;
    }
}

/// Modifier keywords on a declaration, with their locations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Modifiers {
    pub flags: ModifierFlags,
    spans: Vec<(ModifierFlags, Span)>,
    /// Library name after `extern`, e.g. `extern "c"`.
    pub extern_lib: Option<(String, Span)>,
}

impl Modifiers {
    pub fn insert(&mut self, flag: ModifierFlags, span: Span) {
        self.flags |= flag;
        self.spans.push((flag, span));
    }

    #[inline]
    pub fn contains(&self, flag: ModifierFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Location of a modifier keyword.
    pub fn span_of(&self, flag: ModifierFlags) -> Option<Span> {
        self.spans
            .iter()
            .find(|(f, _)| *f == flag)
            .map(|(_, span)| *span)
    }
}

/// A function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: Ident,
    pub modifiers: Modifiers,
    pub params: Vec<Param>,
    pub return_type: Expr,
    pub callconv: Option<Expr>,
    pub align: Option<Expr>,
    pub section: Option<Expr>,
    /// `None` for `extern fn` prototypes.
    pub body: Option<Block>,
    /// Span of the `fn` keyword.
    pub fn_span: Span,
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: Expr,
}

/// A container-level `const`/`var` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: Ident,
    pub modifiers: Modifiers,
    pub is_mutable: bool,
    /// Span of the `const`/`var` keyword.
    pub mut_span: Span,
    pub ty: Option<Expr>,
    pub align: Option<Expr>,
    pub section: Option<Expr>,
    pub init: Option<Expr>,
}

// ============================================================================
// Statements
// ============================================================================

/// A braced statement list.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `const x = e;` / `var x: T = e;`
    Local(LocalDecl),
    /// `target = value;`
    Assign { target: Expr, value: Expr },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_body: Block,
        else_body: Option<Box<Stmt>>,
    },
    While { cond: Expr, body: Block },
    Block(Block),
    Comptime(Block),
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalDecl {
    pub name: Ident,
    pub is_mutable: bool,
    pub ty: Option<Expr>,
    pub init: Expr,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    AddressOf,
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Arith(ArithOp),
    Cmp(CmpOp),
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i128),
    Float(OrderedFloat<f64>),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Unreachable,
    Ident(String),
    /// `@name(args)`
    Builtin { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `ptr.*`
    Deref(Box<Expr>),
    PtrType {
        size: PtrSize,
        is_const: bool,
        sentinel: Option<Box<Expr>>,
        child: Box<Expr>,
    },
    ArrayType {
        len: Box<Expr>,
        sentinel: Option<Box<Expr>>,
        child: Box<Expr>,
    },
    OptionalType(Box<Expr>),
    /// `[N]T{ a, b, c }`
    ArrayInit { ty: Box<Expr>, elems: Vec<Expr> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_spans() {
        let mut mods = Modifiers::default();
        mods.insert(ModifierFlags::EXPORT, Span::new(0, 6));
        mods.insert(ModifierFlags::INLINE, Span::new(7, 13));
        assert!(mods.contains(ModifierFlags::EXPORT | ModifierFlags::INLINE));
        assert_eq!(mods.span_of(ModifierFlags::INLINE), Some(Span::new(7, 13)));
        assert_eq!(mods.span_of(ModifierFlags::EXTERN), None);
    }
}
