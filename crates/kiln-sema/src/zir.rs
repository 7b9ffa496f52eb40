//! Untyped intermediate representation (ZIR).
//!
//! AstGen lowers each declaration to a [`ZirDecl`]. Names of other
//! declarations are kept as strings and only resolved by Sema, so ZIR for a
//! function body stays valid across edits to the declarations it mentions.
//! A [`Fn`](crate::decl::Fn) keeps its ZIR for its whole life; compile-time
//! and inline calls re-interpret it.
//!
//! Source units can also be handed to the module directly as a list of ZIR
//! declarations. Their change detection hashes the textual rendering.

use std::fmt;
use std::sync::Arc;

use kiln_core::{ArithOp, CallingConvention, CmpOp, PtrSize, Span, Type};
use ordered_float::OrderedFloat;

/// Handle to an instruction in a [`Zir`] store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZirRef(pub u32);

impl fmt::Debug for ZirRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for ZirRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// ZIR instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum ZirInst {
    // =========================================
    // Values
    // =========================================
    Int(i128),
    Float(OrderedFloat<f64>),
    Str(String),
    Bool(bool),
    Void,
    Null,
    Undefined,
    PrimitiveType(Type),
    /// Value of a named declaration.
    DeclVal { name: String },
    /// Address of a named declaration.
    DeclRef { name: String },
    /// Function parameter by position.
    Arg { index: u32 },

    // =========================================
    // Memory
    // =========================================
    /// Local storage initialized with `init`; yields the pointer.
    Alloc { ty: Option<ZirRef>, init: ZirRef },
    Store { ptr: ZirRef, value: ZirRef },
    Load { ptr: ZirRef },
    /// Address of a value.
    Ref { operand: ZirRef },

    // =========================================
    // Operators
    // =========================================
    Arith { op: ArithOp, lhs: ZirRef, rhs: ZirRef },
    Cmp { op: CmpOp, lhs: ZirRef, rhs: ZirRef },
    BoolOp { is_and: bool, lhs: ZirRef, rhs: ZirRef },
    Not { operand: ZirRef },
    Negate { operand: ZirRef },
    /// Coerce `operand` to the type `ty`.
    As { ty: ZirRef, operand: ZirRef },

    // =========================================
    // Types
    // =========================================
    PtrType {
        size: PtrSize,
        is_const: bool,
        sentinel: Option<ZirRef>,
        child: ZirRef,
    },
    ArrayType {
        len: ZirRef,
        sentinel: Option<ZirRef>,
        child: ZirRef,
    },
    OptionalType { child: ZirRef },
    VectorType { len: ZirRef, child: ZirRef },
    FnType {
        params: Vec<ZirRef>,
        ret: ZirRef,
        cc: CallingConvention,
    },

    // =========================================
    // Aggregates and calls
    // =========================================
    ArrayInit { ty: ZirRef, elems: Vec<ZirRef> },
    Call { callee: ZirRef, args: Vec<ZirRef> },

    // =========================================
    // Control flow
    // =========================================
    Ret { operand: Option<ZirRef> },
    CondBr {
        cond: ZirRef,
        then_body: Vec<ZirRef>,
        else_body: Vec<ZirRef>,
    },
    /// `while (cond) body`. `cond_body` computes `cond` on every iteration.
    Loop {
        cond_body: Vec<ZirRef>,
        cond: ZirRef,
        body: Vec<ZirRef>,
    },
    Block { body: Vec<ZirRef>, is_comptime: bool },
    Break,
    Continue,
    Unreachable,

    // =========================================
    // Builtins
    // =========================================
    CompileError { msg: String },
    Export { target: String, symbol: String },
    Breakpoint,
}

/// Instruction storage for one declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Zir {
    insts: Vec<ZirInst>,
    spans: Vec<Span>,
}

impl Zir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, inst: ZirInst, span: Span) -> ZirRef {
        let zir_ref = ZirRef(self.insts.len() as u32);
        self.insts.push(inst);
        self.spans.push(span);
        zir_ref
    }

    #[inline]
    pub fn inst(&self, zir_ref: ZirRef) -> &ZirInst {
        &self.insts[zir_ref.0 as usize]
    }

    #[inline]
    pub fn span(&self, zir_ref: ZirRef) -> Span {
        self.spans[zir_ref.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    fn write_body(
        &self,
        f: &mut fmt::Formatter<'_>,
        body: &[ZirRef],
        indent: usize,
    ) -> fmt::Result {
        for &zir_ref in body {
            write!(f, "{:indent$}{} = ", "", zir_ref, indent = indent)?;
            self.write_inst(f, zir_ref, indent)?;
            writeln!(f)?;
        }
        Ok(())
    }

    fn write_nested(
        &self,
        f: &mut fmt::Formatter<'_>,
        body: &[ZirRef],
        indent: usize,
    ) -> fmt::Result {
        writeln!(f, "{{")?;
        self.write_body(f, body, indent + 2)?;
        write!(f, "{:indent$}}}", "", indent = indent)
    }

    fn write_inst(
        &self,
        f: &mut fmt::Formatter<'_>,
        zir_ref: ZirRef,
        indent: usize,
    ) -> fmt::Result {
        let opt = |r: &Option<ZirRef>| r.map_or_else(|| "none".to_string(), |r| r.to_string());
        match self.inst(zir_ref) {
            ZirInst::Int(v) => write!(f, "int({})", v),
            ZirInst::Float(v) => write!(f, "float({})", v.0),
            ZirInst::Str(s) => write!(f, "str({:?})", s),
            ZirInst::Bool(b) => write!(f, "bool({})", b),
            ZirInst::Void => f.write_str("void_value"),
            ZirInst::Null => f.write_str("null"),
            ZirInst::Undefined => f.write_str("undefined"),
            ZirInst::PrimitiveType(ty) => write!(f, "primitive({})", ty),
            ZirInst::DeclVal { name } => write!(f, "declval({})", name),
            ZirInst::DeclRef { name } => write!(f, "declref({})", name),
            ZirInst::Arg { index } => write!(f, "arg({})", index),
            ZirInst::Alloc { ty, init } => write!(f, "alloc({}, {})", opt(ty), init),
            ZirInst::Store { ptr, value } => write!(f, "store({}, {})", ptr, value),
            ZirInst::Load { ptr } => write!(f, "load({})", ptr),
            ZirInst::Ref { operand } => write!(f, "ref({})", operand),
            ZirInst::Arith { op, lhs, rhs } => write!(f, "arith({}, {}, {})", op, lhs, rhs),
            ZirInst::Cmp { op, lhs, rhs } => write!(f, "cmp({}, {}, {})", op, lhs, rhs),
            ZirInst::BoolOp { is_and, lhs, rhs } => {
                write!(f, "{}({}, {})", if *is_and { "bool_and" } else { "bool_or" }, lhs, rhs)
            }
            ZirInst::Not { operand } => write!(f, "not({})", operand),
            ZirInst::Negate { operand } => write!(f, "negate({})", operand),
            ZirInst::As { ty, operand } => write!(f, "as({}, {})", ty, operand),
            ZirInst::PtrType {
                size,
                is_const,
                sentinel,
                child,
            } => write!(
                f,
                "ptr_type({:?}, const={}, sentinel={}, {})",
                size,
                is_const,
                opt(sentinel),
                child
            ),
            ZirInst::ArrayType { len, sentinel, child } => {
                write!(f, "array_type({}, sentinel={}, {})", len, opt(sentinel), child)
            }
            ZirInst::OptionalType { child } => write!(f, "optional_type({})", child),
            ZirInst::VectorType { len, child } => write!(f, "vector_type({}, {})", len, child),
            ZirInst::FnType { params, ret, cc } => {
                f.write_str("fn_type(")?;
                for param in params {
                    write!(f, "{}, ", param)?;
                }
                write!(f, "ret={}, cc={:?})", ret, cc)
            }
            ZirInst::ArrayInit { ty, elems } => {
                write!(f, "array_init({}", ty)?;
                for elem in elems {
                    write!(f, ", {}", elem)?;
                }
                f.write_str(")")
            }
            ZirInst::Call { callee, args } => {
                write!(f, "call({}", callee)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                f.write_str(")")
            }
            ZirInst::Ret { operand } => write!(f, "ret({})", opt(operand)),
            ZirInst::CondBr {
                cond,
                then_body,
                else_body,
            } => {
                write!(f, "condbr({}) ", cond)?;
                self.write_nested(f, then_body, indent)?;
                f.write_str(" else ")?;
                self.write_nested(f, else_body, indent)
            }
            ZirInst::Loop {
                cond_body,
                cond,
                body,
            } => {
                f.write_str("loop ")?;
                self.write_nested(f, cond_body, indent)?;
                write!(f, " while {} ", cond)?;
                self.write_nested(f, body, indent)
            }
            ZirInst::Block { body, is_comptime } => {
                f.write_str(if *is_comptime { "comptime_block " } else { "block " })?;
                self.write_nested(f, body, indent)
            }
            ZirInst::Break => f.write_str("break"),
            ZirInst::Continue => f.write_str("continue"),
            ZirInst::Unreachable => f.write_str("unreachable"),
            ZirInst::CompileError { msg } => write!(f, "compile_error({:?})", msg),
            ZirInst::Export { target, symbol } => write!(f, "export({}, {:?})", target, symbol),
            ZirInst::Breakpoint => f.write_str("breakpoint"),
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// A value-producing instruction sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ZirExpr {
    pub body: Vec<ZirRef>,
    pub result: ZirRef,
}

/// A lowered function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ZirFn {
    pub zir: Zir,
    /// Evaluates to the function type.
    pub sig: ZirExpr,
    pub params: Vec<String>,
    /// `None` for extern prototypes.
    pub body: Option<Vec<ZirRef>>,
    pub is_inline: bool,
}

/// A lowered container-level variable or constant.
#[derive(Debug, Clone, PartialEq)]
pub struct ZirVar {
    pub zir: Zir,
    pub ty: Option<ZirExpr>,
    pub init: Option<ZirExpr>,
    pub is_mutable: bool,
    pub is_extern: bool,
    pub is_threadlocal: bool,
    /// Location of the `const`/`var` keyword.
    pub mut_span: Span,
}

/// A lowered top-level `comptime` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ZirComptime {
    pub zir: Zir,
    pub body: Vec<ZirRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZirDeclKind {
    Fn(Arc<ZirFn>),
    Var(Arc<ZirVar>),
    Comptime(Arc<ZirComptime>),
}

/// One lowered top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ZirDecl {
    pub name: String,
    pub is_export: bool,
    /// Location of the whole declaration.
    pub src: Span,
    pub kind: ZirDeclKind,
}

impl ZirDecl {
    pub fn is_comptime(&self) -> bool {
        matches!(self.kind, ZirDeclKind::Comptime(_))
    }
}

impl fmt::Display for ZirDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_export {
            f.write_str("export ")?;
        }
        match &self.kind {
            ZirDeclKind::Fn(func) => {
                if func.is_inline {
                    f.write_str("inline ")?;
                }
                let params = func.params.join(", ");
                writeln!(f, "fn {}({}) sig={} {{", self.name, params, func.sig.result)?;
                func.zir.write_body(f, &func.sig.body, 2)?;
                match &func.body {
                    Some(body) => {
                        writeln!(f, "}} body {{")?;
                        func.zir.write_body(f, body, 2)?;
                        writeln!(f, "}}")
                    }
                    None => writeln!(f, "}} extern"),
                }
            }
            ZirDeclKind::Var(var) => {
                if var.is_extern {
                    f.write_str("extern ")?;
                }
                if var.is_threadlocal {
                    f.write_str("threadlocal ")?;
                }
                let keyword = if var.is_mutable { "var" } else { "const" };
                writeln!(f, "{} {} {{", keyword, self.name)?;
                if let Some(ty) = &var.ty {
                    var.zir.write_body(f, &ty.body, 2)?;
                    writeln!(f, "  type={}", ty.result)?;
                }
                if let Some(init) = &var.init {
                    var.zir.write_body(f, &init.body, 2)?;
                    writeln!(f, "  init={}", init.result)?;
                }
                writeln!(f, "}}")
            }
            ZirDeclKind::Comptime(block) => {
                writeln!(f, "comptime {} {{", self.name)?;
                block.zir.write_body(f, &block.body, 2)?;
                writeln!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn const_decl(value: i128) -> ZirDecl {
        let mut zir = Zir::new();
        let init = zir.add(ZirInst::Int(value), Span::new(10, 12));
        ZirDecl {
            name: "answer".into(),
            is_export: false,
            src: Span::new(0, 13),
            kind: ZirDeclKind::Var(Arc::new(ZirVar {
                zir,
                ty: None,
                init: Some(ZirExpr {
                    body: vec![init],
                    result: init,
                }),
                is_mutable: false,
                is_extern: false,
                is_threadlocal: false,
                mut_span: Span::new(0, 5),
            })),
        }
    }

    #[test]
    fn rendering_ignores_spans() {
        let a = const_decl(42);
        let mut b = const_decl(42);
        b.src = Span::new(100, 113);
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a.to_string(), const_decl(41).to_string());
    }

    #[test]
    fn nested_bodies_render() {
        let mut zir = Zir::new();
        let cond = zir.add(ZirInst::Bool(true), Span::default());
        let brk = zir.add(ZirInst::Break, Span::default());
        let lp = zir.add(
            ZirInst::Loop {
                cond_body: vec![cond],
                cond,
                body: vec![brk],
            },
            Span::default(),
        );
        let decl = ZirDecl {
            name: "comptime#0".into(),
            is_export: false,
            src: Span::default(),
            kind: ZirDeclKind::Comptime(Arc::new(ZirComptime {
                zir,
                body: vec![lp],
            })),
        };
        let text = decl.to_string();
        assert!(text.starts_with("comptime comptime#0 {"));
        assert!(text.contains("%2 = loop {"));
        assert!(text.contains("    %1 = break"));
        assert!(decl.is_comptime());
    }
}
