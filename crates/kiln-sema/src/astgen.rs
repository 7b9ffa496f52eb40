//! AST to ZIR lowering.
//!
//! Lowering is purely syntactic. Names that are not locals or primitive
//! types become `declval`/`declref` instructions resolved later by Sema, so
//! the result does not depend on any other declaration.
//!
//! Locals are tracked with `LocalVal`/`LocalPtr` scopes chained off a
//! `GenZir` scope and allocated in a per-call [`Bump`].

use std::sync::Arc;

use bumpalo::Bump;
use kiln_ast::ast::{
    self, BinaryOp, Block, Expr, ExprKind, FnDecl, Item, ItemKind, ModifierFlags, Modifiers, Stmt,
    StmtKind, UnaryOp, VarDecl,
};
use kiln_core::{CallingConvention, FileId, MAX_INT_BITS, Signedness, Span, Type};
use thiserror::Error;

use crate::scope::{self, LocalBinding, Scope};
use crate::zir::{Zir, ZirComptime, ZirDecl, ZirDeclKind, ZirExpr, ZirFn, ZirInst, ZirRef, ZirVar};

/// A lowering error at a source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{msg}")]
pub struct AstGenError {
    pub span: Span,
    pub msg: String,
}

impl AstGenError {
    fn new(span: Span, msg: impl Into<String>) -> Self {
        Self {
            span,
            msg: msg.into(),
        }
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

type GenResult<T> = Result<T, AstGenError>;

/// Map a primitive type name to its type.
pub fn primitive_type(name: &str) -> GenResult<Option<Type>> {
    let ty = match name {
        "bool" => Type::Bool,
        "void" => Type::Void,
        "type" => Type::Type,
        "noreturn" => Type::NoReturn,
        "comptime_int" => Type::ComptimeInt,
        "comptime_float" => Type::ComptimeFloat,
        "f16" => Type::F16,
        "f32" => Type::F32,
        "f64" => Type::F64,
        "f128" => Type::F128,
        "usize" => Type::USIZE,
        "isize" => Type::ISIZE,
        _ => {
            let (signedness, digits) = match name.split_at_checked(1) {
                Some(("u", digits)) => (Signedness::Unsigned, digits),
                Some(("i", digits)) => (Signedness::Signed, digits),
                _ => return Ok(None),
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(None);
            }
            match digits.parse::<u32>() {
                Ok(bits) if bits <= u32::from(MAX_INT_BITS) => Type::int(signedness, bits as u16),
                _ => {
                    return Err(AstGenError::new(
                        Span::default(),
                        format!(
                            "primitive integer type '{}' exceeds maximum bit width of {}",
                            name, MAX_INT_BITS
                        ),
                    ));
                }
            }
        }
    };
    Ok(Some(ty))
}

/// Lower one top-level item. `parent` is the scope of the owning decl.
pub fn lower_item(item: &Item, name: &str, parent: &Scope<'_>) -> GenResult<ZirDecl> {
    let bump = Bump::new();
    let mut gen_zir = GenZir {
        zir: Zir::new(),
        bump: &bump,
        loop_depth: 0,
        in_fn: false,
    };
    let scope: &Scope<'_> = bump.alloc(Scope::GenZir {
        parent,
        decl: scope::owner_decl(parent),
    });

    let kind = match &item.kind {
        ItemKind::Fn(func) => ZirDeclKind::Fn(Arc::new(gen_zir.fn_decl(scope, func, item.span)?)),
        ItemKind::Var(var) => ZirDeclKind::Var(Arc::new(gen_zir.var_decl(scope, var)?)),
        ItemKind::Comptime(block) => {
            let mut body = Vec::new();
            gen_zir.block_stmts(scope, &mut body, block)?;
            ZirDeclKind::Comptime(Arc::new(ZirComptime {
                zir: gen_zir.zir,
                body,
            }))
        }
        ItemKind::Test { .. } | ItemKind::UsingNamespace(_) | ItemKind::Field { .. } => {
            return Err(AstGenError::new(item.span, "declaration kind is not yet implemented"));
        }
    };
    Ok(ZirDecl {
        name: name.to_string(),
        is_export: item.is_exported(),
        src: item.span,
        kind,
    })
}

/// Lower every analyzable item of a parsed file, naming comptime blocks
/// by ordinal.
pub fn lower_file(file: &ast::File, unit: FileId) -> GenResult<Vec<ZirDecl>> {
    let root = Scope::ZirModule { file: unit };
    let mut decls = Vec::with_capacity(file.items.len());
    let mut comptime_index = 0;
    for item in &file.items {
        let name = match &item.kind {
            ItemKind::Fn(f) => f.name.name.clone(),
            ItemKind::Var(v) => v.name.name.clone(),
            ItemKind::Comptime(_) => {
                comptime_index += 1;
                format!("comptime#{}", comptime_index - 1)
            }
            _ => continue,
        };
        decls.push(lower_item(item, &name, &root)?);
    }
    Ok(decls)
}

fn check_not_implemented(
    modifiers: &Modifiers,
    align: &Option<Expr>,
    section: &Option<Expr>,
) -> GenResult<()> {
    if let Some(align) = align {
        return Err(AstGenError::new(align.span, "alignment is not yet implemented"));
    }
    if let Some(section) = section {
        return Err(AstGenError::new(section.span, "linksection is not yet implemented"));
    }
    if let Some((_, span)) = &modifiers.extern_lib {
        return Err(AstGenError::new(*span, "extern library names are not yet implemented"));
    }
    Ok(())
}

struct GenZir<'b> {
    zir: Zir,
    bump: &'b Bump,
    loop_depth: u32,
    in_fn: bool,
}

impl<'b> GenZir<'b> {
    fn add(&mut self, body: &mut Vec<ZirRef>, inst: ZirInst, span: Span) -> ZirRef {
        let zir_ref = self.zir.add(inst, span);
        body.push(zir_ref);
        zir_ref
    }

    fn local(&self, parent: &'b Scope<'b>, name: &str, binding: LocalBinding) -> &'b Scope<'b> {
        let name = self.bump.alloc_str(name);
        match binding {
            LocalBinding::Val(inst) => self.bump.alloc(Scope::LocalVal { parent, name, inst }),
            LocalBinding::Ptr(ptr) => self.bump.alloc(Scope::LocalPtr { parent, name, ptr }),
        }
    }

    // =========================================
    // Declarations
    // =========================================

    fn fn_decl(mut self, scope: &'b Scope<'b>, func: &FnDecl, src: Span) -> GenResult<ZirFn> {
        let modifiers = &func.modifiers;
        check_not_implemented(modifiers, &func.align, &func.section)?;
        let is_extern = modifiers.contains(ModifierFlags::EXTERN);
        let is_inline = modifiers.contains(ModifierFlags::INLINE);
        match (&func.body, is_extern) {
            (Some(body), true) => {
                return Err(AstGenError::new(body.span, "extern functions have no body"));
            }
            (None, false) => {
                return Err(AstGenError::new(func.fn_span, "non-extern function has no body"));
            }
            _ => {}
        }

        let mut sig_body = Vec::new();
        let mut params = Vec::with_capacity(func.params.len());
        let mut param_names: Vec<String> = Vec::with_capacity(func.params.len());
        for param in &func.params {
            if param_names.contains(&param.name.name) {
                return Err(AstGenError::new(
                    param.name.span,
                    format!("redeclaration of parameter '{}'", param.name.name),
                ));
            }
            params.push(self.expr(scope, &mut sig_body, &param.ty)?);
            param_names.push(param.name.name.clone());
        }
        let ret = self.expr(scope, &mut sig_body, &func.return_type)?;

        let mut cc = match &func.callconv {
            Some(expr) => match &expr.kind {
                ExprKind::Ident(name) if name == "C" => CallingConvention::C,
                ExprKind::Ident(name) if name == "Inline" => CallingConvention::Inline,
                ExprKind::Ident(name) if name == "Unspecified" => CallingConvention::Unspecified,
                _ => return Err(AstGenError::new(expr.span, "unknown calling convention")),
            },
            None if is_extern => CallingConvention::C,
            None => CallingConvention::Unspecified,
        };
        if is_inline {
            cc = CallingConvention::Inline;
        }
        let sig = self.add(&mut sig_body, ZirInst::FnType { params, ret, cc }, src);

        let body = match &func.body {
            Some(block) => {
                let mut body = Vec::new();
                let mut inner = scope;
                for (index, param) in func.params.iter().enumerate() {
                    let inst = ZirInst::Arg {
                        index: index as u32,
                    };
                    let arg = self.add(&mut body, inst, param.name.span);
                    inner = self.local(inner, &param.name.name, LocalBinding::Val(arg));
                }
                self.in_fn = true;
                self.block_stmts(inner, &mut body, block)?;
                Some(body)
            }
            None => None,
        };

        Ok(ZirFn {
            zir: self.zir,
            sig: ZirExpr {
                body: sig_body,
                result: sig,
            },
            params: param_names,
            body,
            is_inline: is_inline || cc == CallingConvention::Inline,
        })
    }

    fn var_decl(mut self, scope: &'b Scope<'b>, var: &VarDecl) -> GenResult<ZirVar> {
        let modifiers = &var.modifiers;
        check_not_implemented(modifiers, &var.align, &var.section)?;
        if let Some(span) = modifiers.span_of(ModifierFlags::INLINE) {
            return Err(AstGenError::new(span, "variables cannot be inline"));
        }
        let ty = match &var.ty {
            Some(expr) => Some(self.sub_expr(scope, expr)?),
            None => None,
        };
        let init = match &var.init {
            Some(expr) => Some(self.sub_expr(scope, expr)?),
            None => None,
        };
        Ok(ZirVar {
            zir: self.zir,
            ty,
            init,
            is_mutable: var.is_mutable,
            is_extern: modifiers.contains(ModifierFlags::EXTERN),
            is_threadlocal: modifiers.contains(ModifierFlags::THREADLOCAL),
            mut_span: var.mut_span,
        })
    }

    fn sub_expr(&mut self, scope: &'b Scope<'b>, expr: &Expr) -> GenResult<ZirExpr> {
        let mut body = Vec::new();
        let result = self.expr(scope, &mut body, expr)?;
        Ok(ZirExpr { body, result })
    }

    // =========================================
    // Statements
    // =========================================

    fn block_stmts(
        &mut self,
        mut scope: &'b Scope<'b>,
        body: &mut Vec<ZirRef>,
        block: &Block,
    ) -> GenResult<()> {
        for stmt in &block.stmts {
            scope = self.stmt(scope, body, stmt)?;
        }
        Ok(())
    }

    fn nested(&mut self, scope: &'b Scope<'b>, block: &Block) -> GenResult<Vec<ZirRef>> {
        let mut body = Vec::new();
        self.block_stmts(scope, &mut body, block)?;
        Ok(body)
    }

    /// Lower one statement, returning the scope for the statements after it.
    fn stmt(
        &mut self,
        scope: &'b Scope<'b>,
        body: &mut Vec<ZirRef>,
        stmt: &Stmt,
    ) -> GenResult<&'b Scope<'b>> {
        match &stmt.kind {
            StmtKind::Local(local) => {
                let name = &local.name.name;
                if scope::lookup_local(scope, name).is_some() {
                    return Err(AstGenError::new(
                        local.name.span,
                        format!("redeclaration of '{}'", name),
                    ));
                }
                let ty = match &local.ty {
                    Some(ty) => Some(self.expr(scope, body, ty)?),
                    None => None,
                };
                let mut init = self.expr(scope, body, &local.init)?;
                if local.is_mutable {
                    let ptr = self.add(body, ZirInst::Alloc { ty, init }, stmt.span);
                    return Ok(self.local(scope, name, LocalBinding::Ptr(ptr)));
                }
                if let Some(ty) = ty {
                    init = self.add(body, ZirInst::As { ty, operand: init }, local.init.span);
                }
                Ok(self.local(scope, name, LocalBinding::Val(init)))
            }
            StmtKind::Assign { target, value } => {
                self.assign(scope, body, target, value, stmt.span)?;
                Ok(scope)
            }
            StmtKind::Expr(expr) => {
                self.expr(scope, body, expr)?;
                Ok(scope)
            }
            StmtKind::Return(value) => {
                if !self.in_fn {
                    return Err(AstGenError::new(stmt.span, "return outside function body"));
                }
                let operand = match value {
                    Some(value) => Some(self.expr(scope, body, value)?),
                    None => None,
                };
                self.add(body, ZirInst::Ret { operand }, stmt.span);
                Ok(scope)
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.expr(scope, body, cond)?;
                let then_body = self.nested(scope, then_body)?;
                let else_body = match else_body {
                    Some(stmt) => {
                        let mut else_insts = Vec::new();
                        self.stmt(scope, &mut else_insts, stmt)?;
                        else_insts
                    }
                    None => Vec::new(),
                };
                self.add(
                    body,
                    ZirInst::CondBr {
                        cond,
                        then_body,
                        else_body,
                    },
                    stmt.span,
                );
                Ok(scope)
            }
            StmtKind::While { cond, body: loop_body } => {
                let mut cond_body = Vec::new();
                let cond = self.expr(scope, &mut cond_body, cond)?;
                self.loop_depth += 1;
                let loop_body = self.nested(scope, loop_body);
                self.loop_depth -= 1;
                self.add(
                    body,
                    ZirInst::Loop {
                        cond_body,
                        cond,
                        body: loop_body?,
                    },
                    stmt.span,
                );
                Ok(scope)
            }
            StmtKind::Block(block) => {
                let inner = self.nested(scope, block)?;
                self.add(
                    body,
                    ZirInst::Block {
                        body: inner,
                        is_comptime: false,
                    },
                    stmt.span,
                );
                Ok(scope)
            }
            StmtKind::Comptime(block) => {
                let inner = self.nested(scope, block)?;
                self.add(
                    body,
                    ZirInst::Block {
                        body: inner,
                        is_comptime: true,
                    },
                    stmt.span,
                );
                Ok(scope)
            }
            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(stmt.kind, StmtKind::Break);
                if self.loop_depth == 0 {
                    let what = if is_break { "break" } else { "continue" };
                    return Err(AstGenError::new(stmt.span, format!("{} outside of loop", what)));
                }
                let inst = if is_break { ZirInst::Break } else { ZirInst::Continue };
                self.add(body, inst, stmt.span);
                Ok(scope)
            }
        }
    }

    fn assign(
        &mut self,
        scope: &'b Scope<'b>,
        body: &mut Vec<ZirRef>,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> GenResult<()> {
        let ptr = match &target.kind {
            // Discard.
            ExprKind::Ident(name) if name == "_" => {
                self.expr(scope, body, value)?;
                return Ok(());
            }
            ExprKind::Ident(name) => match scope::lookup_local(scope, name) {
                Some(LocalBinding::Ptr(ptr)) => ptr,
                Some(LocalBinding::Val(_)) => {
                    return Err(AstGenError::new(target.span, "cannot assign to constant"));
                }
                None => self.add(body, ZirInst::DeclRef { name: name.clone() }, target.span),
            },
            ExprKind::Deref(ptr) => self.expr(scope, body, ptr)?,
            _ => return Err(AstGenError::new(target.span, "invalid assignment target")),
        };
        let value = self.expr(scope, body, value)?;
        self.add(body, ZirInst::Store { ptr, value }, span);
        Ok(())
    }

    // =========================================
    // Expressions
    // =========================================

    fn expr(
        &mut self,
        scope: &'b Scope<'b>,
        body: &mut Vec<ZirRef>,
        expr: &Expr,
    ) -> GenResult<ZirRef> {
        let span = expr.span;
        let inst = match &expr.kind {
            ExprKind::Int(v) => ZirInst::Int(*v),
            ExprKind::Float(v) => ZirInst::Float(*v),
            ExprKind::Str(s) => ZirInst::Str(s.clone()),
            ExprKind::Bool(b) => ZirInst::Bool(*b),
            ExprKind::Null => ZirInst::Null,
            ExprKind::Undefined => ZirInst::Undefined,
            ExprKind::Unreachable => ZirInst::Unreachable,
            ExprKind::Ident(name) => return self.ident(scope, body, name, span),
            ExprKind::Builtin { name, args } => return self.builtin(scope, body, name, args, span),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Negate => ZirInst::Negate {
                    operand: self.expr(scope, body, operand)?,
                },
                UnaryOp::Not => ZirInst::Not {
                    operand: self.expr(scope, body, operand)?,
                },
                UnaryOp::AddressOf => return self.address_of(scope, body, operand, span),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(scope, body, lhs)?;
                let rhs = self.expr(scope, body, rhs)?;
                match op {
                    BinaryOp::Arith(op) => ZirInst::Arith { op: *op, lhs, rhs },
                    BinaryOp::Cmp(op) => ZirInst::Cmp { op: *op, lhs, rhs },
                    BinaryOp::And => ZirInst::BoolOp {
                        is_and: true,
                        lhs,
                        rhs,
                    },
                    BinaryOp::Or => ZirInst::BoolOp {
                        is_and: false,
                        lhs,
                        rhs,
                    },
                }
            }
            ExprKind::Call { callee, args } => {
                let callee = self.expr(scope, body, callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.expr(scope, body, arg))
                    .collect::<GenResult<Vec<_>>>()?;
                ZirInst::Call { callee, args }
            }
            ExprKind::Deref(ptr) => ZirInst::Load {
                ptr: self.expr(scope, body, ptr)?,
            },
            ExprKind::PtrType {
                size,
                is_const,
                sentinel,
                child,
            } => {
                let sentinel = match sentinel {
                    Some(s) => Some(self.expr(scope, body, s)?),
                    None => None,
                };
                ZirInst::PtrType {
                    size: *size,
                    is_const: *is_const,
                    sentinel,
                    child: self.expr(scope, body, child)?,
                }
            }
            ExprKind::ArrayType { len, sentinel, child } => {
                let len = self.expr(scope, body, len)?;
                let sentinel = match sentinel {
                    Some(s) => Some(self.expr(scope, body, s)?),
                    None => None,
                };
                ZirInst::ArrayType {
                    len,
                    sentinel,
                    child: self.expr(scope, body, child)?,
                }
            }
            ExprKind::OptionalType(child) => ZirInst::OptionalType {
                child: self.expr(scope, body, child)?,
            },
            ExprKind::ArrayInit { ty, elems } => {
                let ty = self.expr(scope, body, ty)?;
                let elems = elems
                    .iter()
                    .map(|elem| self.expr(scope, body, elem))
                    .collect::<GenResult<Vec<_>>>()?;
                ZirInst::ArrayInit { ty, elems }
            }
        };
        Ok(self.add(body, inst, span))
    }

    fn ident(
        &mut self,
        scope: &'b Scope<'b>,
        body: &mut Vec<ZirRef>,
        name: &str,
        span: Span,
    ) -> GenResult<ZirRef> {
        match scope::lookup_local(scope, name) {
            Some(LocalBinding::Val(inst)) => return Ok(inst),
            Some(LocalBinding::Ptr(ptr)) => return Ok(self.add(body, ZirInst::Load { ptr }, span)),
            None => {}
        }
        let primitive = primitive_type(name).map_err(|err| AstGenError::new(span, err.msg))?;
        let inst = match primitive {
            Some(ty) => ZirInst::PrimitiveType(ty),
            None => ZirInst::DeclVal {
                name: name.to_string(),
            },
        };
        Ok(self.add(body, inst, span))
    }

    fn address_of(
        &mut self,
        scope: &'b Scope<'b>,
        body: &mut Vec<ZirRef>,
        operand: &Expr,
        span: Span,
    ) -> GenResult<ZirRef> {
        if let ExprKind::Ident(name) = &operand.kind {
            match scope::lookup_local(scope, name) {
                Some(LocalBinding::Ptr(ptr)) => return Ok(ptr),
                Some(LocalBinding::Val(inst)) => {
                    return Ok(self.add(body, ZirInst::Ref { operand: inst }, span));
                }
                None if primitive_type(name).ok().flatten().is_none() => {
                    return Ok(self.add(body, ZirInst::DeclRef { name: name.clone() }, span));
                }
                None => {}
            }
        }
        let operand = self.expr(scope, body, operand)?;
        Ok(self.add(body, ZirInst::Ref { operand }, span))
    }

    fn builtin(
        &mut self,
        scope: &'b Scope<'b>,
        body: &mut Vec<ZirRef>,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> GenResult<ZirRef> {
        let expected = match name {
            "as" | "export" | "Vector" => 2,
            "compileError" => 1,
            "breakpoint" => 0,
            _ => {
                return Err(AstGenError::new(
                    span,
                    format!("invalid builtin function: '@{}'", name),
                ));
            }
        };
        if args.len() != expected {
            return Err(AstGenError::new(
                span,
                format!("expected {} arguments, found {}", expected, args.len()),
            ));
        }
        let inst = match name {
            "as" => {
                let ty = self.expr(scope, body, &args[0])?;
                let operand = self.expr(scope, body, &args[1])?;
                ZirInst::As { ty, operand }
            }
            "Vector" => {
                let len = self.expr(scope, body, &args[0])?;
                let child = self.expr(scope, body, &args[1])?;
                ZirInst::VectorType { len, child }
            }
            "export" => {
                let ExprKind::Ident(target) = &args[0].kind else {
                    return Err(AstGenError::new(args[0].span, "expected declaration name"));
                };
                let ExprKind::Str(symbol) = &args[1].kind else {
                    return Err(AstGenError::new(args[1].span, "expected string literal"));
                };
                ZirInst::Export {
                    target: target.clone(),
                    symbol: symbol.clone(),
                }
            }
            "compileError" => {
                let ExprKind::Str(msg) = &args[0].kind else {
                    return Err(AstGenError::new(args[0].span, "expected string literal"));
                };
                ZirInst::CompileError { msg: msg.clone() }
            }
            _ => ZirInst::Breakpoint,
        };
        Ok(self.add(body, inst, span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lower(source: &str) -> GenResult<Vec<ZirDecl>> {
        let file = kiln_ast::parse(source).expect("source parses");
        lower_file(&file, FileId(0))
    }

    fn lower_err(source: &str) -> String {
        lower(source).expect_err("lowering should fail").msg
    }

    #[test]
    fn primitives() {
        assert_eq!(primitive_type("u8").unwrap(), Some(Type::U8));
        assert_eq!(primitive_type("i33").unwrap(), Some(Type::int(Signedness::Signed, 33)));
        assert_eq!(primitive_type("u0").unwrap(), Some(Type::int(Signedness::Unsigned, 0)));
        assert_eq!(primitive_type("usize").unwrap(), Some(Type::USIZE));
        assert_eq!(primitive_type("u").unwrap(), None);
        assert_eq!(primitive_type("u8x").unwrap(), None);
        assert_eq!(primitive_type("foo").unwrap(), None);
        assert!(primitive_type("u65536").is_err());
    }

    #[test]
    fn fn_params_become_args() {
        let decls = lower("fn add(a: u32, b: u32) u32 { return a + b; }").unwrap();
        let ZirDeclKind::Fn(func) = &decls[0].kind else {
            panic!("expected fn");
        };
        assert_eq!(func.params, vec!["a".to_string(), "b".to_string()]);
        let body = func.body.as_ref().unwrap();
        assert!(matches!(func.zir.inst(body[0]), ZirInst::Arg { index: 0 }));
        assert!(matches!(func.zir.inst(body[1]), ZirInst::Arg { index: 1 }));
        assert!(matches!(
            func.zir.inst(body[2]),
            ZirInst::Arith { lhs, rhs, .. } if *lhs == body[0] && *rhs == body[1]
        ));
        assert!(matches!(func.zir.inst(body[3]), ZirInst::Ret { operand: Some(_) }));
        assert!(matches!(func.zir.inst(func.sig.result), ZirInst::FnType { .. }));
    }

    #[test]
    fn names_resolve_lazily() {
        let decls = lower("const a = b + 1;").unwrap();
        let ZirDeclKind::Var(var) = &decls[0].kind else {
            panic!("expected var");
        };
        let init = var.init.as_ref().unwrap();
        assert_eq!(
            var.zir.inst(init.body[0]),
            &ZirInst::DeclVal { name: "b".into() }
        );
    }

    #[test]
    fn inline_and_extern_calling_conventions() {
        let decls = lower("inline fn f() void {}\nextern fn g() void;").unwrap();
        let ZirDeclKind::Fn(f) = &decls[0].kind else { panic!() };
        let ZirDeclKind::Fn(g) = &decls[1].kind else { panic!() };
        assert!(f.is_inline);
        assert!(matches!(
            f.zir.inst(f.sig.result),
            ZirInst::FnType { cc: CallingConvention::Inline, .. }
        ));
        assert!(g.body.is_none());
        assert!(matches!(
            g.zir.inst(g.sig.result),
            ZirInst::FnType { cc: CallingConvention::C, .. }
        ));
    }

    #[test]
    fn modifier_errors() {
        assert_eq!(lower_err("fn f() void;"), "non-extern function has no body");
        assert_eq!(lower_err("extern fn f() void {}"), "extern functions have no body");
        assert_eq!(lower_err("fn f() align(4) void {}"), "alignment is not yet implemented");
        assert_eq!(
            lower_err("var x: u32 linksection(\".data\") = 1;"),
            "linksection is not yet implemented"
        );
        assert_eq!(
            lower_err("extern \"c\" fn f() void;"),
            "extern library names are not yet implemented"
        );
    }

    #[test]
    fn body_errors() {
        assert_eq!(lower_err("fn f() void { const x = 1; x = 2; }"), "cannot assign to constant");
        assert_eq!(lower_err("fn f() void { break; }"), "break outside of loop");
        assert_eq!(lower_err("comptime { return; }"), "return outside function body");
        assert_eq!(lower_err("comptime { @foo(); }"), "invalid builtin function: '@foo'");
        assert_eq!(lower_err("fn f(a: u8, a: u8) void {}"), "redeclaration of parameter 'a'");
    }

    #[test]
    fn mutable_locals_use_alloc() {
        let decls = lower("fn f() void { var x: u32 = 1; x = 2; _ = &x; }").unwrap();
        let ZirDeclKind::Fn(func) = &decls[0].kind else { panic!() };
        let body = func.body.as_ref().unwrap();
        let alloc = body
            .iter()
            .copied()
            .find(|r| matches!(func.zir.inst(*r), ZirInst::Alloc { .. }))
            .unwrap();
        assert!(body.iter().any(|r| matches!(
            func.zir.inst(*r),
            ZirInst::Store { ptr, .. } if *ptr == alloc
        )));
    }

    #[test]
    fn comptime_blocks_are_numbered() {
        let decls = lower("comptime {}\ncomptime {}\n").unwrap();
        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["comptime#0", "comptime#1"]);
    }
}
