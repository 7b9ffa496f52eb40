//! Function calls.
//!
//! A call inside a compile-time block interprets the callee's ZIR in a fresh
//! [`Frame`]. A call to an inline function expands the callee body into a
//! `block` at the call site; its returns become `br`s out of that block.
//! Everything else is a runtime `call` instruction.

use std::sync::Arc;

use kiln_core::{CallingConvention, DeclId, FnType, InnerResult, Span, Type, Value};
use tracing::trace;

use super::{Flow, Frame, FrameKind, Sema, Step};
use crate::backend::Backend;
use crate::builder::Block;
use crate::decl::Decl;
use crate::ir::InstRef;
use crate::zir::{ZirFn, ZirRef};

impl<B: Backend> Sema<'_, B> {
    pub(super) fn analyze_call(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        callee: ZirRef,
        args: &[ZirRef],
        span: Span,
    ) -> InnerResult<Step> {
        let callee = self.resolve(frame, callee)?;
        let callee_ty = block.arena.ty(callee).clone();
        let Some(fn_ty) = callee_ty.fn_info().cloned() else {
            return Err(self.fail(span, format!("type '{}' not a function", callee_ty)));
        };
        if args.len() != fn_ty.params.len() {
            return Err(self.fail(
                span,
                format!("expected {} argument(s), found {}", fn_ty.params.len(), args.len()),
            ));
        }

        let mut coerced = Vec::with_capacity(args.len());
        for (&arg, param_ty) in args.iter().zip(&fn_ty.params) {
            let arg_span = frame.zir.span(arg);
            let inst = self.resolve(frame, arg)?;
            coerced.push(self.coerce(block, param_ty, inst, arg_span)?);
        }

        let result = match block.arena.value(callee).cloned() {
            Some(Value::Function(decl)) if block.is_comptime => {
                self.comptime_call(block, decl, &fn_ty, coerced, span)?
            }
            Some(Value::ExternFn(_)) if block.is_comptime => {
                return Err(self.fail(span, "unable to call extern function at compile time"));
            }
            Some(Value::Function(decl)) if self.is_inline(decl, &fn_ty) => {
                self.inline_call(block, decl, &fn_ty, coerced, span)?
            }
            _ => {
                self.require_runtime(block, span)?;
                block.add_call(callee, coerced, fn_ty.ret.clone(), span)?
            }
        };
        if fn_ty.ret == Type::NoReturn && !block.is_comptime {
            return Ok(Step::Flow(Flow::NoReturn));
        }
        Ok(Step::Value(result))
    }

    fn is_inline(&self, decl: DeclId, fn_ty: &FnType) -> bool {
        fn_ty.cc == CallingConvention::Inline
            || self.module.decls.get(&decl).is_some_and(Decl::is_inline_fn)
    }

    fn callee_zir(&mut self, decl: DeclId, span: Span) -> InnerResult<Arc<ZirFn>> {
        match self.module.decls.get(&decl).and_then(Decl::func) {
            Some(func) => Ok(func.zir.clone()),
            None => Err(self.fail(span, "function has no body")),
        }
    }

    fn enter_call(&mut self, span: Span) -> InnerResult<()> {
        let max_depth = self.module.options.max_comptime_call_depth;
        if self.call_depth >= max_depth {
            return Err(self.fail(
                span,
                format!("evaluation exceeded maximum call depth of {}", max_depth),
            ));
        }
        self.call_depth += 1;
        Ok(())
    }

    fn comptime_call(
        &mut self,
        block: &mut Block<'_>,
        decl: DeclId,
        fn_ty: &FnType,
        args: Vec<InstRef>,
        span: Span,
    ) -> InnerResult<InstRef> {
        self.branch_tick(span)?;
        for &arg in &args {
            self.require_comptime(block, arg, span)?;
        }
        let zir_fn = self.callee_zir(decl, span)?;
        let Some(body) = zir_fn.body.as_ref() else {
            return Err(self.fail(span, "unable to call extern function at compile time"));
        };
        let mut callee = Frame::new(&zir_fn.zir, fn_ty.ret.clone(), FrameKind::Comptime);
        callee.args = args;

        trace!(callee = %decl, depth = self.call_depth, "comptime call");
        self.enter_call(span)?;
        let flow = {
            let mut child = block.comptime_child();
            self.analyze_body(&mut callee, &mut child, body)
        };
        self.call_depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            _ if fn_ty.ret == Type::Void => block.add_constant(Type::Void, Value::Void, span),
            _ => Err(self.fail(span, format!("expected '{}', found 'void'", fn_ty.ret))),
        }
    }

    fn inline_call(
        &mut self,
        block: &mut Block<'_>,
        decl: DeclId,
        fn_ty: &FnType,
        args: Vec<InstRef>,
        span: Span,
    ) -> InnerResult<InstRef> {
        let zir_fn = self.callee_zir(decl, span)?;
        let Some(body) = zir_fn.body.as_ref() else {
            return Err(self.fail(span, "function has no body"));
        };
        let target = block.add_block(fn_ty.ret.clone(), span)?;
        let kind = FrameKind::Inline { block: target };
        let mut callee = Frame::new(&zir_fn.zir, fn_ty.ret.clone(), kind);
        callee.args = args;

        self.enter_call(span)?;
        let expanded = {
            let mut child = block.child();
            self.inline_body(&mut callee, &mut child, body, target, span)
                .map(|()| child.into_body())
        };
        self.call_depth -= 1;

        block.arena.set_body(target, expanded?);
        Ok(target)
    }

    fn inline_body(
        &mut self,
        callee: &mut Frame<'_>,
        child: &mut Block<'_>,
        body: &[ZirRef],
        target: InstRef,
        span: Span,
    ) -> InnerResult<()> {
        match self.analyze_body(callee, child, body)? {
            Flow::NoReturn => Ok(()),
            _ if callee.ret_ty == Type::Void => {
                child.add_br(target, None, span)?;
                Ok(())
            }
            _ => Err(self.fail(span, format!("expected '{}', found 'void'", callee.ret_ty))),
        }
    }
}
