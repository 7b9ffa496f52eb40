//! Semantic analysis of ZIR bodies.
//!
//! [`Sema`] walks ZIR on behalf of one owner decl. Inside a compile-time
//! [`Block`] it interprets: every operand must be a constant and control flow
//! is decided on the spot. Inside a runtime block it emits typed IR, folding
//! whatever happens to be compile-time known.
//!
//! Every reference to another decl goes through [`Sema::resolve_decl`], which
//! records the dependency edge before forcing the target's analysis.

mod arith;
mod call;
mod cmp;
mod coerce;

use std::sync::Arc;

use kiln_core::{
    ArrayType, DeclId, FileId, InnerError, InnerResult, PointerType, PtrSize, Span, Type,
    TypedValue, Value,
};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::backend::Backend;
use crate::builder::Block;
use crate::decl::{AnalysisState, Decl, FnState};
use crate::ir::{BinOp, InstRef, NoOp, UnOp};
use crate::module::Module;
use crate::scope::{self, Scope};
use crate::work::WorkQueue;
use crate::zir::{Zir, ZirExpr, ZirInst, ZirRef};

/// How control left a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Fell off the end.
    Next,
    Break,
    Continue,
    /// A compile-time call returned this value.
    Return(InstRef),
    /// A runtime terminator was emitted.
    NoReturn,
}

/// What a `ret` in the current frame means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Runtime,
    /// Break out of the call-site block.
    Inline { block: InstRef },
    Comptime,
}

#[derive(Debug, Clone, Copy)]
struct LoopTargets {
    brk: InstRef,
    cont: InstRef,
}

/// Per-call analysis state: ZIR to IR mapping and the function context.
pub(crate) struct Frame<'z> {
    zir: &'z Zir,
    inst_map: FxHashMap<ZirRef, InstRef>,
    pub(crate) args: Vec<InstRef>,
    ret_ty: Type,
    kind: FrameKind,
    /// `None` marks a loop being interpreted.
    loops: Vec<Option<LoopTargets>>,
}

impl<'z> Frame<'z> {
    pub(crate) fn new(zir: &'z Zir, ret_ty: Type, kind: FrameKind) -> Self {
        Self {
            zir,
            inst_map: FxHashMap::default(),
            args: Vec::new(),
            ret_ty,
            kind,
            loops: Vec::new(),
        }
    }
}

enum Step {
    Value(InstRef),
    Done,
    Flow(Flow),
}

fn invalid_vector_elem_msg(child: &Type) -> String {
    format!(
        "expected integer, float, bool, or pointer for the vector element type; found '{child}'"
    )
}

pub(crate) struct Sema<'a, B: Backend> {
    pub(crate) module: &'a mut Module<B>,
    pub(crate) queue: &'a mut WorkQueue,
    pub(crate) scope: &'a Scope<'a>,
    pub(crate) owner: DeclId,
    pub(crate) func: Option<DeclId>,
    pub(crate) file: FileId,
    branch_count: u32,
    call_depth: u32,
    comptime_slots: Vec<TypedValue>,
}

impl<'a, B: Backend> Sema<'a, B> {
    pub(crate) fn new(
        module: &'a mut Module<B>,
        queue: &'a mut WorkQueue,
        scope: &'a Scope<'a>,
        owner: DeclId,
    ) -> Self {
        Self {
            func: scope::func(scope),
            file: scope::file(scope),
            module,
            queue,
            scope,
            owner,
            branch_count: 0,
            call_depth: 0,
            comptime_slots: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, span: Span, msg: impl Into<String>) -> InnerError {
        self.module.fail(self.scope, span, msg)
    }

    fn require_runtime(&mut self, block: &Block<'_>, span: Span) -> InnerResult<()> {
        if block.is_comptime {
            return Err(self.fail(span, "unable to evaluate constant expression"));
        }
        Ok(())
    }

    pub(crate) fn require_comptime(
        &mut self,
        block: &Block<'_>,
        inst: InstRef,
        span: Span,
    ) -> InnerResult<Value> {
        match block.arena.value(inst) {
            Some(val) => Ok(val.clone()),
            None => Err(self.fail(span, "unable to evaluate constant expression")),
        }
    }

    /// Count one backward branch or compile-time call against the quota.
    fn branch_tick(&mut self, span: Span) -> InnerResult<()> {
        self.branch_count += 1;
        let quota = self.module.options.eval_branch_quota;
        if self.branch_count > quota {
            trace!(quota, "branch quota exhausted");
            return Err(self.fail(
                span,
                format!("evaluation exceeded {} backwards branches", quota),
            ));
        }
        Ok(())
    }

    // =========================================
    // Declarations
    // =========================================

    /// Look up `name`, record the dependency and make sure it is analyzed.
    pub(crate) fn resolve_decl(&mut self, name: &str, span: Span) -> InnerResult<DeclId> {
        let Some(target) = self.module.lookup_decl(self.file, name) else {
            return Err(self.fail(span, format!("use of undeclared identifier '{}'", name)));
        };
        self.module.declare_dependency(self.owner, target);

        let in_progress = self
            .module
            .decls
            .get(&target)
            .is_some_and(|d| d.analysis == AnalysisState::InProgress);
        if in_progress {
            return Err(self.fail(span, "dependency loop detected"));
        }

        match self.module.ensure_decl_analyzed(self.queue, target) {
            Ok(()) => Ok(target),
            Err(InnerError::AnalysisFail) => {
                self.dependency_failed();
                Err(InnerError::AnalysisFail)
            }
            Err(err) => Err(err),
        }
    }

    fn dependency_failed(&mut self) {
        match self.func {
            Some(func) => {
                if let Some(f) = self.module.decls.get_mut(&func).and_then(Decl::func_mut)
                    && f.state == FnState::InProgress
                {
                    f.state = FnState::DependencyFailure;
                }
            }
            None => {
                if let Some(decl) = self.module.decls.get_mut(&self.owner)
                    && decl.analysis == AnalysisState::InProgress
                {
                    decl.analysis = AnalysisState::DependencyFailure;
                }
            }
        }
    }

    fn decl_typed_value(&mut self, decl: DeclId, span: Span) -> InnerResult<TypedValue> {
        let tv = self
            .module
            .decls
            .get(&decl)
            .and_then(|d| d.typed_value.as_ref())
            .map(|tv| TypedValue::new(tv.ty.clone(), tv.val.clone()));
        match tv {
            Some(tv) => Ok(tv),
            None => Err(self.fail(span, "declaration has no value")),
        }
    }

    fn decl_val(&mut self, block: &mut Block<'_>, name: &str, span: Span) -> InnerResult<InstRef> {
        let target = self.resolve_decl(name, span)?;
        let tv = self.decl_typed_value(target, span)?;
        match &tv.val {
            Value::Variable(var) => {
                self.require_runtime(block, span)?;
                let ptr_ty = Type::single_ptr(tv.ty.clone(), !var.is_mutable);
                let ptr = block.add_constant(ptr_ty, Value::DeclRef(target), span)?;
                block.add_un_op(UnOp::Load, tv.ty, ptr, span)
            }
            _ => block.add_constant(tv.ty, tv.val, span),
        }
    }

    fn decl_ref(&mut self, block: &mut Block<'_>, name: &str, span: Span) -> InnerResult<InstRef> {
        let target = self.resolve_decl(name, span)?;
        let tv = self.decl_typed_value(target, span)?;
        let is_const = !matches!(&tv.val, Value::Variable(var) if var.is_mutable);
        block.add_constant(Type::single_ptr(tv.ty, is_const), Value::DeclRef(target), span)
    }

    fn export(&mut self, target: &str, symbol: &str, span: Span) -> InnerResult<()> {
        let target = self.resolve_decl(target, span)?;
        self.module
            .analyze_export(self.queue, self.scope, span, symbol, target)
    }

    // =========================================
    // Bodies
    // =========================================

    pub(crate) fn analyze_body(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        body: &[ZirRef],
    ) -> InnerResult<Flow> {
        for &zir_ref in body {
            match self.analyze_inst(frame, block, zir_ref)? {
                Step::Value(inst) => {
                    frame.inst_map.insert(zir_ref, inst);
                }
                Step::Done => {}
                Step::Flow(flow) => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    pub(crate) fn analyze_expr(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        expr: &ZirExpr,
    ) -> InnerResult<InstRef> {
        self.analyze_body(frame, block, &expr.body)?;
        self.resolve(frame, expr.result)
    }

    /// Emit parameters, analyze `body` and close a void function that
    /// falls off its end.
    pub(crate) fn analyze_fn_body(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        params: &[Type],
        body: &[ZirRef],
        src: Span,
    ) -> InnerResult<()> {
        for (index, ty) in params.iter().enumerate() {
            let arg = block.add_arg(index as u32, ty.clone(), src)?;
            frame.args.push(arg);
        }
        match self.analyze_body(frame, block, body)? {
            Flow::NoReturn => Ok(()),
            _ if frame.ret_ty == Type::Void => {
                block.add_no_op(NoOp::RetVoid, Type::NoReturn, Span::point(src.end))?;
                Ok(())
            }
            _ => Err(self.fail(src, format!("expected '{}', found 'void'", frame.ret_ty))),
        }
    }

    fn resolve(&mut self, frame: &Frame<'_>, zir_ref: ZirRef) -> InnerResult<InstRef> {
        match frame.inst_map.get(&zir_ref) {
            Some(&inst) => Ok(inst),
            None => Err(self.fail(
                frame.zir.span(zir_ref),
                "use of a value that was never computed",
            )),
        }
    }

    pub(crate) fn inst_as_type(
        &mut self,
        block: &Block<'_>,
        inst: InstRef,
        span: Span,
    ) -> InnerResult<Type> {
        match block.arena.value(inst) {
            Some(Value::Type(ty)) => Ok(ty.clone()),
            _ => {
                let found = block.arena.ty(inst).clone();
                Err(self.fail(span, format!("expected type, found '{}'", found)))
            }
        }
    }

    fn resolve_type(
        &mut self,
        frame: &Frame<'_>,
        block: &Block<'_>,
        zir_ref: ZirRef,
    ) -> InnerResult<Type> {
        let inst = self.resolve(frame, zir_ref)?;
        self.inst_as_type(block, inst, frame.zir.span(zir_ref))
    }

    /// A compile-time integer operand coerced to `dest`.
    fn resolve_int(
        &mut self,
        frame: &Frame<'_>,
        block: &mut Block<'_>,
        zir_ref: ZirRef,
        dest: &Type,
    ) -> InnerResult<i128> {
        let span = frame.zir.span(zir_ref);
        let inst = self.resolve(frame, zir_ref)?;
        let inst = self.coerce(block, dest, inst, span)?;
        match self.require_comptime(block, inst, span)? {
            Value::Int(v) => Ok(v),
            other => Err(self.fail(span, format!("expected integer, found '{}'", other))),
        }
    }

    fn analyze_inst(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        zir_ref: ZirRef,
    ) -> InnerResult<Step> {
        let zir = frame.zir;
        let span = zir.span(zir_ref);
        let inst = match zir.inst(zir_ref) {
            ZirInst::Int(v) => block.add_constant(Type::ComptimeInt, Value::Int(*v), span)?,
            ZirInst::Float(v) => block.add_constant(Type::ComptimeFloat, Value::Float(*v), span)?,
            ZirInst::Str(s) => {
                let bytes: Arc<[Value]> = s.bytes().map(|b| Value::Int(i128::from(b))).collect();
                let len = bytes.len() as u64;
                let val = Value::Slice {
                    ptr: Arc::new(Value::Array(bytes)),
                    len,
                };
                block.add_constant(Type::slice(Type::U8, true), val, span)?
            }
            ZirInst::Bool(b) => block.add_constant(Type::Bool, Value::Bool(*b), span)?,
            ZirInst::Void => block.add_constant(Type::Void, Value::Void, span)?,
            ZirInst::Null => block.add_constant(Type::Null, Value::Null, span)?,
            ZirInst::Undefined => block.add_constant(Type::Undefined, Value::Undefined, span)?,
            ZirInst::PrimitiveType(ty) => {
                block.add_constant(Type::Type, Value::Type(ty.clone()), span)?
            }
            ZirInst::DeclVal { name } => self.decl_val(block, name, span)?,
            ZirInst::DeclRef { name } => self.decl_ref(block, name, span)?,
            ZirInst::Arg { index } => match frame.args.get(*index as usize) {
                Some(&arg) => arg,
                None => return Err(self.fail(span, format!("parameter {} does not exist", index))),
            },

            ZirInst::Alloc { ty, init } => {
                let init = self.resolve(frame, *init)?;
                let ty = match ty {
                    Some(ty) => self.resolve_type(frame, block, *ty)?,
                    None => block.arena.ty(init).clone(),
                };
                self.alloc(block, ty, init, span)?
            }
            ZirInst::Store { ptr, value } => {
                let ptr = self.resolve(frame, *ptr)?;
                let value = self.resolve(frame, *value)?;
                self.store(block, ptr, value, span)?;
                return Ok(Step::Done);
            }
            ZirInst::Load { ptr } => {
                let ptr = self.resolve(frame, *ptr)?;
                self.load(block, ptr, span)?
            }
            ZirInst::Ref { operand } => {
                let operand = self.resolve(frame, *operand)?;
                self.make_ref(block, operand, span)?
            }

            ZirInst::Arith { op, lhs, rhs } => {
                let (lhs, rhs) = (self.resolve(frame, *lhs)?, self.resolve(frame, *rhs)?);
                self.analyze_arith(block, *op, lhs, rhs, span)?
            }
            ZirInst::Cmp { op, lhs, rhs } => {
                let (lhs, rhs) = (self.resolve(frame, *lhs)?, self.resolve(frame, *rhs)?);
                self.analyze_cmp(block, *op, lhs, rhs, span)?
            }
            ZirInst::BoolOp { is_and, lhs, rhs } => {
                let (lhs, rhs) = (self.resolve(frame, *lhs)?, self.resolve(frame, *rhs)?);
                self.analyze_bool_op(block, *is_and, lhs, rhs, span)?
            }
            ZirInst::Not { operand } => {
                let operand = self.resolve(frame, *operand)?;
                self.analyze_not(block, operand, span)?
            }
            ZirInst::Negate { operand } => {
                let operand = self.resolve(frame, *operand)?;
                self.analyze_negate(block, operand, span)?
            }
            ZirInst::As { ty, operand } => {
                let ty = self.resolve_type(frame, block, *ty)?;
                let operand = self.resolve(frame, *operand)?;
                self.coerce(block, &ty, operand, span)?
            }

            ZirInst::PtrType {
                size,
                is_const,
                sentinel,
                child,
            } => {
                let child = self.resolve_type(frame, block, *child)?;
                let sentinel = match sentinel {
                    Some(s) => Some(self.resolve_int(frame, block, *s, &child)?),
                    None => None,
                };
                let ty = Type::Pointer(Arc::new(PointerType {
                    size: *size,
                    child,
                    is_const: *is_const,
                    sentinel,
                }));
                block.add_constant(Type::Type, Value::Type(ty), span)?
            }
            ZirInst::ArrayType { len, sentinel, child } => {
                let len = self.resolve_int(frame, block, *len, &Type::USIZE)? as u64;
                let child = self.resolve_type(frame, block, *child)?;
                let sentinel = match sentinel {
                    Some(s) => Some(self.resolve_int(frame, block, *s, &child)?),
                    None => None,
                };
                let ty = Type::Array(Arc::new(ArrayType {
                    len,
                    child,
                    sentinel,
                }));
                block.add_constant(Type::Type, Value::Type(ty), span)?
            }
            ZirInst::OptionalType { child } => {
                let child = self.resolve_type(frame, block, *child)?;
                block.add_constant(Type::Type, Value::Type(Type::optional(child)), span)?
            }
            ZirInst::VectorType { len, child } => {
                let len = self.resolve_int(frame, block, *len, &Type::U32)? as u32;
                let child = self.resolve_type(frame, block, *child)?;
                let valid_elem = matches!(child, Type::Int(_) | Type::Float(_) | Type::Bool)
                    || child.is_single_pointer();
                if !valid_elem {
                    return Err(self.fail(span, invalid_vector_elem_msg(&child)));
                }
                block.add_constant(Type::Type, Value::Type(Type::vector(len, child)), span)?
            }
            ZirInst::FnType { params, ret, cc } => {
                let mut param_types = Vec::with_capacity(params.len());
                for &param in params {
                    param_types.push(self.resolve_type(frame, block, param)?);
                }
                let ret = self.resolve_type(frame, block, *ret)?;
                let fn_ty = Type::function(param_types, ret, *cc);
                block.add_constant(Type::Type, Value::Type(fn_ty), span)?
            }

            ZirInst::ArrayInit { ty, elems } => self.array_init(frame, block, *ty, elems, span)?,
            ZirInst::Call { callee, args } => {
                return self.analyze_call(frame, block, *callee, args, span);
            }

            ZirInst::Ret { operand } => return self.analyze_ret(frame, block, *operand, span),
            ZirInst::CondBr {
                cond,
                then_body,
                else_body,
            } => return self.analyze_cond_br(frame, block, *cond, then_body, else_body, span),
            ZirInst::Loop { cond_body, cond, body } => {
                return if block.is_comptime {
                    self.comptime_loop(frame, block, cond_body, *cond, body, span)
                } else {
                    self.runtime_loop(frame, block, cond_body, *cond, body, span)
                };
            }
            ZirInst::Block { body, is_comptime } => {
                let flow = if *is_comptime && !block.is_comptime {
                    let mut child = block.comptime_child();
                    self.analyze_body(frame, &mut child, body)?
                } else {
                    self.analyze_body(frame, block, body)?
                };
                return Ok(match flow {
                    Flow::Next => Step::Done,
                    flow => Step::Flow(flow),
                });
            }
            ZirInst::Break => return self.loop_exit(frame, block, true, span),
            ZirInst::Continue => return self.loop_exit(frame, block, false, span),
            ZirInst::Unreachable => {
                if block.is_comptime {
                    return Err(self.fail(span, "reached unreachable code"));
                }
                block.add_no_op(NoOp::Unreachable, Type::NoReturn, span)?;
                return Ok(Step::Flow(Flow::NoReturn));
            }

            ZirInst::CompileError { msg } => return Err(self.fail(span, msg.clone())),
            ZirInst::Export { target, symbol } => {
                self.export(target, symbol, span)?;
                return Ok(Step::Done);
            }
            ZirInst::Breakpoint => {
                if block.is_comptime {
                    return Err(self.fail(span, "unable to evaluate breakpoint at compile time"));
                }
                block.add_no_op(NoOp::Breakpoint, Type::Void, span)?;
                return Ok(Step::Done);
            }
        };
        Ok(Step::Value(inst))
    }

    // =========================================
    // Memory
    // =========================================

    fn alloc(
        &mut self,
        block: &mut Block<'_>,
        ty: Type,
        init: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let init = self.coerce(block, &ty, init, span)?;
        let ptr_ty = Type::single_ptr(ty.clone(), false);
        if block.is_comptime {
            let val = self.require_comptime(block, init, span)?;
            let slot = self.comptime_slots.len() as u32;
            self.comptime_slots.push(TypedValue::new(ty, val));
            return block.add_constant(ptr_ty, Value::ComptimeAlloc(slot), span);
        }
        if !ty.is_valid_var_type() {
            return Err(self.fail(
                span,
                format!("variable of type '{}' must be const or comptime", ty),
            ));
        }
        let ptr = block.add_no_op(NoOp::Alloc, ptr_ty, span)?;
        block.add_bin_op(BinOp::Store, Type::Void, ptr, init, span)?;
        Ok(ptr)
    }

    fn single_pointee(
        &mut self,
        block: &Block<'_>,
        ptr: InstRef,
        span: Span,
    ) -> InnerResult<(Type, bool)> {
        let ptr_ty = block.arena.ty(ptr);
        match ptr_ty.pointer_info() {
            Some(info) if info.size == PtrSize::One => Ok((info.child.clone(), info.is_const)),
            _ => {
                let found = ptr_ty.clone();
                Err(self.fail(span, format!("expected single pointer, found '{}'", found)))
            }
        }
    }

    fn store(
        &mut self,
        block: &mut Block<'_>,
        ptr: InstRef,
        value: InstRef,
        span: Span,
    ) -> InnerResult<()> {
        let (elem, is_const) = self.single_pointee(block, ptr, span)?;
        if is_const {
            return Err(self.fail(span, "cannot assign to constant"));
        }
        let value = self.coerce(block, &elem, value, span)?;
        if let Some(Value::ComptimeAlloc(slot)) = block.arena.value(ptr) {
            let slot = *slot as usize;
            let val = self.require_comptime(block, value, span)?;
            if let Some(stored) = self.comptime_slots.get_mut(slot) {
                stored.val = val;
            }
            return Ok(());
        }
        self.require_runtime(block, span)?;
        block.add_bin_op(BinOp::Store, Type::Void, ptr, value, span)?;
        Ok(())
    }

    fn load(&mut self, block: &mut Block<'_>, ptr: InstRef, span: Span) -> InnerResult<InstRef> {
        let (elem, _) = self.single_pointee(block, ptr, span)?;
        match block.arena.value(ptr).cloned() {
            Some(Value::ComptimeAlloc(slot)) => {
                if let Some(stored) = self.comptime_slots.get(slot as usize) {
                    let val = stored.val.clone();
                    return block.add_constant(elem, val, span);
                }
            }
            Some(Value::DeclRef(decl)) => {
                let tv = self.decl_typed_value(decl, span)?;
                if !matches!(tv.val, Value::Variable(_)) {
                    return block.add_constant(elem, tv.val, span);
                }
            }
            _ => {}
        }
        self.require_runtime(block, span)?;
        block.add_un_op(UnOp::Load, elem, ptr, span)
    }

    fn make_ref(
        &mut self,
        block: &mut Block<'_>,
        operand: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let ty = block.arena.ty(operand).clone();
        let ptr_ty = Type::single_ptr(ty.clone(), true);
        if let Some(val) = block.arena.value(operand).cloned() {
            let slot = self.comptime_slots.len() as u32;
            self.comptime_slots.push(TypedValue::new(ty, val));
            return block.add_constant(ptr_ty, Value::ComptimeAlloc(slot), span);
        }
        self.require_runtime(block, span)?;
        block.add_un_op(UnOp::Ref, ptr_ty, operand, span)
    }

    fn array_init(
        &mut self,
        frame: &Frame<'_>,
        block: &mut Block<'_>,
        ty: ZirRef,
        elems: &[ZirRef],
        span: Span,
    ) -> InnerResult<InstRef> {
        let ty = self.resolve_type(frame, block, ty)?;
        let (len, child) = match &ty {
            Type::Array(array) => (array.len, array.child.clone()),
            _ => return Err(self.fail(span, format!("expected array type, found '{}'", ty))),
        };
        if elems.len() as u64 != len {
            return Err(self.fail(
                span,
                format!("expected {} array elements, found {}", len, elems.len()),
            ));
        }
        let mut values = Vec::with_capacity(elems.len());
        for &elem in elems {
            let elem_span = frame.zir.span(elem);
            let inst = self.resolve(frame, elem)?;
            let inst = self.coerce(block, &child, inst, elem_span)?;
            values.push(self.require_comptime(block, inst, elem_span)?);
        }
        block.add_constant(ty, Value::Array(values.into()), span)
    }

    // =========================================
    // Control flow
    // =========================================

    fn analyze_ret(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        operand: Option<ZirRef>,
        span: Span,
    ) -> InnerResult<Step> {
        let ret_ty = frame.ret_ty.clone();
        let value = match operand {
            Some(operand) => {
                let inst = self.resolve(frame, operand)?;
                Some(self.coerce(block, &ret_ty, inst, span)?)
            }
            None if ret_ty == Type::Void => None,
            None => return Err(self.fail(span, format!("expected '{}', found 'void'", ret_ty))),
        };

        match frame.kind {
            FrameKind::Comptime => {
                let value = match value {
                    Some(value) => value,
                    None => block.add_constant(Type::Void, Value::Void, span)?,
                };
                Ok(Step::Flow(Flow::Return(value)))
            }
            FrameKind::Inline { block: target } => {
                if block.is_comptime {
                    return Err(self.fail(span, "unable to return from a comptime block"));
                }
                block.add_br(target, value, span)?;
                Ok(Step::Flow(Flow::NoReturn))
            }
            FrameKind::Runtime => {
                if block.is_comptime {
                    return Err(self.fail(span, "unable to return from a comptime block"));
                }
                match value {
                    Some(value) => block.add_un_op(UnOp::Ret, Type::NoReturn, value, span)?,
                    None => block.add_no_op(NoOp::RetVoid, Type::NoReturn, span)?,
                };
                Ok(Step::Flow(Flow::NoReturn))
            }
        }
    }

    fn analyze_cond_br(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        cond: ZirRef,
        then_body: &[ZirRef],
        else_body: &[ZirRef],
        span: Span,
    ) -> InnerResult<Step> {
        let cond_span = frame.zir.span(cond);
        let cond = self.resolve(frame, cond)?;
        let cond = self.coerce(block, &Type::Bool, cond, cond_span)?;

        if let Some(val) = block.arena.value(cond).cloned() {
            let Some(taken) = val.as_bool() else {
                return Err(self.fail(cond_span, "use of undefined value"));
            };
            let body = if taken { then_body } else { else_body };
            return Ok(match self.analyze_body(frame, block, body)? {
                Flow::Next => Step::Done,
                flow => Step::Flow(flow),
            });
        }
        self.require_runtime(block, span)?;

        let (then_insts, then_flow) = {
            let mut child = block.child();
            let flow = self.analyze_body(frame, &mut child, then_body)?;
            (child.into_body(), flow)
        };
        let (else_insts, else_flow) = {
            let mut child = block.child();
            let flow = self.analyze_body(frame, &mut child, else_body)?;
            (child.into_body(), flow)
        };
        let no_return = then_flow == Flow::NoReturn && else_flow == Flow::NoReturn;
        let ty = if no_return { Type::NoReturn } else { Type::Void };
        block.add_cond_br(cond, then_insts, else_insts, ty, span)?;
        Ok(if no_return {
            Step::Flow(Flow::NoReturn)
        } else {
            Step::Done
        })
    }

    fn comptime_loop(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        cond_body: &[ZirRef],
        cond: ZirRef,
        body: &[ZirRef],
        span: Span,
    ) -> InnerResult<Step> {
        let cond_span = frame.zir.span(cond);
        loop {
            self.analyze_body(frame, block, cond_body)?;
            let inst = self.resolve(frame, cond)?;
            let inst = self.coerce(block, &Type::Bool, inst, cond_span)?;
            let Some(taken) = self.require_comptime(block, inst, cond_span)?.as_bool() else {
                return Err(self.fail(cond_span, "use of undefined value"));
            };
            if !taken {
                break;
            }

            frame.loops.push(None);
            let flow = self.analyze_body(frame, block, body);
            frame.loops.pop();
            match flow? {
                Flow::Next | Flow::Continue => {}
                Flow::Break => break,
                flow => return Ok(Step::Flow(flow)),
            }
            self.branch_tick(span)?;
        }
        Ok(Step::Done)
    }

    /// Lowers to `block { loop { cond; condbr(cond, { block { body } }, { br }) } }`.
    /// `continue` exits the inner block, `break` the outer one.
    fn runtime_loop(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        cond_body: &[ZirRef],
        cond: ZirRef,
        body: &[ZirRef],
        span: Span,
    ) -> InnerResult<Step> {
        let cond_span = frame.zir.span(cond);
        let outer = block.add_block(Type::Void, span)?;
        let outer_body = {
            let mut outer_child = block.child();
            let looped = outer_child.add_loop(span)?;
            let loop_body = {
                let mut loop_child = outer_child.child();
                self.analyze_body(frame, &mut loop_child, cond_body)?;
                let cond_inst = self.resolve(frame, cond)?;
                let cond_inst = self.coerce(&mut loop_child, &Type::Bool, cond_inst, cond_span)?;

                let then_body = {
                    let mut then_child = loop_child.child();
                    let inner = then_child.add_block(Type::Void, span)?;
                    let inner_body = {
                        let mut body_child = then_child.child();
                        frame.loops.push(Some(LoopTargets {
                            brk: outer,
                            cont: inner,
                        }));
                        let flow = self.analyze_body(frame, &mut body_child, body);
                        frame.loops.pop();
                        flow?;
                        body_child.into_body()
                    };
                    then_child.arena.set_body(inner, inner_body);
                    then_child.into_body()
                };
                let else_body = {
                    let mut else_child = loop_child.child();
                    else_child.add_br(outer, None, span)?;
                    else_child.into_body()
                };
                loop_child.add_cond_br(cond_inst, then_body, else_body, Type::NoReturn, span)?;
                loop_child.into_body()
            };
            outer_child.arena.set_body(looped, loop_body);
            outer_child.into_body()
        };
        block.arena.set_body(outer, outer_body);
        Ok(Step::Done)
    }

    fn loop_exit(
        &mut self,
        frame: &mut Frame<'_>,
        block: &mut Block<'_>,
        is_break: bool,
        span: Span,
    ) -> InnerResult<Step> {
        match frame.loops.last().copied() {
            Some(None) => Ok(Step::Flow(if is_break { Flow::Break } else { Flow::Continue })),
            Some(Some(targets)) => {
                if block.is_comptime {
                    return Err(self.fail(
                        span,
                        "unable to leave a runtime loop from a comptime block",
                    ));
                }
                let target = if is_break { targets.brk } else { targets.cont };
                block.add_br(target, None, span)?;
                Ok(Step::Flow(Flow::NoReturn))
            }
            None if is_break => Err(self.fail(span, "break outside of loop")),
            None => Err(self.fail(span, "continue outside of loop")),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::ir::InstKind;
    use crate::options::AnalysisOptions;
    use pretty_assertions::assert_eq;

    fn analyze(source: &str, options: AnalysisOptions) -> Module<NullBackend> {
        let mut module = Module::new(NullBackend, options);
        module.add_source("main.kn", source);
        module.update().unwrap();
        module
    }

    fn value_of(module: &Module<NullBackend>, name: &str) -> Value {
        let id = module.lookup_name("main.kn", name).unwrap();
        let decl = module.decl(id).unwrap();
        decl.typed_value.as_ref().unwrap().val.clone()
    }

    fn body_kinds(module: &Module<NullBackend>, name: &str) -> Vec<InstKind> {
        let id = module.lookup_name("main.kn", name).unwrap();
        let decl = module.decl(id).unwrap();
        let tv = decl.typed_value.as_ref().unwrap();
        let body = tv.arena.func.as_ref().unwrap().body.clone().unwrap();
        body.iter()
            .map(|&inst| tv.arena.ir.get(inst).kind.clone())
            .collect()
    }

    #[test]
    fn comptime_call_runs_loops() {
        let source = "\
fn sum(n: u32) u32 {
    var i: u32 = 0;
    var acc: u32 = 0;
    while (i < n) {
        acc = acc + i;
        i = i + 1;
    }
    return acc;
}
const total = sum(10);
comptime { _ = total; }
";
        let module = analyze(source, AnalysisOptions::default());
        assert!(module.all_errors().is_empty(), "{:?}", module.all_errors());
        assert_eq!(value_of(&module, "total"), Value::Int(45));
    }

    #[test]
    fn branch_quota_is_enforced() {
        let source = "\
fn spin() void { while (true) {} }
comptime { spin(); }
";
        let module = analyze(source, AnalysisOptions::default().with_eval_branch_quota(10));
        assert_eq!(
            test_support::only_error(&module),
            "evaluation exceeded 10 backwards branches"
        );
    }

    #[test]
    fn call_depth_is_bounded() {
        let source = "\
fn forever(n: u32) u32 { return forever(n); }
const x = forever(1);
comptime { _ = x; }
";
        let module = analyze(source, AnalysisOptions::default().with_max_comptime_call_depth(8));
        assert_eq!(
            test_support::only_error(&module),
            "evaluation exceeded maximum call depth of 8"
        );
    }

    #[test]
    fn runtime_body_emits_ir() {
        let module = analyze(
            "export fn add(a: u32, b: u32) u32 { return a + b; }\n",
            AnalysisOptions::default(),
        );
        let kinds = body_kinds(&module, "add");
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], InstKind::Arg { index: 0 }));
        assert!(matches!(kinds[1], InstKind::Arg { index: 1 }));
        assert!(matches!(kinds[2], InstKind::BinOp { op: BinOp::Add, .. }));
        assert!(matches!(kinds[3], InstKind::UnOp { op: UnOp::Ret, .. }));
    }

    #[test]
    fn void_function_gets_implicit_return() {
        let module = analyze("export fn noop() void {}\n", AnalysisOptions::default());
        let kinds = body_kinds(&module, "noop");
        assert_eq!(kinds, vec![InstKind::NoOp(NoOp::RetVoid)]);
    }

    #[test]
    fn inline_calls_expand_at_the_call_site() {
        let source = "\
inline fn double(x: u32) u32 { return x * 2; }
export fn quad(a: u32) u32 { return double(double(a)); }
";
        let module = analyze(source, AnalysisOptions::default());
        assert!(module.all_errors().is_empty(), "{:?}", module.all_errors());
        let kinds = body_kinds(&module, "quad");
        let blocks = kinds
            .iter()
            .filter(|k| matches!(k, InstKind::Block { .. }))
            .count();
        assert_eq!(blocks, 2);
        assert!(!kinds.iter().any(|k| matches!(k, InstKind::Call { .. })));

        let double = module.lookup_name("main.kn", "double").unwrap();
        assert!(module.decl(double).unwrap().is_inline_fn());
    }

    #[test]
    fn runtime_loop_shape() {
        let source = "\
export fn count(n: u32) u32 {
    var i: u32 = 0;
    while (i < n) {
        if (i == 3) continue;
        i = i + 1;
    }
    return i;
}
";
        let module = analyze(source, AnalysisOptions::default());
        assert!(module.all_errors().is_empty(), "{:?}", module.all_errors());
        let kinds = body_kinds(&module, "count");
        let InstKind::Block { body } = kinds
            .iter()
            .find(|k| matches!(k, InstKind::Block { .. }))
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn body_failure_keeps_decl_complete() {
        let module = analyze(
            "export fn f() void { const x: u8 = 300; _ = x; }\n",
            AnalysisOptions::default(),
        );
        assert_eq!(
            test_support::only_error(&module),
            "type 'u8' cannot represent integer value '300'"
        );
        let id = module.lookup_name("main.kn", "f").unwrap();
        let decl = module.decl(id).unwrap();
        assert_eq!(decl.analysis, AnalysisState::Complete);
        assert_eq!(decl.func().unwrap().state, FnState::SemaFailure);
        assert!(decl.func().unwrap().body.is_none());
    }

    #[test]
    fn compile_error_builtin() {
        let module = analyze("comptime { @compileError(\"nope\"); }\n", AnalysisOptions::default());
        assert_eq!(test_support::only_error(&module), "nope");
    }

    #[test]
    fn folded_branch_skips_compile_error() {
        let source = "\
const debug = false;
comptime { if (debug) @compileError(\"debug build\"); }
";
        let module = analyze(source, AnalysisOptions::default());
        assert!(module.all_errors().is_empty());
    }

    #[test]
    fn undeclared_identifier() {
        let module = analyze("comptime { _ = missing; }\n", AnalysisOptions::default());
        assert_eq!(
            test_support::only_error(&module),
            "use of undeclared identifier 'missing'"
        );
    }

    #[test]
    fn runtime_variable_in_comptime_block() {
        let source = "\
var counter: u32 = 0;
comptime { _ = counter; }
";
        let module = analyze(source, AnalysisOptions::default());
        assert_eq!(
            test_support::only_error(&module),
            "unable to evaluate constant expression"
        );
    }

    #[test]
    fn references_record_dependencies() {
        let source = "\
const a: u32 = 1;
const b: u32 = a + 1;
comptime { _ = b; }
";
        let module = analyze(source, AnalysisOptions::default());
        let a = module.lookup_name("main.kn", "a").unwrap();
        let b = module.lookup_name("main.kn", "b").unwrap();
        assert!(module.decl(b).unwrap().depends_on(a));
        assert_eq!(value_of(&module, "b"), Value::Int(2));
    }
}
