//! Declaration content analysis.
//!
//! [`Module::analyze_decl`] evaluates what a top-level item declares: a
//! function's signature, a variable's initializer or a comptime block. It
//! never looks inside function bodies. A function with a body leaves an
//! [`Fn`] in state `Queued` and a `CodegenDecl` work item, which later runs
//! [`Module::analyze_fn_body`].

use std::mem;
use std::sync::Arc;

use kiln_core::{
    BackendError, CallingConvention, DeclId, ErrorMsg, InnerError, InnerResult, Type, Value,
    Variable,
};
use tracing::{debug, trace};

use crate::astgen;
use crate::backend::Backend;
use crate::builder::Block;
use crate::decl::{AnalysisState, DeclArena, DeclValue, Fn, FnState};
use crate::ir::{ArenaSnapshot, IrArena};
use crate::module::Module;
use crate::scope::Scope;
use crate::sema::{Frame, FrameKind, Sema};
use crate::work::{WorkItem, WorkQueue};
use crate::zir::{ZirComptime, ZirDecl, ZirDeclKind, ZirFn, ZirVar};

/// What the decl looked like before this analysis.
struct Previous {
    ty: Option<Type>,
    was_inline: bool,
    had_bits: bool,
}

impl<B: Backend> Module<B> {
    /// Analyze the item behind `decl_id`. Returns whether dependants must be
    /// re-analyzed.
    pub(crate) fn analyze_decl(
        &mut self,
        queue: &mut WorkQueue,
        decl_id: DeclId,
    ) -> InnerResult<bool> {
        let Some(decl) = self.decls.get(&decl_id) else {
            return Err(InnerError::AnalysisFail);
        };
        let file = decl.file;
        let prev = Previous {
            ty: decl.typed_value.as_ref().map(|tv| tv.ty.clone()),
            was_inline: decl.is_inline_fn(),
            had_bits: decl.has_code_gen_bits(),
        };
        let Some(unit) = self.files.get(&file) else {
            return Err(InnerError::AnalysisFail);
        };
        let root = if unit.is_zir() {
            Scope::ZirModule { file }
        } else {
            Scope::File { file }
        };
        let container = Scope::Container {
            parent: &root,
            file,
            namespace: unit.namespace,
        };
        let scope = Scope::DeclAnalysis {
            parent: &container,
            decl: decl_id,
        };

        let zir_decl = self.decl_zir(&scope, decl_id)?;
        match &zir_decl.kind {
            ZirDeclKind::Fn(zir_fn) => {
                self.analyze_fn_decl(queue, &scope, decl_id, &zir_decl, zir_fn, prev)
            }
            ZirDeclKind::Var(var) => {
                self.analyze_var_decl(queue, &scope, decl_id, &zir_decl, var, prev)
            }
            ZirDeclKind::Comptime(block) => {
                self.analyze_comptime_decl(queue, &scope, decl_id, block)
            }
        }
    }

    /// The decl's ZIR: taken as-is from a ZIR module, lowered from source otherwise.
    fn decl_zir(&mut self, scope: &Scope<'_>, decl_id: DeclId) -> InnerResult<ZirDecl> {
        let Some(decl) = self.decls.get(&decl_id) else {
            return Err(InnerError::AnalysisFail);
        };
        let (file, index, src, name) = (decl.file, decl.src_index, decl.src, decl.name.clone());

        if let Some(decls) = self.unit_zir(file) {
            return match decls.get(index) {
                Some(zir) => Ok(zir.clone()),
                None => Err(self.fail(scope, src, "declaration has no source")),
            };
        }
        let Some((ast, _)) = self.unit_ast(file) else {
            return Err(self.fail(scope, src, "declaration has no source"));
        };
        let Some(item) = ast.items.get(index) else {
            return Err(self.fail(scope, src, "declaration has no source"));
        };
        let lowered = astgen::lower_item(item, &name, scope);
        lowered.map_err(|err| self.fail(scope, err.span(), err.to_string()))
    }

    /// Run `f` against a compile-time block over a throwaway arena.
    fn with_comptime_sema<R>(
        &mut self,
        queue: &mut WorkQueue,
        scope: &Scope<'_>,
        decl_id: DeclId,
        f: impl FnOnce(&mut Sema<'_, B>, &mut Block<'_>) -> InnerResult<R>,
    ) -> InnerResult<R> {
        let block_scope = Scope::Block {
            parent: scope,
            decl: decl_id,
            func: None,
            is_comptime: true,
        };
        let mut arena = IrArena::new(self.options.arena_instruction_limit);
        let mut block = Block::new(&mut arena, true);
        let mut sema = Sema::new(self, queue, &block_scope, decl_id);
        f(&mut sema, &mut block)
    }

    // =========================================
    // Functions
    // =========================================

    fn analyze_fn_decl(
        &mut self,
        queue: &mut WorkQueue,
        scope: &Scope<'_>,
        decl_id: DeclId,
        zir_decl: &ZirDecl,
        zir_fn: &Arc<ZirFn>,
        prev: Previous,
    ) -> InnerResult<bool> {
        let src = zir_decl.src;
        let ty = self.with_comptime_sema(queue, scope, decl_id, |sema, block| {
            let mut frame = Frame::new(&zir_fn.zir, Type::Void, FrameKind::Comptime);
            let inst = sema.analyze_expr(&mut frame, block, &zir_fn.sig)?;
            sema.inst_as_type(block, inst, src)
        })?;
        let Some(fn_ty) = ty.fn_info() else {
            return Err(self.fail(scope, src, format!("expected function type, found '{}'", ty)));
        };
        let is_inline = zir_fn.is_inline || fn_ty.cc == CallingConvention::Inline;
        let type_changed = prev.ty.as_ref() != Some(&ty);
        let has_body = zir_fn.body.is_some();
        let needs_codegen = has_body && !is_inline && ty.has_code_gen_bits();

        let value = if has_body {
            let func = Fn {
                owner: decl_id,
                zir: zir_fn.clone(),
                body: None,
                params: zir_fn.params.clone(),
                state: if is_inline { FnState::InlineOnly } else { FnState::Queued },
                snapshot: ArenaSnapshot::default(),
            };
            DeclValue {
                ty,
                val: Value::Function(decl_id),
                arena: DeclArena {
                    ir: IrArena::new(self.options.arena_instruction_limit),
                    func: Some(func),
                },
            }
        } else {
            DeclValue {
                ty,
                val: Value::ExternFn(decl_id),
                arena: DeclArena::default(),
            }
        };
        self.install_value(decl_id, value);

        if needs_codegen {
            self.allocate_and_queue(queue, decl_id, type_changed)?;
        } else if !prev.was_inline && prev.had_bits {
            self.free_decl_storage(decl_id);
        }
        self.export_if_complete(queue, scope, decl_id, zir_decl)?;
        Ok(type_changed || is_inline)
    }

    // =========================================
    // Variables
    // =========================================

    fn analyze_var_decl(
        &mut self,
        queue: &mut WorkQueue,
        scope: &Scope<'_>,
        decl_id: DeclId,
        zir_decl: &ZirDecl,
        var: &ZirVar,
        prev: Previous,
    ) -> InnerResult<bool> {
        let src = zir_decl.src;
        if var.is_extern && var.init.is_some() {
            return Err(self.fail(scope, src, "extern variables have no initializers"));
        }
        if var.is_threadlocal && !var.is_mutable {
            return Err(self.fail(scope, var.mut_span, "threadlocal variable cannot be constant"));
        }

        let (ty, init) = self.with_comptime_sema(queue, scope, decl_id, |sema, block| {
            let mut frame = Frame::new(&var.zir, Type::Void, FrameKind::Comptime);
            let explicit = match &var.ty {
                Some(expr) => {
                    let inst = sema.analyze_expr(&mut frame, block, expr)?;
                    Some(sema.inst_as_type(block, inst, src)?)
                }
                None => None,
            };
            let Some(init) = &var.init else {
                return match explicit {
                    Some(ty) if var.is_extern => Ok((ty, None)),
                    _ if !var.is_extern => Err(sema.fail(src, "variables must be initialized")),
                    _ => Err(sema.fail(src, "unable to infer variable type")),
                };
            };
            let mut inst = sema.analyze_expr(&mut frame, block, init)?;
            if let Some(ty) = &explicit {
                inst = sema.coerce(block, ty, inst, src)?;
            }
            let val = sema.require_comptime(block, inst, src)?;
            Ok((block.arena.ty(inst).clone(), Some(val)))
        })?;

        if var.is_mutable && !var.is_extern && !ty.is_valid_var_type() {
            return Err(self.fail(
                scope,
                src,
                format!("variable of type '{}' must be const or comptime", ty),
            ));
        }
        let type_changed = prev.ty.as_ref() != Some(&ty);
        let val = if var.is_mutable || var.is_extern {
            Value::Variable(Arc::new(Variable {
                owner: decl_id,
                init,
                is_mutable: var.is_mutable,
                is_extern: var.is_extern,
                is_threadlocal: var.is_threadlocal,
            }))
        } else {
            init.unwrap_or(Value::Undefined)
        };
        // A const naming a function is an alias, not new storage.
        let needs_codegen = !var.is_extern
            && !matches!(val, Value::Function(_) | Value::ExternFn(_))
            && ty.has_code_gen_bits();
        self.install_value(
            decl_id,
            DeclValue {
                ty,
                val,
                arena: DeclArena::default(),
            },
        );

        if needs_codegen {
            self.allocate_and_queue(queue, decl_id, type_changed)?;
        } else if prev.had_bits {
            self.free_decl_storage(decl_id);
        }
        self.export_if_complete(queue, scope, decl_id, zir_decl)?;
        Ok(type_changed)
    }

    // =========================================
    // Comptime blocks
    // =========================================

    fn analyze_comptime_decl(
        &mut self,
        queue: &mut WorkQueue,
        scope: &Scope<'_>,
        decl_id: DeclId,
        block: &ZirComptime,
    ) -> InnerResult<bool> {
        self.with_comptime_sema(queue, scope, decl_id, |sema, comptime_block| {
            let mut frame = Frame::new(&block.zir, Type::Void, FrameKind::Comptime);
            sema.analyze_body(&mut frame, comptime_block, &block.body)
                .map(drop)
        })?;
        Ok(true)
    }

    // =========================================
    // Shared steps
    // =========================================

    fn install_value(&mut self, decl_id: DeclId, value: DeclValue) {
        if let Some(decl) = self.decls.get_mut(&decl_id) {
            trace!(decl = %decl.name, ty = %value.ty, "installed value");
            decl.typed_value = Some(value);
            decl.analysis = AnalysisState::Complete;
        }
    }

    /// Reserve backend storage and queue code generation.
    fn allocate_and_queue(
        &mut self,
        queue: &mut WorkQueue,
        decl_id: DeclId,
        type_changed: bool,
    ) -> InnerResult<()> {
        let Some(decl) = self.decls.get_mut(&decl_id) else {
            return Ok(());
        };
        let (analysis, err) = match self.backend.allocate_decl_indexes(decl) {
            Ok(()) => {
                queue.push(WorkItem::CodegenDecl(decl_id));
                if type_changed && self.options.emit_h {
                    queue.push(WorkItem::EmitHDecl(decl_id));
                }
                return Ok(());
            }
            Err(BackendError::OutOfMemory) => return Err(InnerError::OutOfMemory),
            Err(err @ BackendError::Retryable(_)) => (AnalysisState::CodegenFailureRetryable, err),
            Err(err @ BackendError::Permanent(_)) => (AnalysisState::CodegenFailure, err),
        };
        debug!(decl = %decl.name, %err, "unable to allocate decl indexes");
        decl.analysis = analysis;
        let msg = ErrorMsg::new(decl.file, decl.src, format!("unable to codegen: {}", err));
        self.failed_decls.insert(decl_id, msg);
        Ok(())
    }

    fn free_decl_storage(&mut self, decl_id: DeclId) {
        if let Some(decl) = self.decls.get(&decl_id) {
            self.backend.free_decl(decl);
        }
    }

    fn export_if_complete(
        &mut self,
        queue: &mut WorkQueue,
        scope: &Scope<'_>,
        decl_id: DeclId,
        zir_decl: &ZirDecl,
    ) -> InnerResult<()> {
        let complete = self
            .decls
            .get(&decl_id)
            .is_some_and(|d| d.analysis == AnalysisState::Complete);
        if zir_decl.is_export && complete {
            self.analyze_export(queue, scope, zir_decl.src, &zir_decl.name, decl_id)?;
        }
        Ok(())
    }

    // =========================================
    // Function bodies
    // =========================================

    /// Analyze a queued function body into the decl's arena.
    ///
    /// On failure the arena is truncated back to its snapshot and the body
    /// stays unset; the decl itself remains `Complete`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn analyze_fn_body(
        &mut self,
        queue: &mut WorkQueue,
        decl_id: DeclId,
    ) -> InnerResult<()> {
        let Some(decl) = self.decls.get_mut(&decl_id) else {
            return Ok(());
        };
        let (file, src) = (decl.file, decl.src);
        let Some(unit) = self.files.get(&file) else {
            return Ok(());
        };
        let (is_zir, namespace) = (unit.is_zir(), unit.namespace);
        let Some(tv) = decl.typed_value.as_mut() else {
            return Ok(());
        };
        let Some(fn_ty) = tv.ty.fn_info().cloned() else {
            return Ok(());
        };
        let Some(func) = tv.arena.func.as_mut() else {
            return Ok(());
        };
        let zir_fn = func.zir.clone();
        let Some(body) = zir_fn.body.as_ref() else {
            return Ok(());
        };
        func.state = FnState::InProgress;
        let mut ir = mem::take(&mut tv.arena.ir);
        let snapshot = ir.snapshot();
        func.snapshot = snapshot;
        trace!(decl = %decl_id, "analyzing function body");

        let root = if is_zir {
            Scope::ZirModule { file }
        } else {
            Scope::File { file }
        };
        let container = Scope::Container {
            parent: &root,
            file,
            namespace,
        };
        let decl_scope = Scope::DeclAnalysis {
            parent: &container,
            decl: decl_id,
        };
        let block_scope = Scope::Block {
            parent: &decl_scope,
            decl: decl_id,
            func: Some(decl_id),
            is_comptime: false,
        };

        let result = {
            let mut block = Block::new(&mut ir, false);
            let mut frame = Frame::new(&zir_fn.zir, fn_ty.ret.clone(), FrameKind::Runtime);
            let mut sema = Sema::new(self, queue, &block_scope, decl_id);
            sema.analyze_fn_body(&mut frame, &mut block, &fn_ty.params, body, src)
                .map(|()| block.into_body())
        };

        let decl = self.decls.get_mut(&decl_id);
        let Some(tv) = decl.and_then(|d| d.typed_value.as_mut()) else {
            return result.map(drop);
        };
        let func = tv.arena.func.as_mut();
        let Some(func) = func.filter(|f| Arc::ptr_eq(&f.zir, &zir_fn)) else {
            // Re-analyzed while the body was in flight; the new value owns its own arena.
            return result.map(drop);
        };
        match result {
            Ok(body) => {
                func.body = Some(body);
                func.state = FnState::Success;
                tv.arena.ir = ir;
                Ok(())
            }
            Err(err) => {
                ir.restore(snapshot);
                match err {
                    InnerError::OutOfMemory => func.state = FnState::Queued,
                    InnerError::AnalysisFail if func.state == FnState::InProgress => {
                        func.state = FnState::DependencyFailure;
                    }
                    InnerError::AnalysisFail => {}
                }
                tv.arena.ir = ir;
                Err(err)
            }
        }
    }
}
