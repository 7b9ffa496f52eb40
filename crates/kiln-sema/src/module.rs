//! The module: owner of every decl, export and source unit.
//!
//! A [`Module`] is driven by [`Module::update`]. Each update bumps the
//! generation, reconciles changed source units against their registered
//! decls, performs the resulting work and finally garbage collects decls
//! that nothing references anymore.
//!
//! # Example
//!
//! ```
//! use kiln_sema::{AnalysisOptions, Module, NullBackend};
//!
//! let mut module = Module::new(NullBackend, AnalysisOptions::default());
//! let file = module.add_source("main.kn", "export fn main() void {}\n");
//! let report = module.update().unwrap();
//! assert_eq!(report.analyzed.len(), 1);
//! assert!(module.lookup(file, "main").is_some());
//! ```

use kiln_core::{
    BackendError, DeclId, ErrorMsg, ExportId, FileId, InnerError, InnerResult, NameHash, Span,
    Value,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::backend::Backend;
use crate::container::{FileFailure, SourceUnit};
use crate::decl::{AnalysisState, Decl, FnState};
use crate::export::{Export, ExportStatus};
use crate::options::AnalysisOptions;
use crate::scope::{self, Scope};
use crate::work::{WorkItem, WorkQueue};

/// What one [`Module::update`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub generation: u32,
    /// Decls moved to `Outdated`, in order.
    pub outdated: Vec<DeclId>,
    /// Decls whose analysis completed.
    pub analyzed: Vec<DeclId>,
    pub deleted: Vec<DeclId>,
}

pub struct Module<B: Backend> {
    pub(crate) options: AnalysisOptions,
    pub(crate) backend: B,

    pub(crate) decls: FxHashMap<DeclId, Decl>,
    pub(crate) next_decl: u32,
    /// Fully qualified name hash to decl.
    pub(crate) decl_table: FxHashMap<NameHash, DeclId>,

    pub(crate) files: FxHashMap<FileId, SourceUnit>,
    pub(crate) next_file: u32,

    pub(crate) failed_decls: FxHashMap<DeclId, ErrorMsg>,
    pub(crate) failed_files: FxHashMap<FileId, FileFailure>,
    pub(crate) failed_exports: FxHashMap<ExportId, ErrorMsg>,

    pub(crate) exports: FxHashMap<ExportId, Export>,
    pub(crate) next_export: u32,
    /// Exports created by a decl's analysis.
    pub(crate) export_owners: FxHashMap<DeclId, Vec<ExportId>>,
    /// Exports that emit a decl.
    pub(crate) decl_exports: FxHashMap<DeclId, Vec<ExportId>>,
    pub(crate) symbol_exports: FxHashMap<String, ExportId>,

    /// Orphan candidates, examined at the end of each update.
    pub(crate) deletion_set: Vec<DeclId>,
    pub(crate) generation: u32,
    pub(crate) report: UpdateReport,
}

impl<B: Backend> Module<B> {
    pub fn new(backend: B, options: AnalysisOptions) -> Self {
        Self {
            options,
            backend,
            decls: FxHashMap::default(),
            next_decl: 0,
            decl_table: FxHashMap::default(),
            files: FxHashMap::default(),
            next_file: 0,
            failed_decls: FxHashMap::default(),
            failed_files: FxHashMap::default(),
            failed_exports: FxHashMap::default(),
            exports: FxHashMap::default(),
            next_export: 0,
            export_owners: FxHashMap::default(),
            decl_exports: FxHashMap::default(),
            symbol_exports: FxHashMap::default(),
            deletion_set: Vec::new(),
            generation: 0,
            report: UpdateReport::default(),
        }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // =========================================
    // Update cycle
    // =========================================

    /// Run one full update cycle.
    #[tracing::instrument(level = "debug", skip_all, fields(generation = self.generation + 1))]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn update(&mut self) -> InnerResult<UpdateReport> {
        self.generation += 1;
        self.report = UpdateReport {
            generation: self.generation,
            ..UpdateReport::default()
        };

        let mut queue = WorkQueue::new();
        self.retry_failures(&mut queue);

        let mut files: Vec<FileId> = self
            .files
            .iter()
            .filter(|(id, unit)| {
                unit.dirty
                    || unit.removed
                    || self.failed_files.get(id).is_some_and(|f| f.retryable)
            })
            .map(|(&id, _)| id)
            .collect();
        files.sort();
        for file in files {
            let mut file_queue = self.analyze_file(file);
            queue.append(&mut file_queue);
        }

        loop {
            self.perform_work(&mut queue)?;
            self.drain_deletion_set(&mut queue);
            if queue.is_empty() {
                break;
            }
        }

        self.files.retain(|_, unit| !unit.removed);
        debug!(
            outdated = self.report.outdated.len(),
            analyzed = self.report.analyzed.len(),
            deleted = self.report.deleted.len(),
            "update complete"
        );
        Ok(std::mem::take(&mut self.report))
    }

    /// Requeue decls and exports whose last failure may go away on its own.
    fn retry_failures(&mut self, queue: &mut WorkQueue) {
        let mut retry: Vec<DeclId> = self
            .decls
            .values()
            .filter(|d| {
                matches!(
                    d.analysis,
                    AnalysisState::SemaFailureRetryable | AnalysisState::CodegenFailureRetryable
                )
            })
            .map(|d| d.id)
            .collect();
        retry.extend(
            self.exports
                .values()
                .filter(|e| e.status == ExportStatus::FailedRetryable)
                .map(|e| e.owner),
        );
        retry.sort();
        retry.dedup();
        for decl in retry {
            trace!(%decl, "retrying");
            self.mark_outdated(decl, queue);
        }
    }

    /// Drain `queue`, analyzing and generating code for each item.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn perform_work(&mut self, queue: &mut WorkQueue) -> InnerResult<()> {
        while let Some(item) = queue.pop() {
            match item {
                WorkItem::AnalyzeDecl(decl) => {
                    if !self.decls.contains_key(&decl) {
                        continue;
                    }
                    match self.ensure_decl_analyzed(queue, decl) {
                        Ok(()) | Err(InnerError::AnalysisFail) => {}
                        Err(InnerError::OutOfMemory) => return Err(InnerError::OutOfMemory),
                    }
                }
                WorkItem::CodegenDecl(decl) => self.codegen_decl(queue, decl)?,
                WorkItem::EmitHDecl(decl) => {
                    let Some(d) = self.decls.get(&decl) else {
                        continue;
                    };
                    if d.analysis != AnalysisState::Complete {
                        continue;
                    }
                    if let Err(err) = self.backend.emit_h_decl(d) {
                        self.record_backend_failure(decl, err, "unable to emit header")?;
                    }
                }
                WorkItem::UpdateLineNumber(decl) => {
                    let Some(d) = self.decls.get(&decl) else {
                        continue;
                    };
                    if d.analysis != AnalysisState::Complete {
                        continue;
                    }
                    if let Err(err) = self.backend.update_decl_line_number(d) {
                        let err = match err {
                            BackendError::Permanent(msg) => BackendError::Retryable(msg),
                            other => other,
                        };
                        self.record_backend_failure(decl, err, "unable to update line number")?;
                    }
                }
            }
        }
        Ok(())
    }

    fn codegen_decl(&mut self, queue: &mut WorkQueue, decl_id: DeclId) -> InnerResult<()> {
        let Some(decl) = self.decls.get(&decl_id) else {
            return Ok(());
        };
        if !matches!(
            decl.analysis,
            AnalysisState::Complete | AnalysisState::CodegenFailureRetryable
        ) {
            return Ok(());
        }
        if let Some(state) = decl.func().map(|f| f.state) {
            match state {
                FnState::Queued => match self.analyze_fn_body(queue, decl_id) {
                    Ok(()) => {}
                    Err(InnerError::AnalysisFail) => return Ok(()),
                    Err(InnerError::OutOfMemory) => return Err(InnerError::OutOfMemory),
                },
                FnState::SemaFailure | FnState::DependencyFailure | FnState::InlineOnly => {
                    return Ok(());
                }
                FnState::InProgress | FnState::Success => {}
            }
        }
        let Some(decl) = self.decls.get(&decl_id) else {
            return Ok(());
        };
        if let Err(err) = self.backend.update_decl(decl) {
            self.record_backend_failure(decl_id, err, "unable to codegen")?;
        }
        Ok(())
    }

    /// Turn a backend error into a decl failure. Out of memory propagates.
    fn record_backend_failure(
        &mut self,
        decl_id: DeclId,
        err: BackendError,
        what: &str,
    ) -> InnerResult<()> {
        let state = match &err {
            BackendError::OutOfMemory => return Err(InnerError::OutOfMemory),
            BackendError::Retryable(_) => AnalysisState::CodegenFailureRetryable,
            BackendError::Permanent(_) => AnalysisState::CodegenFailure,
        };
        let Some(decl) = self.decls.get_mut(&decl_id) else {
            return Ok(());
        };
        decl.analysis = state;
        let msg = ErrorMsg::new(decl.file, decl.src, format!("{}: {}", what, err));
        debug!(decl = %decl.name, %msg.msg, "backend failure");
        self.failed_decls.insert(decl_id, msg);
        Ok(())
    }

    // =========================================
    // Demand-driven analysis
    // =========================================

    /// Analyze `decl_id` unless it is already complete or failed.
    #[tracing::instrument(level = "debug", skip_all, fields(decl = %decl_id))]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn ensure_decl_analyzed(
        &mut self,
        queue: &mut WorkQueue,
        decl_id: DeclId,
    ) -> InnerResult<()> {
        let Some(decl) = self.decls.get(&decl_id) else {
            return Err(InnerError::AnalysisFail);
        };
        let prev_state = decl.analysis;
        let was_outdated = match prev_state {
            AnalysisState::Complete => return Ok(()),
            // A reference back into a decl under analysis; the referencing
            // side reports the loop.
            AnalysisState::InProgress => return Err(InnerError::AnalysisFail),
            state if state.is_failure() => return Err(InnerError::AnalysisFail),
            AnalysisState::Outdated => true,
            _ => false,
        };

        if was_outdated {
            trace!(decl = %decl.name, "re-analyzing");
            self.delete_decl_exports(decl_id);
            for dep in self.clear_dependencies(decl_id) {
                self.maybe_queue_orphan(dep);
            }
        }

        if let Some(decl) = self.decls.get_mut(&decl_id) {
            decl.analysis = AnalysisState::InProgress;
            decl.generation = self.generation;
        }

        let type_changed = match self.analyze_decl(queue, decl_id) {
            Ok(type_changed) => type_changed,
            Err(InnerError::AnalysisFail) => {
                if let Some(decl) = self.decls.get_mut(&decl_id)
                    && decl.analysis == AnalysisState::InProgress
                {
                    decl.analysis = AnalysisState::DependencyFailure;
                }
                return Err(InnerError::AnalysisFail);
            }
            Err(InnerError::OutOfMemory) => {
                if let Some(decl) = self.decls.get_mut(&decl_id) {
                    decl.analysis = prev_state;
                }
                return Err(InnerError::OutOfMemory);
            }
        };

        let Some(decl) = self.decls.get_mut(&decl_id) else {
            return Ok(());
        };
        if decl.analysis == AnalysisState::InProgress {
            decl.analysis = AnalysisState::Complete;
        }
        self.report.analyzed.push(decl_id);

        if was_outdated {
            let is_fn = decl
                .typed_value
                .as_ref()
                .is_some_and(|tv| matches!(tv.val, Value::Function(_) | Value::ExternFn(_)));
            if type_changed || !is_fn {
                let mut dependants: Vec<DeclId> = decl.dependants().collect();
                dependants.sort();
                for dep in dependants {
                    let Some(d) = self.decls.get(&dep) else {
                        continue;
                    };
                    if d.analysis.is_unsettled() || d.generation == self.generation {
                        continue;
                    }
                    self.mark_outdated(dep, queue);
                }
            }
        }
        Ok(())
    }

    /// Schedule `decl_id` for re-analysis. At most once per state change.
    pub fn mark_outdated(&mut self, decl_id: DeclId, queue: &mut WorkQueue) {
        let Some(decl) = self.decls.get_mut(&decl_id) else {
            return;
        };
        if decl.analysis == AnalysisState::Outdated {
            return;
        }
        debug!(decl = %decl.name, "mark outdated");
        decl.analysis = AnalysisState::Outdated;
        queue.push(WorkItem::AnalyzeDecl(decl_id));
        self.failed_decls.remove(&decl_id);
        self.report.outdated.push(decl_id);
    }

    // =========================================
    // Deletion
    // =========================================

    /// Remove a decl and every reference the module holds to it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn delete_decl(&mut self, decl_id: DeclId, queue: &mut WorkQueue) {
        let Some(decl) = self.decls.get(&decl_id) else {
            return;
        };
        debug!(decl = %decl.name, "deleting decl");
        let (file, name_hash) = (decl.file, decl.name_hash);
        if let Some(unit) = self.files.get_mut(&file) {
            unit.decls.remove(&decl_id);
        }
        if self.decl_table.get(&name_hash) == Some(&decl_id) {
            self.decl_table.remove(&name_hash);
        }

        for dep in self.clear_dependencies(decl_id) {
            self.maybe_queue_orphan(dep);
        }
        let mut dependants: Vec<DeclId> = self
            .decls
            .get(&decl_id)
            .map(|d| d.dependants().collect())
            .unwrap_or_default();
        dependants.sort();
        for dep in dependants {
            self.remove_dependency(dep, decl_id);
            self.mark_outdated(dep, queue);
        }

        self.failed_decls.remove(&decl_id);
        self.delete_decl_exports(decl_id);
        self.delete_exports_of(decl_id);

        if let Some(decl) = self.decls.remove(&decl_id) {
            self.backend.free_decl(&decl);
        }
        self.report.deleted.push(decl_id);
    }

    /// Delete queued orphans that are still unreferenced.
    pub fn drain_deletion_set(&mut self, queue: &mut WorkQueue) {
        while let Some(decl_id) = self.deletion_set.pop() {
            let Some(decl) = self.decls.get_mut(&decl_id) else {
                continue;
            };
            decl.deletion_flag = false;
            if decl.has_dependants() || decl.is_root {
                continue;
            }
            self.delete_decl(decl_id, queue);
        }
    }

    // =========================================
    // Diagnostics
    // =========================================

    /// Record a diagnostic against whatever `scope` belongs to.
    ///
    /// The owning decl, or the function body under analysis, moves to
    /// `SemaFailure`. The first message recorded for an owner is kept.
    pub fn fail(&mut self, scope: &Scope<'_>, span: Span, msg: impl Into<String>) -> InnerError {
        let file = scope::file(scope);
        let err = ErrorMsg::new(file, span, msg);
        debug!(%file, %span, msg = %err.msg, "analysis failed");
        match scope::owner_decl(scope) {
            Some(owner) => {
                match scope::func(scope) {
                    Some(func) => {
                        if let Some(f) = self.decls.get_mut(&func).and_then(Decl::func_mut) {
                            f.state = FnState::SemaFailure;
                        }
                    }
                    None => {
                        if let Some(decl) = self.decls.get_mut(&owner) {
                            decl.analysis = AnalysisState::SemaFailure;
                            decl.generation = self.generation;
                        }
                    }
                }
                self.failed_decls.entry(owner).or_insert(err);
            }
            None => {
                self.failed_files.entry(file).or_insert(FileFailure {
                    msg: err,
                    retryable: false,
                });
            }
        }
        InnerError::AnalysisFail
    }

    // =========================================
    // Queries
    // =========================================

    pub fn decl(&self, id: DeclId) -> Option<&Decl> {
        self.decls.get(&id)
    }

    pub fn decls(&self) -> impl Iterator<Item = &Decl> {
        self.decls.values()
    }

    /// Registered decl named `name` in `file`. Never registers lazily.
    pub fn lookup(&self, file: FileId, name: &str) -> Option<DeclId> {
        let unit = self.files.get(&file)?;
        self.decl_table
            .get(&NameHash::child(unit.namespace, name))
            .copied()
    }

    /// Like [`Module::lookup`], addressing the unit by path.
    pub fn lookup_name(&self, path: &str, name: &str) -> Option<DeclId> {
        let (&file, _) = self.files.iter().find(|(_, unit)| unit.path == path)?;
        self.lookup(file, name)
    }

    pub fn failed_decls(&self) -> impl Iterator<Item = (&DeclId, &ErrorMsg)> {
        self.failed_decls.iter()
    }

    pub fn failed_files(&self) -> impl Iterator<Item = (&FileId, &FileFailure)> {
        self.failed_files.iter()
    }

    pub fn failed_exports(&self) -> impl Iterator<Item = (&ExportId, &ErrorMsg)> {
        self.failed_exports.iter()
    }

    pub fn exports(&self) -> impl Iterator<Item = &Export> {
        self.exports.values()
    }

    pub fn symbol_export(&self, symbol: &str) -> Option<&Export> {
        self.symbol_exports
            .get(symbol)
            .and_then(|id| self.exports.get(id))
    }

    /// Exports that emit `decl`.
    pub fn exports_of(&self, decl: DeclId) -> impl Iterator<Item = &Export> {
        self.decl_exports
            .get(&decl)
            .into_iter()
            .flatten()
            .filter_map(|id| self.exports.get(id))
    }

    pub fn deletion_set(&self) -> &[DeclId] {
        &self.deletion_set
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Every recorded diagnostic, ordered by file and position.
    pub fn all_errors(&self) -> Vec<ErrorMsg> {
        let mut errors: Vec<ErrorMsg> = self
            .failed_files
            .values()
            .map(|f| f.msg.clone())
            .chain(self.failed_decls.values().cloned())
            .chain(self.failed_exports.values().cloned())
            .collect();
        errors.sort_by(|a, b| {
            let key = |e: &ErrorMsg| (e.file, e.span.start, e.span.end);
            key(a).cmp(&key(b)).then_with(|| a.msg.cmp(&b.msg))
        });
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use pretty_assertions::assert_eq;

    fn module() -> Module<NullBackend> {
        Module::new(NullBackend, AnalysisOptions::default())
    }

    fn assert_send<T: Send>() {}

    #[test]
    fn module_is_send() {
        assert_send::<Module<NullBackend>>();
        assert_send::<Module<crate::backend::RecordingBackend>>();
    }

    #[test]
    fn generation_bumps_every_update() {
        let mut module = module();
        module.add_source("main.kn", "const a = 1;\n");
        assert_eq!(module.update().unwrap().generation, 1);
        assert_eq!(module.update().unwrap().generation, 2);
        assert_eq!(module.generation(), 2);
    }

    #[test]
    fn unreferenced_decls_stay_lazy() {
        let mut module = module();
        let file = module.add_source("main.kn", "const a = 1;\nfn f() void {}\n");
        let report = module.update().unwrap();
        assert!(report.analyzed.is_empty());
        let a = module.lookup(file, "a").unwrap();
        assert_eq!(module.decl(a).unwrap().analysis, AnalysisState::Unreferenced);
    }

    #[test]
    fn dependency_loop_is_reported_on_the_referencing_decl() {
        let mut module = module();
        let file = module.add_source(
            "main.kn",
            "const a: u32 = b;\nconst b: u32 = a;\ncomptime { _ = a; }\n",
        );
        module.update().unwrap();
        let a = module.lookup(file, "a").unwrap();
        let b = module.lookup(file, "b").unwrap();
        assert_eq!(module.decl(b).unwrap().analysis, AnalysisState::SemaFailure);
        assert_eq!(module.decl(a).unwrap().analysis, AnalysisState::DependencyFailure);
        let errors = module.all_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].msg, "dependency loop detected");
    }

    #[test]
    fn mark_outdated_is_single_shot() {
        let mut module = module();
        let file = module.add_source("main.kn", "const a = 1;\n");
        module.update().unwrap();
        let a = module.lookup(file, "a").unwrap();
        let mut queue = WorkQueue::new();
        module.mark_outdated(a, &mut queue);
        module.mark_outdated(a, &mut queue);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn extern_fn_edit_with_same_type_keeps_dependants() {
        let mut module = module();
        let source = |param: &str| {
            format!(
                "\
extern fn ext({param}: u32) void;
const alias = ext;
comptime {{ _ = alias; }}
"
            )
        };
        let file = module.add_source("main.kn", source("x"));
        module.update().unwrap();
        let ext = module.lookup(file, "ext").unwrap();
        let alias = module.lookup(file, "alias").unwrap();
        assert!(module.decl(alias).unwrap().dependencies().any(|d| d == ext));

        module.set_source(file, source("y"));
        let report = module.update().unwrap();
        assert!(report.outdated.contains(&ext));
        assert!(!report.outdated.contains(&alias));
        assert_eq!(module.decl(alias).unwrap().analysis, AnalysisState::Complete);
    }

    #[test]
    fn fail_without_owner_records_file_failure() {
        let mut module = module();
        let file = module.add_source("main.kn", "");
        let root = Scope::ZirModule { file };
        let err = module.fail(&root, Span::new(0, 1), "broken");
        assert_eq!(err, InnerError::AnalysisFail);
        let (&failed, failure) = module.failed_files().next().unwrap();
        assert_eq!(failed, file);
        assert!(!failure.retryable);
    }
}
