//! Declarations and the dependency graph.
//!
//! Edges between decls are stored on both ends. The sets are private to this
//! crate and only change through [`Module::declare_dependency`],
//! [`Module::remove_dependency`] and [`Module::clear_dependencies`], which
//! keep the two sides in step.

use std::sync::Arc;

use kiln_core::{ContentHash, DeclId, FileId, NameHash, Span, Type, Value};
use rustc_hash::FxHashSet;

use crate::backend::{Backend, LinkHandle};
use crate::ir::{ArenaSnapshot, Body, IrArena};
use crate::module::Module;
use crate::zir::ZirFn;

/// Analysis progress of a [`Decl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisState {
    /// Registered but never asked for.
    Unreferenced,
    InProgress,
    /// A prior result may be stale and must be recomputed.
    Outdated,
    Complete,
    /// The source has a defect. Permanent until the source changes.
    SemaFailure,
    /// An infrastructure error interrupted analysis.
    SemaFailureRetryable,
    CodegenFailure,
    CodegenFailureRetryable,
    /// A dependency failed; no diagnostic of its own.
    DependencyFailure,
}

impl AnalysisState {
    /// Awaiting analysis in the current update, or never referenced.
    pub fn is_unsettled(self) -> bool {
        matches!(
            self,
            AnalysisState::Outdated | AnalysisState::InProgress | AnalysisState::Unreferenced
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            AnalysisState::SemaFailure
                | AnalysisState::SemaFailureRetryable
                | AnalysisState::CodegenFailure
                | AnalysisState::CodegenFailureRetryable
                | AnalysisState::DependencyFailure
        )
    }
}

/// Body analysis progress of a [`Fn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnState {
    /// Waiting for a codegen work item.
    Queued,
    /// Only ever expanded at call sites.
    InlineOnly,
    InProgress,
    SemaFailure,
    DependencyFailure,
    Success,
}

/// A function with a body.
#[derive(Debug, Clone)]
pub struct Fn {
    pub owner: DeclId,
    /// Kept for compile-time and inline calls.
    pub zir: Arc<ZirFn>,
    /// Resolved body, once analyzed.
    pub body: Option<Body>,
    pub params: Vec<String>,
    pub state: FnState,
    /// Arena length before the body was analyzed.
    pub(crate) snapshot: ArenaSnapshot,
}

/// Long-lived storage owned by a decl's current value.
#[derive(Debug, Clone, Default)]
pub struct DeclArena {
    pub ir: IrArena,
    pub func: Option<Fn>,
}

/// The most recent successful analysis result.
#[derive(Debug, Clone)]
pub struct DeclValue {
    pub ty: Type,
    pub val: Value,
    pub arena: DeclArena,
}

/// A named unit of analysis.
#[derive(Debug, Clone)]
pub struct Decl {
    pub id: DeclId,
    pub name: String,
    /// Fully qualified name hash; the `decl_table` key.
    pub name_hash: NameHash,
    /// Owning source unit.
    pub file: FileId,
    /// Position in the owning unit's item list.
    pub src_index: usize,
    /// Byte range of the whole item.
    pub src: Span,
    /// Zero-based line of the item's first byte.
    pub line: u32,
    pub contents_hash: ContentHash,
    pub analysis: AnalysisState,
    pub generation: u32,
    /// Set while queued in the module deletion set.
    pub deletion_flag: bool,
    /// Exported items and comptime blocks are analyzed without being referenced.
    pub is_root: bool,
    /// `None` until an analysis succeeds.
    pub typed_value: Option<DeclValue>,
    pub link: LinkHandle,
    pub fn_link: LinkHandle,
    pub(crate) dependencies: FxHashSet<DeclId>,
    pub(crate) dependants: FxHashSet<DeclId>,
}

impl Decl {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: DeclId,
        name: String,
        name_hash: NameHash,
        file: FileId,
        src_index: usize,
        src: Span,
        line: u32,
        contents_hash: ContentHash,
        generation: u32,
    ) -> Self {
        Self {
            id,
            name,
            name_hash,
            file,
            src_index,
            src,
            line,
            contents_hash,
            analysis: AnalysisState::Unreferenced,
            generation,
            deletion_flag: false,
            is_root: false,
            typed_value: None,
            link: LinkHandle::default(),
            fn_link: LinkHandle::default(),
            dependencies: FxHashSet::default(),
            dependants: FxHashSet::default(),
        }
    }

    pub fn dependencies(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.dependencies.iter().copied()
    }

    pub fn dependants(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.dependants.iter().copied()
    }

    pub fn depends_on(&self, other: DeclId) -> bool {
        self.dependencies.contains(&other)
    }

    pub fn has_dependants(&self) -> bool {
        !self.dependants.is_empty()
    }

    pub fn func(&self) -> Option<&Fn> {
        self.typed_value.as_ref()?.arena.func.as_ref()
    }

    pub(crate) fn func_mut(&mut self) -> Option<&mut Fn> {
        self.typed_value.as_mut()?.arena.func.as_mut()
    }

    /// Whether the current value is a function only expanded inline.
    pub fn is_inline_fn(&self) -> bool {
        self.func().is_some_and(|f| f.state == FnState::InlineOnly)
    }

    /// Whether the current value occupies code or data in the output.
    pub fn has_code_gen_bits(&self) -> bool {
        self.typed_value.as_ref().is_some_and(|tv| match &tv.val {
            Value::Variable(var) => !var.is_extern && tv.ty.has_code_gen_bits(),
            Value::Function(_) => !self.is_inline_fn() && tv.ty.has_code_gen_bits(),
            _ => false,
        })
    }
}

// ============================================================================
// Graph edges
// ============================================================================

impl<B: Backend> Module<B> {
    /// Record that `depender` uses `dependee`. Self edges are ignored.
    pub fn declare_dependency(&mut self, depender: DeclId, dependee: DeclId) {
        if depender == dependee
            || !self.decls.contains_key(&depender)
            || !self.decls.contains_key(&dependee)
        {
            return;
        }
        if let Some(decl) = self.decls.get_mut(&depender) {
            decl.dependencies.insert(dependee);
        }
        if let Some(decl) = self.decls.get_mut(&dependee) {
            decl.dependants.insert(depender);
        }
    }

    /// Drop the edge `depender -> dependee` from both ends.
    pub fn remove_dependency(&mut self, depender: DeclId, dependee: DeclId) {
        if let Some(decl) = self.decls.get_mut(&depender) {
            decl.dependencies.remove(&dependee);
        }
        if let Some(decl) = self.decls.get_mut(&dependee) {
            decl.dependants.remove(&depender);
        }
    }

    /// Drop every outgoing edge of `depender`, returning the former targets.
    pub fn clear_dependencies(&mut self, depender: DeclId) -> Vec<DeclId> {
        let former: Vec<DeclId> = match self.decls.get_mut(&depender) {
            Some(decl) => decl.dependencies.drain().collect(),
            None => return Vec::new(),
        };
        for &dep in &former {
            if let Some(decl) = self.decls.get_mut(&dep) {
                decl.dependants.remove(&depender);
            }
        }
        former
    }

    /// Flag `decl` and queue it for deletion if nothing depends on it anymore.
    pub(crate) fn maybe_queue_orphan(&mut self, decl: DeclId) {
        let Some(dep) = self.decls.get_mut(&decl) else {
            return;
        };
        if dep.dependants.is_empty() && !dep.deletion_flag {
            dep.deletion_flag = true;
            self.deletion_set.push(decl);
        }
    }
}
