//! Source units and container reconciliation.
//!
//! A source unit is either source text (in memory or on disk) or a ready-made
//! list of ZIR decls. Analyzing a unit diffs its top-level items against the
//! decls registered for it: new items are registered, changed ones marked
//! outdated, moved ones get a line number update and vanished ones deleted.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_ast::ast::{self, ItemKind};
use kiln_core::{ContentHash, DeclId, ErrorMsg, FileId, NameHash, Span};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::backend::Backend;
use crate::decl::{AnalysisState, Decl};
use crate::module::Module;
use crate::scope::Scope;
use crate::work::{WorkItem, WorkQueue};
use crate::zir::ZirDecl;

/// XOR mask applied to a redefined decl's hash so the next update re-examines it.
const REDEFINITION_MASK: u64 = 0x9e37_79b9_7f4a_7c15;

/// Where source text comes from.
#[derive(Debug, Clone)]
pub enum SourceOrigin {
    Memory(Arc<str>),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub(crate) enum UnitContent {
    Source {
        origin: SourceOrigin,
        /// Text of the last successful load.
        text: Option<Arc<str>>,
        /// AST of the last successful parse.
        ast: Option<Arc<ast::File>>,
    },
    Zir { decls: Arc<[ZirDecl]> },
}

/// One file or ZIR module and the decls declared in it.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: String,
    pub namespace: NameHash,
    pub(crate) decls: FxHashSet<DeclId>,
    pub(crate) content: UnitContent,
    pub(crate) dirty: bool,
    pub(crate) removed: bool,
}

impl SourceUnit {
    pub fn decls(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.decls.iter().copied()
    }

    pub fn is_zir(&self) -> bool {
        matches!(self.content, UnitContent::Zir { .. })
    }

    /// Source text, once loaded.
    pub fn text(&self) -> Option<&Arc<str>> {
        match &self.content {
            UnitContent::Source { text, .. } => text.as_ref(),
            UnitContent::Zir { .. } => None,
        }
    }
}

/// A unit that could not be loaded or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub msg: ErrorMsg,
    /// Whether trying again later may succeed.
    pub retryable: bool,
}

/// A top-level item as the reconciler sees it.
#[derive(Debug, Clone)]
struct ItemSummary {
    index: usize,
    name: String,
    src: Span,
    hash: ContentHash,
    line: u32,
    is_root: bool,
}

fn ast_items(file: &ast::File, text: &str) -> Vec<ItemSummary> {
    let mut items = Vec::with_capacity(file.items.len());
    let mut comptime_index = 0usize;
    let mut line = 0u32;
    let mut line_scan = 0usize;
    for (index, item) in file.items.iter().enumerate() {
        let name = match &item.kind {
            ItemKind::Fn(f) => f.name.name.clone(),
            ItemKind::Var(v) => v.name.name.clone(),
            ItemKind::Comptime(_) => {
                comptime_index += 1;
                format!("comptime#{}", comptime_index - 1)
            }
            ItemKind::Test { name, .. } => {
                debug!(test = %name, "skipping test declaration");
                continue;
            }
            ItemKind::Field { name, .. } => {
                debug!(field = %name.name, "skipping container field");
                continue;
            }
            ItemKind::UsingNamespace(_) => {
                debug!("skipping usingnamespace");
                continue;
            }
        };
        let start = (item.span.start as usize).min(text.len());
        if start >= line_scan {
            line += text.as_bytes()[line_scan..start]
                .iter()
                .filter(|&&b| b == b'\n')
                .count() as u32;
            line_scan = start;
        }
        items.push(ItemSummary {
            index,
            name,
            src: item.span,
            hash: ContentHash::of(item.span.slice(text)),
            line,
            is_root: item.is_exported() || matches!(item.kind, ItemKind::Comptime(_)),
        });
    }
    items
}

fn zir_items(decls: &[ZirDecl]) -> Vec<ItemSummary> {
    decls
        .iter()
        .enumerate()
        .map(|(index, decl)| ItemSummary {
            index,
            name: decl.name.clone(),
            src: decl.src,
            hash: ContentHash::of(decl.to_string().as_bytes()),
            line: 0,
            is_root: decl.is_export || decl.is_comptime(),
        })
        .collect()
}

impl<B: Backend> Module<B> {
    // =========================================
    // Source units
    // =========================================

    fn add_unit(&mut self, path: String, content: UnitContent) -> FileId {
        let id = FileId(self.next_file);
        self.next_file += 1;
        let namespace = NameHash::namespace_root(&path);
        self.files.insert(
            id,
            SourceUnit {
                path,
                namespace,
                decls: FxHashSet::default(),
                content,
                dirty: true,
                removed: false,
            },
        );
        id
    }

    /// Register in-memory source text.
    pub fn add_source(&mut self, path: impl Into<String>, text: impl Into<Arc<str>>) -> FileId {
        self.add_unit(
            path.into(),
            UnitContent::Source {
                origin: SourceOrigin::Memory(text.into()),
                text: None,
                ast: None,
            },
        )
    }

    /// Register a file read from disk on each update that needs it.
    pub fn add_source_path(&mut self, path: impl Into<PathBuf>) -> FileId {
        let path = path.into();
        self.add_unit(
            path.display().to_string(),
            UnitContent::Source {
                origin: SourceOrigin::Path(path),
                text: None,
                ast: None,
            },
        )
    }

    /// Replace the text of an in-memory unit, or mark a path unit for re-reading.
    pub fn set_source(&mut self, file: FileId, new_text: impl Into<Arc<str>>) {
        let Some(unit) = self.files.get_mut(&file) else {
            return;
        };
        if let UnitContent::Source { origin, .. } = &mut unit.content {
            *origin = SourceOrigin::Memory(new_text.into());
        }
        unit.dirty = true;
    }

    /// Mark a unit for reloading without changing its origin.
    pub fn touch(&mut self, file: FileId) {
        if let Some(unit) = self.files.get_mut(&file) {
            unit.dirty = true;
        }
    }

    pub fn add_zir_module(&mut self, path: impl Into<String>, decls: Vec<ZirDecl>) -> FileId {
        let content = UnitContent::Zir {
            decls: decls.into(),
        };
        self.add_unit(path.into(), content)
    }

    pub fn set_zir_module(&mut self, file: FileId, decls: Vec<ZirDecl>) {
        let Some(unit) = self.files.get_mut(&file) else {
            return;
        };
        unit.content = UnitContent::Zir {
            decls: decls.into(),
        };
        unit.dirty = true;
    }

    /// Drop a unit. Its decls are deleted on the next update.
    pub fn remove_file(&mut self, file: FileId) {
        if let Some(unit) = self.files.get_mut(&file) {
            unit.removed = true;
            unit.dirty = true;
        }
    }

    pub fn file(&self, file: FileId) -> Option<&SourceUnit> {
        self.files.get(&file)
    }

    // =========================================
    // Reconciliation
    // =========================================

    /// Reconcile one unit and return the work it produced.
    pub fn analyze_file(&mut self, file: FileId) -> WorkQueue {
        let mut queue = WorkQueue::new();
        self.analyze_container(file, &mut queue);
        queue
    }

    /// Load and parse a unit, leaving the results cached on it.
    fn load_unit(&mut self, file: FileId) -> Result<(), FileFailure> {
        let Some(unit) = self.files.get_mut(&file) else {
            return Ok(());
        };
        let UnitContent::Source { origin, text, ast } = &mut unit.content else {
            return Ok(());
        };
        let loaded: Arc<str> = match origin {
            SourceOrigin::Memory(source) => source.clone(),
            SourceOrigin::Path(path) => match std::fs::read_to_string(&*path) {
                Ok(source) => source.into(),
                Err(err) => {
                    return Err(FileFailure {
                        msg: ErrorMsg::new(
                            file,
                            Span::default(),
                            format!("unable to load '{}': {}", path.display(), err),
                        ),
                        retryable: true,
                    });
                }
            },
        };
        match kiln_ast::parse(&loaded) {
            Ok(parsed) => {
                *text = Some(loaded);
                *ast = Some(Arc::new(parsed));
                Ok(())
            }
            Err(errors) => {
                let (span, msg) = errors
                    .first()
                    .map(|e| (e.span(), e.to_string()))
                    .unwrap_or_else(|| (Span::default(), "parse error".to_string()));
                Err(FileFailure {
                    msg: ErrorMsg::new(file, span, msg),
                    retryable: false,
                })
            }
        }
    }

    /// Item summaries from the cached content of `file`.
    fn unit_items(&self, file: FileId) -> Option<Vec<ItemSummary>> {
        let unit = self.files.get(&file)?;
        if unit.removed {
            return Some(Vec::new());
        }
        match &unit.content {
            UnitContent::Source { text, ast, .. } => {
                let (text, ast) = (text.as_ref()?, ast.as_ref()?);
                Some(ast_items(ast, text))
            }
            UnitContent::Zir { decls } => Some(zir_items(decls)),
        }
    }

    fn register_decl(&mut self, file: FileId, namespace: NameHash, item: &ItemSummary) -> DeclId {
        let id = DeclId(self.next_decl);
        self.next_decl += 1;
        let name_hash = NameHash::child(namespace, &item.name);
        let mut decl = Decl::new(
            id,
            item.name.clone(),
            name_hash,
            file,
            item.index,
            item.src,
            item.line,
            item.hash,
            self.generation,
        );
        decl.is_root = item.is_root;
        self.decls.insert(id, decl);
        self.decl_table.insert(name_hash, id);
        if let Some(unit) = self.files.get_mut(&file) {
            unit.decls.insert(id);
        }
        id
    }

    /// Diff a unit's items against its registered decls.
    #[tracing::instrument(level = "debug", skip_all, fields(file = %file))]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn analyze_container(&mut self, file: FileId, queue: &mut WorkQueue) {
        let Some(unit) = self.files.get_mut(&file) else {
            return;
        };
        unit.dirty = false;
        let removed = unit.removed;
        self.failed_files.remove(&file);

        if !removed && let Err(failure) = self.load_unit(file) {
            debug!(msg = %failure.msg.msg, retryable = failure.retryable, "unit failed to load");
            self.failed_files.insert(file, failure);
            return;
        }

        let Some(items) = self.unit_items(file) else {
            return;
        };
        let Some(unit) = self.files.get(&file) else {
            return;
        };
        let namespace = unit.namespace;
        let mut candidates: FxHashSet<DeclId> = unit.decls.clone();

        for item in &items {
            let name_hash = NameHash::child(namespace, &item.name);
            let Some(&id) = self.decl_table.get(&name_hash) else {
                let id = self.register_decl(file, namespace, item);
                if item.is_root {
                    queue.push(WorkItem::AnalyzeDecl(id));
                }
                continue;
            };

            let Some(decl) = self.decls.get_mut(&id) else {
                continue;
            };
            decl.src_index = item.index;
            decl.src = item.src;

            if !candidates.remove(&id) {
                decl.contents_hash = ContentHash(item.hash.0 ^ REDEFINITION_MASK);
                let root = Scope::File { file };
                let scope = Scope::DeclAnalysis {
                    parent: &root,
                    decl: id,
                };
                self.fail(&scope, item.src, format!("redefinition of '{}'", item.name));
                continue;
            }

            decl.is_root = item.is_root;
            if decl.contents_hash != item.hash {
                decl.contents_hash = item.hash;
                decl.line = item.line;
                if decl.analysis == AnalysisState::Unreferenced {
                    if item.is_root {
                        queue.push(WorkItem::AnalyzeDecl(id));
                    }
                } else {
                    self.mark_outdated(id, queue);
                }
            } else if decl.line != item.line {
                decl.line = item.line;
                if decl.analysis == AnalysisState::Complete {
                    queue.push(WorkItem::UpdateLineNumber(id));
                }
            }
        }

        let mut remaining: Vec<DeclId> = candidates.into_iter().collect();
        remaining.sort();
        for id in remaining {
            self.delete_decl(id, queue);
        }
    }

    /// Resolve `name` in `file`, registering it if the unit declares it but
    /// it is not currently registered.
    pub(crate) fn lookup_decl(&mut self, file: FileId, name: &str) -> Option<DeclId> {
        let namespace = self.files.get(&file)?.namespace;
        if let Some(&id) = self.decl_table.get(&NameHash::child(namespace, name)) {
            return Some(id);
        }
        let item = self
            .unit_items(file)?
            .into_iter()
            .find(|item| item.name == name)?;
        debug!(name, "registering decl lazily");
        Some(self.register_decl(file, namespace, &item))
    }

    pub(crate) fn unit_ast(&self, file: FileId) -> Option<(Arc<ast::File>, Arc<str>)> {
        match &self.files.get(&file)?.content {
            UnitContent::Source { text, ast, .. } => Some((ast.clone()?, text.clone()?)),
            UnitContent::Zir { .. } => None,
        }
    }

    pub(crate) fn unit_zir(&self, file: FileId) -> Option<Arc<[ZirDecl]>> {
        match &self.files.get(&file)?.content {
            UnitContent::Zir { decls } => Some(decls.clone()),
            UnitContent::Source { .. } => None,
        }
    }
}
