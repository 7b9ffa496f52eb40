//! Kiln: an incremental semantic analyzer for a small systems language.
//!
//! This crate is the entry point. A [`Compilation`] owns the source text of
//! every file, notices which files actually changed between updates, and
//! drives the declaration graph in [`kiln_sema::Module`].
//!
//! # Example
//!
//! ```
//! use kiln::Compilation;
//!
//! let mut comp = Compilation::default();
//! comp.add_source("main.kn", "export fn answer() u32 { return 42; }\n").unwrap();
//! comp.check().unwrap();
//!
//! // Unchanged text leaves the file clean.
//! assert!(!comp.update_source("main.kn", "export fn answer() u32 { return 42; }\n").unwrap());
//! assert!(comp.update_source("main.kn", "export fn answer() u32 { return 7; }\n").unwrap());
//! assert!(comp.has_pending_changes());
//! ```
//!
//! # Crates
//!
//! - [`kiln_core`]: spans, hashes, types, values and error types
//! - [`kiln_ast`]: lexer and parser
//! - [`kiln_sema`]: the declaration graph, lowering and analysis

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

pub use kiln_ast::{ParseError, parse};
pub use kiln_core::{
    BackendError, CompileError, ContentHash, DeclId, ErrorMsg, ExportId, FileId, InnerError, Span,
    Type, TypedValue, Value,
};
pub use kiln_sema::{
    AnalysisOptions, AnalysisState, Backend, BackendCall, BackendHook, Decl, DeclValue, Export,
    ExportStatus, FnState, Module, NullBackend, RecordingBackend, UpdateReport,
};

/// A diagnostic resolved to a path and 1-indexed line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: error: {}", self.path, self.line, self.column, self.message)
    }
}

struct SourceEntry {
    file: FileId,
    hash: ContentHash,
}

/// Source files plus the module analyzing them.
///
/// Files are registered once with [`add_source`](Self::add_source) and then
/// edited with [`update_source`](Self::update_source). Only files whose
/// content hash changed are handed to the module on the next
/// [`update`](Self::update).
pub struct Compilation<B: Backend = NullBackend> {
    module: Module<B>,
    sources: FxHashMap<String, SourceEntry>,
    /// Paths edited since the last update.
    dirty_files: FxHashSet<String>,
}

impl Default for Compilation<NullBackend> {
    fn default() -> Self {
        Self::new(NullBackend, AnalysisOptions::default())
    }
}

impl<B: Backend> Compilation<B> {
    pub fn new(backend: B, options: AnalysisOptions) -> Self {
        Self {
            module: Module::new(backend, options),
            sources: FxHashMap::default(),
            dirty_files: FxHashSet::default(),
        }
    }

    // =========================================
    // Sources
    // =========================================

    /// Register a new file.
    pub fn add_source(
        &mut self,
        path: impl Into<String>,
        text: impl Into<Arc<str>>,
    ) -> Result<FileId, CompileError> {
        let path = path.into();
        if self.sources.contains_key(&path) {
            return Err(CompileError::DuplicateFile(path));
        }
        let text = text.into();
        let hash = ContentHash::of(text.as_bytes());
        let file = self.module.add_source(path.clone(), text);
        debug!(%path, %file, "source added");
        self.sources
            .insert(path.clone(), SourceEntry { file, hash });
        self.dirty_files.insert(path);
        Ok(file)
    }

    /// Replace a file's text.
    ///
    /// Returns `false` and leaves the file clean when the content is
    /// unchanged.
    pub fn update_source(
        &mut self,
        path: &str,
        text: impl Into<Arc<str>>,
    ) -> Result<bool, CompileError> {
        let Some(entry) = self.sources.get_mut(path) else {
            return Err(CompileError::FileNotFound(path.to_string()));
        };
        let text = text.into();
        let hash = ContentHash::of(text.as_bytes());
        if hash == entry.hash {
            return Ok(false);
        }
        entry.hash = hash;
        self.module.set_source(entry.file, text);
        self.dirty_files.insert(path.to_string());
        Ok(true)
    }

    /// Drop a file. Its decls are deleted on the next update.
    pub fn remove_source(&mut self, path: &str) -> Result<(), CompileError> {
        let Some(entry) = self.sources.remove(path) else {
            return Err(CompileError::FileNotFound(path.to_string()));
        };
        self.module.remove_file(entry.file);
        self.dirty_files.insert(path.to_string());
        Ok(())
    }

    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.sources.get(path).map(|entry| entry.file)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.dirty_files.is_empty()
    }

    /// Paths edited since the last update, sorted.
    pub fn dirty_files(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.dirty_files.iter().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    // =========================================
    // Updates
    // =========================================

    /// Run one update cycle over the pending edits.
    ///
    /// Analysis errors are not a failure here; they stay recorded on the
    /// module and are listed by [`diagnostics`](Self::diagnostics).
    #[tracing::instrument(level = "debug", skip_all, fields(dirty = self.dirty_files.len()))]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn update(&mut self) -> Result<UpdateReport, CompileError> {
        if self.sources.is_empty() && self.dirty_files.is_empty() {
            return Err(CompileError::NoSources);
        }
        let report = self.module.update().map_err(|err| match err {
            InnerError::OutOfMemory => CompileError::OutOfMemory,
            InnerError::AnalysisFail => CompileError::Analysis(self.module.all_errors()),
        })?;
        self.dirty_files.clear();
        debug!(
            generation = report.generation,
            analyzed = report.analyzed.len(),
            deleted = report.deleted.len(),
            "compilation updated"
        );
        Ok(report)
    }

    /// Like [`update`](Self::update), failing when any diagnostic is recorded.
    pub fn check(&mut self) -> Result<UpdateReport, CompileError> {
        let report = self.update()?;
        let errors = self.module.all_errors();
        if errors.is_empty() {
            Ok(report)
        } else {
            Err(CompileError::Analysis(errors))
        }
    }

    // =========================================
    // Queries
    // =========================================

    /// Recorded diagnostics with their file paths and positions resolved.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.module
            .all_errors()
            .into_iter()
            .map(|err| self.render(&err))
            .collect()
    }

    fn render(&self, err: &ErrorMsg) -> Diagnostic {
        let unit = self.module.file(err.file);
        let (line, column) = unit
            .and_then(|u| u.text())
            .map_or((1, 1), |text| err.span.line_col(text));
        Diagnostic {
            path: unit.map_or_else(|| err.file.to_string(), |u| u.path.clone()),
            line,
            column,
            message: err.msg.clone(),
        }
    }

    /// The decl named `name` declared in `path`, if registered.
    pub fn lookup(&self, path: &str, name: &str) -> Option<DeclId> {
        self.module.lookup(self.file_id(path)?, name)
    }

    pub fn module(&self) -> &Module<B> {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module<B> {
        &mut self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut comp = Compilation::default();
        comp.add_source("a.kn", "").unwrap();
        assert_eq!(comp.add_source("a.kn", ""), Err(CompileError::DuplicateFile("a.kn".into())));
    }

    #[test]
    fn unknown_paths_are_reported() {
        let mut comp = Compilation::default();
        assert_eq!(
            comp.update_source("missing.kn", ""),
            Err(CompileError::FileNotFound("missing.kn".into()))
        );
        assert_eq!(
            comp.remove_source("missing.kn"),
            Err(CompileError::FileNotFound("missing.kn".into()))
        );
    }

    #[test]
    fn empty_compilation_has_nothing_to_do() {
        let mut comp = Compilation::default();
        assert_eq!(comp.update(), Err(CompileError::NoSources));
    }

    #[test]
    fn dirty_tracking_follows_content() {
        let mut comp = Compilation::default();
        comp.add_source("b.kn", "const b = 2;\n").unwrap();
        comp.add_source("a.kn", "const a = 1;\n").unwrap();
        assert_eq!(comp.dirty_files(), vec!["a.kn", "b.kn"]);

        comp.update().unwrap();
        assert!(!comp.has_pending_changes());

        assert!(!comp.update_source("a.kn", "const a = 1;\n").unwrap());
        assert!(!comp.has_pending_changes());
        assert!(comp.update_source("a.kn", "const a = 3;\n").unwrap());
        assert_eq!(comp.dirty_files(), vec!["a.kn"]);
    }

    #[test]
    fn diagnostics_resolve_line_and_column() {
        let mut comp = Compilation::default();
        comp.add_source("main.kn", "const ok = 1;\nexport const bad: u8 = 300;\n")
            .unwrap();
        let err = comp.check().unwrap_err();
        assert!(matches!(err, CompileError::Analysis(ref errors) if errors.len() == 1));

        let diags = comp.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].path, "main.kn");
        assert_eq!(diags[0].line, 2);
        assert_eq!(diags[0].message, "type 'u8' cannot represent integer value '300'");
    }
}
