//! Code generation backend interface.
//!
//! The analyzer drives a backend through these callbacks and never looks
//! inside the [`LinkHandle`]s it hands out.

use kiln_core::{BackendError, DeclId};
use rustc_hash::FxHashMap;

use crate::decl::Decl;
use crate::export::Export;

/// Backend-owned location or symbol state attached to a decl or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkHandle(pub u64);

/// Callbacks a code generator provides.
pub trait Backend {
    /// Reserve symbol table slots for a decl that will be generated.
    fn allocate_decl_indexes(&mut self, decl: &mut Decl) -> Result<(), BackendError>;

    /// Release everything the backend holds for `decl`.
    fn free_decl(&mut self, decl: &Decl);

    /// Materialize the full export list of `decl`.
    fn update_decl_exports(&mut self, decl: &Decl, exports: &[Export]) -> Result<(), BackendError>;

    /// Generate code for an analyzed decl.
    fn update_decl(&mut self, decl: &Decl) -> Result<(), BackendError>;

    /// Refresh debug line information after `decl` moved.
    fn update_decl_line_number(&mut self, decl: &Decl) -> Result<(), BackendError>;

    /// Emit a C header declaration.
    fn emit_h_decl(&mut self, _decl: &Decl) -> Result<(), BackendError> {
        Ok(())
    }
}

/// A backend that accepts everything and produces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn allocate_decl_indexes(&mut self, _decl: &mut Decl) -> Result<(), BackendError> {
        Ok(())
    }

    fn free_decl(&mut self, _decl: &Decl) {}

    fn update_decl_exports(
        &mut self,
        _decl: &Decl,
        _exports: &[Export],
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn update_decl(&mut self, _decl: &Decl) -> Result<(), BackendError> {
        Ok(())
    }

    fn update_decl_line_number(&mut self, _decl: &Decl) -> Result<(), BackendError> {
        Ok(())
    }
}

/// One observed backend callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    AllocateDeclIndexes(String),
    FreeDecl(String),
    UpdateDeclExports { decl: String, symbols: Vec<String> },
    UpdateDecl(String),
    UpdateDeclLineNumber { decl: String, line: u32 },
    EmitHDecl(String),
}

/// Which callback a scripted failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendHook {
    AllocateDeclIndexes,
    UpdateDeclExports,
    UpdateDecl,
    UpdateDeclLineNumber,
    EmitHDecl,
}

/// A backend that logs every call by decl name and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    pub calls: Vec<BackendCall>,
    failures: FxHashMap<(BackendHook, String), BackendError>,
    next_link: u64,
    links: FxHashMap<DeclId, u64>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `hook` fail with `err` whenever it is called for `decl_name`.
    pub fn fail_on(&mut self, hook: BackendHook, decl_name: &str, err: BackendError) {
        self.failures.insert((hook, decl_name.to_string()), err);
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of live allocations handed out and not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.links.len()
    }

    fn check(&self, hook: BackendHook, decl: &Decl) -> Result<(), BackendError> {
        match self.failures.get(&(hook, decl.name.clone())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl Backend for RecordingBackend {
    fn allocate_decl_indexes(&mut self, decl: &mut Decl) -> Result<(), BackendError> {
        self.calls
            .push(BackendCall::AllocateDeclIndexes(decl.name.clone()));
        self.check(BackendHook::AllocateDeclIndexes, decl)?;
        let link = *self.links.entry(decl.id).or_insert_with(|| {
            self.next_link += 1;
            self.next_link
        });
        decl.link = LinkHandle(link);
        Ok(())
    }

    fn free_decl(&mut self, decl: &Decl) {
        self.calls.push(BackendCall::FreeDecl(decl.name.clone()));
        self.links.remove(&decl.id);
    }

    fn update_decl_exports(&mut self, decl: &Decl, exports: &[Export]) -> Result<(), BackendError> {
        self.calls.push(BackendCall::UpdateDeclExports {
            decl: decl.name.clone(),
            symbols: exports.iter().map(|e| e.symbol.clone()).collect(),
        });
        self.check(BackendHook::UpdateDeclExports, decl)
    }

    fn update_decl(&mut self, decl: &Decl) -> Result<(), BackendError> {
        self.calls.push(BackendCall::UpdateDecl(decl.name.clone()));
        self.check(BackendHook::UpdateDecl, decl)
    }

    fn update_decl_line_number(&mut self, decl: &Decl) -> Result<(), BackendError> {
        self.calls.push(BackendCall::UpdateDeclLineNumber {
            decl: decl.name.clone(),
            line: decl.line,
        });
        self.check(BackendHook::UpdateDeclLineNumber, decl)
    }

    fn emit_h_decl(&mut self, decl: &Decl) -> Result<(), BackendError> {
        self.calls.push(BackendCall::EmitHDecl(decl.name.clone()));
        self.check(BackendHook::EmitHDecl, decl)
    }
}
