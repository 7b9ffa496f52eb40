//! Symbol exports.
//!
//! An export is stored once in the module and indexed three ways: by the decl
//! whose analysis created it (`export_owners`), by the decl it exports
//! (`decl_exports`) and by symbol name (`symbol_exports`). The first two map
//! to non-empty lists; a list that empties is removed from its map.

use kiln_core::{BackendError, DeclId, ErrorMsg, ExportId, InnerError, InnerResult, Span, Type};
use tracing::debug;

use crate::backend::{Backend, LinkHandle};
use crate::module::Module;
use crate::scope::{self, Scope};
use crate::work::WorkQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStatus {
    InProgress,
    Complete,
    Failed,
    FailedRetryable,
}

/// A request to emit `exported` under a symbol name.
#[derive(Debug, Clone)]
pub struct Export {
    pub id: ExportId,
    pub symbol: String,
    pub src: Span,
    /// Decl whose analysis created the export.
    pub owner: DeclId,
    pub exported: DeclId,
    pub status: ExportStatus,
    pub link: LinkHandle,
}

fn push_export(map: &mut rustc_hash::FxHashMap<DeclId, Vec<ExportId>>, decl: DeclId, id: ExportId) {
    map.entry(decl).or_default().push(id);
}

fn remove_export(
    map: &mut rustc_hash::FxHashMap<DeclId, Vec<ExportId>>,
    decl: DeclId,
    id: ExportId,
) {
    if let Some(list) = map.get_mut(&decl) {
        list.retain(|&e| e != id);
        if list.is_empty() {
            map.remove(&decl);
        }
    }
}

impl<B: Backend> Module<B> {
    /// Export `exported` as `symbol`, owned by the decl `scope` belongs to.
    ///
    /// Collisions and backend failures are recorded against the export and
    /// never abort the surrounding analysis.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn analyze_export(
        &mut self,
        queue: &mut WorkQueue,
        scope: &Scope<'_>,
        src: Span,
        symbol: &str,
        exported: DeclId,
    ) -> InnerResult<()> {
        self.ensure_decl_analyzed(queue, exported)?;

        let ty = self
            .decls
            .get(&exported)
            .and_then(|d| d.typed_value.as_ref())
            .map(|tv| tv.ty.clone())
            .unwrap_or(Type::Void);
        if !matches!(ty, Type::Fn(_)) {
            return Err(self.fail(scope, src, format!("unable to export type '{}'", ty)));
        }

        let Some(owner) = scope::owner_decl(scope) else {
            return Err(self.fail(scope, src, "export outside of a declaration"));
        };

        let id = ExportId(self.next_export);
        self.next_export += 1;
        self.exports.insert(
            id,
            Export {
                id,
                symbol: symbol.to_string(),
                src,
                owner,
                exported,
                status: ExportStatus::InProgress,
                link: LinkHandle::default(),
            },
        );
        push_export(&mut self.export_owners, owner, id);
        push_export(&mut self.decl_exports, exported, id);

        if let Some(&existing) = self.symbol_exports.get(symbol) {
            debug!(symbol, ?existing, new = ?id, "export collision");
            if let Some(export) = self.exports.get_mut(&id) {
                export.status = ExportStatus::Failed;
            }
            let file = scope::file(scope);
            self.failed_exports.insert(
                id,
                ErrorMsg::new(file, src, format!("exported symbol collision: {}", symbol)),
            );
            return Ok(());
        }
        self.symbol_exports.insert(symbol.to_string(), id);

        let exports: Vec<_> = self
            .decl_exports
            .get(&exported)
            .into_iter()
            .flatten()
            .filter_map(|e| self.exports.get(e).cloned())
            .collect();
        let result = match self.decls.get(&exported) {
            Some(decl) => self.backend.update_decl_exports(decl, &exports),
            None => Ok(()),
        };
        let (status, msg) = match result {
            Ok(()) => (ExportStatus::Complete, None),
            Err(BackendError::OutOfMemory) => return Err(InnerError::OutOfMemory),
            Err(BackendError::Retryable(msg)) => {
                debug!(symbol, %msg, "export failed, will retry");
                (ExportStatus::FailedRetryable, Some(msg))
            }
            Err(BackendError::Permanent(msg)) => (ExportStatus::Failed, Some(msg)),
        };
        if let Some(msg) = msg {
            let file = scope::file(scope);
            self.failed_exports.insert(
                id,
                ErrorMsg::new(file, src, format!("unable to export: {}", msg)),
            );
        }
        if let Some(export) = self.exports.get_mut(&id) {
            export.status = status;
        }
        Ok(())
    }

    /// Remove every export owned by `decl`.
    pub(crate) fn delete_decl_exports(&mut self, decl: DeclId) {
        let Some(owned) = self.export_owners.remove(&decl) else {
            return;
        };
        for id in owned {
            let Some(export) = self.exports.remove(&id) else {
                continue;
            };
            remove_export(&mut self.decl_exports, export.exported, id);
            if self.symbol_exports.get(&export.symbol) == Some(&id) {
                self.symbol_exports.remove(&export.symbol);
            }
            self.failed_exports.remove(&id);
        }
    }

    /// Drop exports that name `decl` as their target, whoever owns them.
    pub(crate) fn delete_exports_of(&mut self, decl: DeclId) {
        let Some(named) = self.decl_exports.remove(&decl) else {
            return;
        };
        for id in named {
            let Some(export) = self.exports.remove(&id) else {
                continue;
            };
            remove_export(&mut self.export_owners, export.owner, id);
            if self.symbol_exports.get(&export.symbol) == Some(&id) {
                self.symbol_exports.remove(&export.symbol);
            }
            self.failed_exports.remove(&id);
        }
    }
}
