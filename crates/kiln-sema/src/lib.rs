//! Kiln semantic analyzer.
//!
//! Incremental, demand-driven analysis over a graph of top-level
//! declarations. Each decl is analyzed at most once per update; editing a
//! source unit marks only the changed decls outdated, and outdated decls
//! propagate to their dependants only when their type changes.
//!
//! ## Architecture
//!
//! - **Container analysis**: diff a unit's items against registered decls
//! - **Decl analysis**: lower an item to ZIR and evaluate its signature or
//!   initializer at compile time
//! - **Body analysis**: turn a function's ZIR into typed IR, queued as a
//!   codegen work item
//! - **Deletion**: decls nobody references any more are deleted at the end
//!   of an update
//!
//! ## Modules
//!
//! - [`module`]: The [`Module`] graph and the update cycle
//! - [`container`]: Source units and container reconciliation
//! - [`decl`]: Decls, analysis states and dependency edges
//! - [`astgen`]: AST to ZIR lowering
//! - [`zir`]: Untyped instructions produced by lowering
//! - [`ir`]: Typed instructions produced by analysis
//! - [`builder`]: Instruction builder
//! - [`scope`]: Lexical scope chains
//! - [`export`]: Exported symbols
//! - [`backend`]: Code generation callbacks
//! - [`work`]: Work items and the queue
//! - [`options`]: Analysis limits and switches

mod analyze;
pub mod astgen;
pub mod backend;
pub mod builder;
pub mod container;
pub mod decl;
pub mod export;
pub mod ir;
pub mod module;
pub mod options;
pub mod scope;
mod sema;
pub mod work;
pub mod zir;

pub use astgen::{AstGenError, lower_file, lower_item};
pub use backend::{Backend, BackendCall, BackendHook, LinkHandle, NullBackend, RecordingBackend};
pub use builder::Block;
pub use container::{FileFailure, SourceOrigin, SourceUnit};
pub use decl::{AnalysisState, Decl, DeclArena, DeclValue, Fn, FnState};
pub use export::{Export, ExportStatus};
pub use ir::{Body, Inst, InstKind, InstRef, IrArena};
pub use module::{Module, UpdateReport};
pub use options::AnalysisOptions;
pub use scope::Scope;
pub use work::{WorkItem, WorkQueue};
pub use zir::{Zir, ZirDecl, ZirDeclKind, ZirRef};
