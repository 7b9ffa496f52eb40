//! Lexical scopes.
//!
//! Scopes form a chain through `parent` references up to a namespace root
//! (`File`, `Container` or `ZirModule`). Short-lived links such as locals
//! are allocated in a `bumpalo::Bump` owned by whoever is lowering or
//! analyzing, so the chain never outlives one analysis step.

use kiln_core::{DeclId, FileId, NameHash};

use crate::zir::ZirRef;

#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// Root of one parsed source file.
    File { file: FileId },
    /// Namespace owning a set of child decls.
    Container {
        parent: &'a Scope<'a>,
        file: FileId,
        namespace: NameHash,
    },
    /// A source unit given directly as ZIR.
    ZirModule { file: FileId },
    /// Top-level analysis of one decl.
    DeclAnalysis { parent: &'a Scope<'a>, decl: DeclId },
    /// Semantic analysis of a body.
    Block {
        parent: &'a Scope<'a>,
        decl: DeclId,
        func: Option<DeclId>,
        is_comptime: bool,
    },
    /// AST to ZIR lowering of one decl. `decl` is `None` when lowering
    /// outside of a module.
    GenZir {
        parent: &'a Scope<'a>,
        decl: Option<DeclId>,
    },
    LocalVal {
        parent: &'a Scope<'a>,
        name: &'a str,
        inst: ZirRef,
    },
    LocalPtr {
        parent: &'a Scope<'a>,
        name: &'a str,
        ptr: ZirRef,
    },
}

/// What a local name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalBinding {
    /// An immutable value.
    Val(ZirRef),
    /// A pointer to mutable storage.
    Ptr(ZirRef),
}

impl<'a> Scope<'a> {
    pub fn parent(&self) -> Option<&'a Scope<'a>> {
        match *self {
            Scope::File { .. } | Scope::ZirModule { .. } => None,
            Scope::Container { parent, .. }
            | Scope::DeclAnalysis { parent, .. }
            | Scope::Block { parent, .. }
            | Scope::GenZir { parent, .. }
            | Scope::LocalVal { parent, .. }
            | Scope::LocalPtr { parent, .. } => Some(parent),
        }
    }

    fn is_namespace(&self) -> bool {
        matches!(
            self,
            Scope::File { .. } | Scope::Container { .. } | Scope::ZirModule { .. }
        )
    }
}

/// The decl that owns whatever happens in `scope`.
pub fn owner_decl(scope: &Scope<'_>) -> Option<DeclId> {
    let mut current = scope;
    loop {
        match *current {
            Scope::DeclAnalysis { decl, .. } | Scope::Block { decl, .. } => return Some(decl),
            Scope::GenZir { decl, .. } => return decl,
            Scope::File { .. } | Scope::Container { .. } | Scope::ZirModule { .. } => return None,
            Scope::LocalVal { parent, .. } | Scope::LocalPtr { parent, .. } => current = parent,
        }
    }
}

/// The function whose body is being analyzed, if any.
pub fn func(scope: &Scope<'_>) -> Option<DeclId> {
    let mut current = scope;
    loop {
        match *current {
            Scope::Block { func, .. } => return func,
            _ => current = current.parent()?,
        }
    }
}

/// The nearest namespace root.
pub fn namespace<'s>(scope: &'s Scope<'s>) -> &'s Scope<'s> {
    let mut current = scope;
    while !current.is_namespace() {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}

/// The source unit `scope` belongs to.
pub fn file(scope: &Scope<'_>) -> FileId {
    match *namespace(scope) {
        Scope::File { file } | Scope::ZirModule { file } | Scope::Container { file, .. } => file,
        // namespace() only stops early at a root, and every root carries a file.
        _ => FileId(u32::MAX),
    }
}

/// Find the innermost local binding named `name`.
pub fn lookup_local(scope: &Scope<'_>, name: &str) -> Option<LocalBinding> {
    let mut current = scope;
    loop {
        match *current {
            Scope::LocalVal {
                name: local, inst, ..
            } if local == name => return Some(LocalBinding::Val(inst)),
            Scope::LocalPtr { name: local, ptr, .. } if local == name => {
                return Some(LocalBinding::Ptr(ptr));
            }
            // Locals never leak across a decl boundary.
            Scope::GenZir { .. } | Scope::DeclAnalysis { .. } => return None,
            _ => current = current.parent()?,
        }
    }
}
