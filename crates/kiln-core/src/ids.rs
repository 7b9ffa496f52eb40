//! Stable handles for module-owned entities.
//!
//! Handles are never reused within one module: a deleted declaration's
//! `DeclId` stays dead, so a stale work item simply fails to resolve.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Handle to a declaration in the module's decl store.
    DeclId,
    "decl"
);
define_id!(
    /// Handle to an export record.
    ExportId,
    "export"
);
define_id!(
    /// Handle to a source unit (parsed file or ZIR module).
    FileId,
    "file"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display() {
        assert_eq!(DeclId(3).to_string(), "decl#3");
        assert_eq!(format!("{:?}", FileId(0)), "file#0");
    }
}
