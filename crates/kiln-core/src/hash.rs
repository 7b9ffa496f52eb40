//! Deterministic hashes for declaration identity and change detection.
//!
//! Two hashes drive incremental analysis:
//!
//! - [`NameHash`]: a 128-bit fully-qualified name digest. It is the key of the
//!   declaration table, so it must be stable across updates for the same
//!   namespace and identifier.
//! - [`ContentHash`]: a 64-bit digest over the raw source bytes of one
//!   declaration. A changed digest marks the declaration outdated.
//!
//! # Hash Computation
//!
//! Name hashes use XXH3-128 seeded with a domain constant; content hashes use
//! XXHash64 seeded with a different one, so a namespace root and a
//! declaration never share a digest by accident.
//!
//! # Examples
//!
//! ```
//! use kiln_core::{ContentHash, NameHash};
//!
//! let root = NameHash::namespace_root("main.kn");
//! let a = NameHash::child(root, "a");
//! assert_eq!(a, NameHash::child(root, "a"));
//! assert_ne!(a, NameHash::child(root, "b"));
//!
//! assert_ne!(ContentHash::of(b"const a = 1;"), ContentHash::of(b"const a = 2;"));
//! ```

use std::fmt;
use xxhash_rust::xxh3::xxh3_128_with_seed;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific seeds for hash computation.
pub mod hash_constants {
    /// Separator between a namespace digest and a child name.
    pub const SEP: u8 = 0x1f;

    /// Seed for namespace root hashes (one per source unit).
    pub const NAMESPACE: u64 = 0x4bc94d6bd06053ad;

    /// Seed for declaration name hashes.
    pub const DECL: u64 = 0x2fac10b63a6cc57c;

    /// Seed for declaration content hashes.
    pub const CONTENT: u64 = 0x5ea77ffbcdf5f302;
}

// ============================================================================
// NameHash
// ============================================================================

/// Fully-qualified name hash of a declaration or namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NameHash(pub u128);

impl NameHash {
    /// Hash of a namespace root, derived from its source unit path.
    pub fn namespace_root(path: &str) -> Self {
        NameHash(xxh3_128_with_seed(path.as_bytes(), hash_constants::NAMESPACE))
    }

    /// Hash of `name` declared inside the namespace `parent`.
    pub fn child(parent: NameHash, name: &str) -> Self {
        let mut buf = Vec::with_capacity(17 + name.len());
        buf.extend_from_slice(&parent.0.to_le_bytes());
        buf.push(hash_constants::SEP);
        buf.extend_from_slice(name.as_bytes());
        NameHash(xxh3_128_with_seed(&buf, hash_constants::DECL))
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({:#034x})", self.0)
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// Hash over the raw source bytes of a declaration.
///
/// Purely byte based: whitespace and comment edits inside the span count as
/// changes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentHash(pub u64);

impl ContentHash {
    /// Hash a byte slice.
    #[inline]
    pub fn of(bytes: &[u8]) -> Self {
        ContentHash(xxh64(bytes, hash_constants::CONTENT))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:#018x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_hash_deterministic() {
        let root = NameHash::namespace_root("main.kn");
        assert_eq!(NameHash::child(root, "foo"), NameHash::child(root, "foo"));
    }

    #[test]
    fn name_hash_depends_on_namespace() {
        let a = NameHash::namespace_root("a.kn");
        let b = NameHash::namespace_root("b.kn");
        assert_ne!(NameHash::child(a, "foo"), NameHash::child(b, "foo"));
    }

    #[test]
    fn name_hash_separator_prevents_concatenation_collisions() {
        let root = NameHash::namespace_root("main.kn");
        let ab = NameHash::child(NameHash::child(root, "a"), "b");
        let joined = NameHash::child(root, "ab");
        assert_ne!(ab, joined);
    }

    #[test]
    fn root_and_child_domains_differ() {
        let root = NameHash::namespace_root("x");
        assert_ne!(root, NameHash::child(NameHash::default(), "x"));
    }

    #[test]
    fn content_hash_sensitive_to_whitespace() {
        assert_ne!(
            ContentHash::of(b"const a = 1;"),
            ContentHash::of(b"const a =  1;")
        );
        assert_eq!(ContentHash::of(b"fn f() {}"), ContentHash::of(b"fn f() {}"));
    }
}
