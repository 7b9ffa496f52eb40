//! Kiln core types.
//!
//! Leaf crate shared by the front end and the analyzer.
//!
//! ## Modules
//!
//! - [`span`]: Byte-offset source spans
//! - [`hash`]: Name and content hashes used as graph keys and change detectors
//! - [`ids`]: Stable handles for declarations, exports and files
//! - [`ops`]: Comparison and arithmetic operator kinds
//! - [`types`]: Compile-time type representation
//! - [`value`]: Compile-time values
//! - [`error`]: Diagnostics and propagated error signals

pub mod error;
pub mod hash;
pub mod ids;
pub mod ops;
pub mod span;
pub mod types;
pub mod value;

pub use error::{BackendError, CompileError, ErrorMsg, InnerError, InnerResult};
pub use hash::{ContentHash, NameHash};
pub use ids::{DeclId, ExportId, FileId};
pub use ops::{ArithOp, CmpOp};
pub use span::Span;
pub use types::{
    ArrayType, CallingConvention, FnType, IntInfo, MAX_INT_BITS, PointerType, PtrSize, Signedness,
    Type, VectorType,
};
pub use value::{TypedValue, Value, Variable, int_bit_count_twos_comp};
