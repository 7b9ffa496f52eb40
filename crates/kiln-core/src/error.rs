//! Error types shared by the analyzer crates.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ErrorMsg      - a rendered diagnostic tied to a file and byte span
//! InnerError    - the propagated analysis signal (AnalysisFail / OutOfMemory)
//! BackendError  - failures reported by a code generation backend
//! CompileError  - what a whole compilation reports to its caller
//! ```
//!
//! Semantic errors are never returned structurally. They are recorded as an
//! [`ErrorMsg`] against the owning declaration and the caller only sees
//! [`InnerError::AnalysisFail`].

use thiserror::Error;

use crate::{FileId, Span};

// ============================================================================
// Diagnostics
// ============================================================================

/// A diagnostic attached to a source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{span}: {msg}")]
pub struct ErrorMsg {
    /// Source unit the diagnostic points into.
    pub file: FileId,
    /// Byte range of the offending code.
    pub span: Span,
    /// Human readable message.
    pub msg: String,
}

impl ErrorMsg {
    pub fn new(file: FileId, span: Span, msg: impl Into<String>) -> Self {
        Self {
            file,
            span,
            msg: msg.into(),
        }
    }

    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        self.span
    }
}

// ============================================================================
// Analysis Errors
// ============================================================================

/// Signal propagated out of analysis functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InnerError {
    /// Analysis failed and a diagnostic has already been recorded.
    #[error("analysis failed")]
    AnalysisFail,

    /// An allocation budget was exhausted. No diagnostic is recorded.
    #[error("out of memory")]
    OutOfMemory,
}

/// Result alias for analysis functions.
pub type InnerResult<T> = Result<T, InnerError>;

// ============================================================================
// Backend Errors
// ============================================================================

/// Failure reported by a backend callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// An environmental failure that may succeed if tried again.
    #[error("{0}")]
    Retryable(String),

    /// A failure that will recur until the input changes.
    #[error("{0}")]
    Permanent(String),

    /// The backend ran out of memory.
    #[error("out of memory")]
    OutOfMemory,
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Retryable(_))
    }
}

// ============================================================================
// Compilation Errors
// ============================================================================

/// Failure of a whole update, as seen by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("no source units registered")]
    NoSources,

    #[error("source unit not found: {0}")]
    FileNotFound(String),

    #[error("source unit already registered: {0}")]
    DuplicateFile(String),

    /// Analysis finished with recorded diagnostics.
    #[error("analysis failed with {} error(s)", .0.len())]
    Analysis(Vec<ErrorMsg>),

    #[error("out of memory")]
    OutOfMemory,
}
