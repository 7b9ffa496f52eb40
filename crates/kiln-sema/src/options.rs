//! Analyzer configuration.

/// Default number of backward branches compile-time evaluation may take.
pub const DEFAULT_EVAL_BRANCH_QUOTA: u32 = 1000;

/// Default nesting bound for compile-time calls.
pub const DEFAULT_MAX_COMPTIME_CALL_DEPTH: u32 = 64;

/// Knobs for one [`Module`](crate::Module).
///
/// # Example
///
/// ```
/// use kiln_sema::AnalysisOptions;
///
/// let options = AnalysisOptions::default()
///     .with_eval_branch_quota(50)
///     .with_emit_h(true);
/// assert_eq!(options.eval_branch_quota, 50);
/// assert_eq!(options.max_comptime_call_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Backward branches plus compile-time calls allowed per analysis.
    pub eval_branch_quota: u32,
    pub max_comptime_call_depth: u32,
    /// Queue header emission when a function's type changes.
    pub emit_h: bool,
    /// Instruction budget for each IR arena. `None` is unbounded.
    pub arena_instruction_limit: Option<usize>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            eval_branch_quota: DEFAULT_EVAL_BRANCH_QUOTA,
            max_comptime_call_depth: DEFAULT_MAX_COMPTIME_CALL_DEPTH,
            emit_h: false,
            arena_instruction_limit: None,
        }
    }
}

impl AnalysisOptions {
    pub fn with_eval_branch_quota(mut self, quota: u32) -> Self {
        self.eval_branch_quota = quota;
        self
    }

    pub fn with_max_comptime_call_depth(mut self, depth: u32) -> Self {
        self.max_comptime_call_depth = depth;
        self
    }

    pub fn with_emit_h(mut self, emit_h: bool) -> Self {
        self.emit_h = emit_h;
        self
    }

    pub fn with_arena_instruction_limit(mut self, limit: usize) -> Self {
        self.arena_instruction_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = AnalysisOptions::default();
        assert_eq!(options.eval_branch_quota, 1000);
        assert_eq!(options.max_comptime_call_depth, 64);
        assert!(!options.emit_h);
        assert_eq!(options.arena_instruction_limit, None);
    }

    #[test]
    fn builders_chain() {
        let options = AnalysisOptions::default()
            .with_max_comptime_call_depth(8)
            .with_arena_instruction_limit(16);
        assert_eq!(options.max_comptime_call_depth, 8);
        assert_eq!(options.arena_instruction_limit, Some(16));
    }
}
