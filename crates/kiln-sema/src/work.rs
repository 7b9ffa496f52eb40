//! Work items handed between container analysis, decl analysis and codegen.

use std::collections::VecDeque;

use kiln_core::DeclId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkItem {
    /// Make sure the decl is analyzed.
    AnalyzeDecl(DeclId),
    /// Analyze a function body and hand the decl to the backend.
    CodegenDecl(DeclId),
    EmitHDecl(DeclId),
    /// The decl moved but did not change.
    UpdateLineNumber(DeclId),
}

impl WorkItem {
    pub fn decl(self) -> DeclId {
        match self {
            WorkItem::AnalyzeDecl(decl)
            | WorkItem::CodegenDecl(decl)
            | WorkItem::EmitHDecl(decl)
            | WorkItem::UpdateLineNumber(decl) => decl,
        }
    }
}

/// FIFO of pending work.
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    items: VecDeque<WorkItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: WorkItem) {
        self.items.push_back(item);
    }

    pub fn pop(&mut self) -> Option<WorkItem> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    pub fn contains(&self, item: WorkItem) -> bool {
        self.items.contains(&item)
    }

    /// Move every item of `other` to the back of this queue.
    pub fn append(&mut self, other: &mut WorkQueue) {
        self.items.append(&mut other.items);
    }
}

impl Extend<WorkItem> for WorkQueue {
    fn extend<T: IntoIterator<Item = WorkItem>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut queue = WorkQueue::new();
        queue.push(WorkItem::AnalyzeDecl(DeclId(1)));
        queue.push(WorkItem::CodegenDecl(DeclId(2)));
        assert!(queue.contains(WorkItem::CodegenDecl(DeclId(2))));
        assert_eq!(queue.pop(), Some(WorkItem::AnalyzeDecl(DeclId(1))));
        assert_eq!(queue.pop().map(WorkItem::decl), Some(DeclId(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn append_drains_other() {
        let mut a = WorkQueue::new();
        let mut b = WorkQueue::new();
        b.extend([WorkItem::EmitHDecl(DeclId(0)), WorkItem::UpdateLineNumber(DeclId(0))]);
        a.append(&mut b);
        assert_eq!(a.len(), 2);
        assert!(b.is_empty());
    }
}
