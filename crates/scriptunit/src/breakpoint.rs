use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use crate::LineNo;

/// Source lines at which the line probe stops the worker.
#[derive(Debug, Default)]
pub struct Breakpoints {
    lines: RwLock<BTreeSet<LineNo>>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a breakpoint was already set on `line`.
    pub fn insert(&self, line: LineNo) -> bool {
        self.lines.write().unwrap_or_else(PoisonError::into_inner).insert(line)
    }

    pub fn remove(&self, line: LineNo) -> bool {
        self.lines.write().unwrap_or_else(PoisonError::into_inner).remove(&line)
    }

    pub fn clear(&self) {
        self.lines.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn contains(&self, line: LineNo) -> bool {
        self.lines.read().unwrap_or_else(PoisonError::into_inner).contains(&line)
    }

    /// Snapshot of the registered lines in ascending order.
    pub fn lines(&self) -> Vec<LineNo> {
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
