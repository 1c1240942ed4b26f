//! Cursor-owned selection lists.
//!
//! A selection is a bag of positions attached to one cursor. Path selects
//! are recorded lazily and only evaluated when the selection is first
//! consumed; manual adds append directly. Iteration is forward only and is
//! reset by starting a new select.

use crate::store::Position;

/// Paths recorded by a select call, waiting for first use.
#[derive(Debug, Clone)]
pub(crate) struct PendingSelect {
    pub exprs: Vec<String>,
    pub origin: Position,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct SelectionSet {
    items: Vec<Position>,
    next: usize,
    pending: Option<PendingSelect>,
}

impl SelectionSet {
    /// Start a fresh selection from `exprs`, discarding any previous one.
    /// Nothing is evaluated yet.
    pub fn begin(&mut self, exprs: Vec<String>, origin: Position) {
        self.items.clear();
        self.next = 0;
        self.pending = Some(PendingSelect { exprs, origin });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_pending(&mut self) -> Option<PendingSelect> {
        self.pending.take()
    }

    /// Install the results of a resolved select.
    pub fn install(&mut self, items: Vec<Position>) {
        self.items = items;
        self.next = 0;
    }

    /// Append one position; bag semantics, duplicates welcome.
    pub fn push(&mut self, pos: Position) {
        self.items.push(pos);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Next unvisited position, advancing the iteration point.
    pub fn advance(&mut self) -> Option<Position> {
        let pos = self.items.get(self.next).copied()?;
        self.next += 1;
        Some(pos)
    }

    /// Random access; repositions the iteration point just past `i`.
    pub fn jump(&mut self, i: usize) -> Option<Position> {
        let pos = self.items.get(i).copied()?;
        self.next = i + 1;
        Some(pos)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next = 0;
        self.pending = None;
    }

    /// Every position the set holds, for mutation fixups. Includes the
    /// recorded origin of a pending select.
    pub fn positions_mut(&mut self) -> impl Iterator<Item = &mut Position> {
        self.items
            .iter_mut()
            .chain(self.pending.as_mut().map(|p| &mut p.origin))
    }
}

// ===== Tests =====
