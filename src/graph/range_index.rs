//! Per-file position to enclosing-symbol lookup.
//!
//! Entries are sorted by start ascending, then end descending, so an outer
//! symbol always precedes the symbols nested in it. A lookup binary searches
//! for the last entry starting at or before the position and walks back to
//! the first one that contains it, which is the innermost enclosing symbol.

use serde::{Deserialize, Serialize};

use crate::ingest::SourceRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub range: SourceRange,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeIndex {
    entries: Vec<RangeEntry>,
}

impl RangeIndex {
    pub fn new(entries: impl IntoIterator<Item = (SourceRange, String)>) -> Self {
        let mut entries: Vec<RangeEntry> = entries
            .into_iter()
            .map(|(range, id)| RangeEntry { range, id })
            .collect();
        entries.sort_by(|a, b| {
            a.range
                .start()
                .cmp(&b.range.start())
                .then_with(|| b.range.end().cmp(&a.range.end()))
                .then_with(|| a.id.cmp(&b.id))
        });
        Self { entries }
    }

    /// Innermost symbol whose range contains `(line, col)`.
    ///
    /// `line` is 1-based, `col` a 0-based byte column.
    pub fn enclosing(&self, line: usize, col: usize) -> Option<&str> {
        let pos = (line, col);
        let upper = self.entries.partition_point(|e| e.range.start() <= pos);
        self.entries[..upper]
            .iter()
            .rev()
            .find(|e| e.range.contains(line, col))
            .map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }
}
