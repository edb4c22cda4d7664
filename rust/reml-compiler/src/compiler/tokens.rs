//! Source position tracking, shared by the AST and Core IR.

use serde::{Deserialize, Serialize};

/// A source span: byte offsets plus 1-based line/column of the start.
/// Produced by the (out-of-scope) parser and threaded unchanged through
/// resolution into Core (§3.2 "every Core node carries its type"; spans
/// travel alongside types from AST through Core and into diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, col: usize) -> Self {
        Self { start, end, line, col }
    }

    /// A span for synthesized nodes that have no corresponding source
    /// text (e.g. a `where not e` manufactured from a `require` step).
    pub fn dummy() -> Self {
        Self { start: 0, end: 0, line: 0, col: 0 }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            col: if self.line <= other.line { self.col } else { other.col },
        }
    }
}
