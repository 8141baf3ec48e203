// Domain types shared by the relay and its clients.

use serde::{Deserialize, Serialize};

/// Zero-based row/column location in a document, counted in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: u32,
    pub column: u32,
}

/// A collaborator's cursor or selected range. A bare cursor has `start == end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: Position,
    pub end: Position,
}

impl Selection {
    pub fn cursor(at: Position) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_cursor(&self) -> bool {
        self.start == self.end
    }

    /// Same range with `start <= end`.
    pub fn normalized(self) -> Self {
        if self.start <= self.end {
            self
        } else {
            Self {
                start: self.end,
                end: self.start,
            }
        }
    }
}

/// Another collaborator's selection as broadcast to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSelection {
    pub selection: Selection,
    /// Display color, `#rrggbb`.
    pub color: String,
}
