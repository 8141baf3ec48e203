// Row/column edit operations for editor surfaces.

use serde::{Deserialize, Serialize};

use super::myers::{diff_ops, EditOp};
use crate::types::Position;

/// A single editor-level change. Positions refer to the text as it stands
/// after every earlier delta in the same batch has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum EditorDelta {
    Insert { at: Position, text: String },
    Remove { start: Position, end: Position, text: String },
}

/// Converts the difference between two texts into editor deltas.
pub fn editor_deltas(old_text: &str, new_text: &str) -> Vec<EditorDelta> {
    let mut cursor = Position::default();
    let mut deltas = Vec::new();

    for op in diff_ops(old_text, new_text) {
        match op {
            EditOp::Equal(text) => cursor = advance(cursor, &text),
            EditOp::Insert(text) => {
                let at = cursor;
                cursor = advance(cursor, &text);
                deltas.push(EditorDelta::Insert { at, text });
            }
            EditOp::Delete(text) => {
                let end = advance(cursor, &text);
                deltas.push(EditorDelta::Remove {
                    start: cursor,
                    end,
                    text,
                });
            }
        }
    }

    deltas
}

/// Applies deltas in order. Positions past the end of a row or of the text
/// are clamped.
pub fn apply_deltas(text: &str, deltas: &[EditorDelta]) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    for delta in deltas {
        match delta {
            EditorDelta::Insert { at, text } => {
                let offset = char_offset(&chars, *at);
                chars.splice(offset..offset, text.chars());
            }
            EditorDelta::Remove { start, end, .. } => {
                let from = char_offset(&chars, *start);
                let to = char_offset(&chars, *end).max(from);
                chars.drain(from..to);
            }
        }
    }
    chars.into_iter().collect()
}

fn advance(mut position: Position, text: &str) -> Position {
    for ch in text.chars() {
        if ch == '\n' {
            position.row += 1;
            position.column = 0;
        } else {
            position.column += 1;
        }
    }
    position
}

/// Character offset of a row/column position.
pub fn char_offset(chars: &[char], position: Position) -> usize {
    let mut row = 0u32;
    let mut row_start = 0usize;
    for (index, ch) in chars.iter().enumerate() {
        if row == position.row {
            break;
        }
        if *ch == '\n' {
            row += 1;
            row_start = index + 1;
        }
    }
    if row < position.row {
        return chars.len();
    }

    let row_len = chars[row_start..]
        .iter()
        .position(|ch| *ch == '\n')
        .unwrap_or(chars.len() - row_start);
    row_start + (position.column as usize).min(row_len)
}
