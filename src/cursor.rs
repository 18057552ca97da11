//! Cursor and selection mapping between text coordinates and positions.
//!
//! A [`CursorMapper`] borrows a document snapshot and translates both ways:
//! front-ends speak 1-based `(line, column)`, the replication layer speaks
//! [`Position`]s. It also carries the local user's presence metadata so the
//! front-end can stamp cursor/selection broadcasts.

use crate::crdt::document::{Document, DocumentError};
use crate::crdt::position::{NodeId, Position};

/// 1-based text coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TextCoords {
    pub line: usize,
    pub column: usize,
}

impl TextCoords {
    pub fn new(line: usize, column: usize) -> TextCoords {
        TextCoords { line, column }
    }
}

/// Coordinate translator over a borrowed document snapshot.
///
/// Stateless apart from the user id/name/color it carries for presence
/// messages; re-borrow after every document mutation.
pub struct CursorMapper<'doc> {
    document: &'doc Document,
    user_id: NodeId,
    user_name: Option<String>,
    color: Option<String>,
}

impl<'doc> CursorMapper<'doc> {
    pub fn new(document: &'doc Document, user_id: NodeId) -> CursorMapper<'doc> {
        CursorMapper {
            document,
            user_id,
            user_name: None,
            color: None,
        }
    }

    pub fn with_presence(
        mut self,
        user_name: Option<String>,
        color: Option<String>,
    ) -> CursorMapper<'doc> {
        self.user_name = user_name;
        self.color = color;
        self
    }

    pub fn user_id(&self) -> NodeId {
        self.user_id
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    /// Position of the character under the caret at `(line, column)`.
    ///
    /// An empty line maps to the empty position (document start); a column
    /// past the end of a line clamps to its last character.
    pub fn to_position(&self, line: usize, column: usize) -> Result<Position, DocumentError> {
        let out_of_range = DocumentError::OutOfRange { line, column };
        if line == 0 || line > self.document.lines.len() || column == 0 {
            return Err(out_of_range);
        }

        let characters = &self.document.lines[line - 1].characters;
        if characters.is_empty() {
            return Ok(Position::empty());
        }
        let index = (column - 1).min(characters.len() - 1);
        Ok(characters[index].pos.clone())
    }

    /// Text coordinates of the character stored at `pos`.
    ///
    /// The empty position is the document start; a position not present in
    /// the snapshot (deleted under the cursor, or never synced) resolves to
    /// the end of the document.
    pub fn to_coords(&self, pos: &Position) -> TextCoords {
        if pos.is_empty() {
            return TextCoords::new(1, 1);
        }

        for (line_idx, line) in self.document.lines.iter().enumerate() {
            for (char_idx, ch) in line.characters.iter().enumerate() {
                if ch.pos == *pos {
                    return TextCoords::new(line_idx + 1, char_idx + 1);
                }
            }
        }
        self.end_of_document()
    }

    /// Both endpoint positions of a coordinate selection.
    pub fn selection_range(
        &self,
        start: TextCoords,
        end: TextCoords,
    ) -> Result<(Position, Position), DocumentError> {
        let start_pos = self.to_position(start.line, start.column)?;
        let end_pos = self.to_position(end.line, end.column)?;
        Ok((start_pos, end_pos))
    }

    /// Text between two positions, end-exclusive, in either endpoint order.
    pub fn extract_text(&self, start: &Position, end: &Position) -> String {
        let mut from = self.to_coords(start);
        let mut to = self.to_coords(end);
        if to < from {
            std::mem::swap(&mut from, &mut to);
        }

        let mut out = String::new();
        for line_num in from.line..=to.line.min(self.document.lines.len()) {
            let characters = &self.document.lines[line_num - 1].characters;

            let start_col = if line_num == from.line { from.column } else { 1 };
            let end_col = if line_num == to.line {
                to.column.saturating_sub(1)
            } else {
                characters.len()
            };

            for col in start_col..=end_col.min(characters.len()) {
                let value = characters[col - 1].value;
                // stored newline characters become the separator below
                if value != '\n' {
                    out.push(value);
                }
            }
            if line_num < to.line {
                out.push('\n');
            }
        }
        out
    }

    fn end_of_document(&self) -> TextCoords {
        let last = self.document.lines.len();
        let column = self
            .document
            .lines
            .last()
            .map(|l| l.characters.len() + 1)
            .unwrap_or(1);
        TextCoords::new(last.max(1), column)
    }
}
