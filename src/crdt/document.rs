//! Replicated line/character document.
//!
//! State:
//! - lines: Vec<Line>, each an ordered run of characters
//! - every character keyed by a unique [`Position`]; stored order equals
//!   position order across the whole document
//! - a newline character is always the last character of its line, and its
//!   line is followed by the line holding everything after it
//!
//! Operations apply idempotently enough for replication: inserts land at the
//! slot their position dictates regardless of arrival order, deletes of an
//! already-removed position report [`DocumentError::NotFound`] and change
//! nothing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::position::{generate_position_between, Identifier, NodeId, Position};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("no character at the requested position")]
    NotFound,
    #[error("coordinates ({line}, {column}) out of range")]
    OutOfRange { line: usize, column: usize },
}

/// Serialize a char as its Unicode scalar value (the wire carries code
/// points, not strings).
pub(crate) mod codepoint {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &char, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*value as u32)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<char, D::Error> {
        let code = u32::deserialize(deserializer)?;
        char::from_u32(code)
            .ok_or_else(|| D::Error::custom(format!("invalid Unicode scalar value {code}")))
    }
}

/// One placed character.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub pos: Position,
    pub clock: u64,
    #[serde(with = "codepoint")]
    pub value: char,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub characters: Vec<Character>,
}

/// The per-replica document. Always holds at least one (possibly empty)
/// line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub lines: Vec<Line>,
}

impl Default for Document {
    fn default() -> Document {
        Document::new()
    }
}

/// Position for the `counter`-th seeded character (1-based).
///
/// Counters up to 255 get the single digit `[counter]`; beyond that the
/// vector extends (`[255, 1]`, `[255, 2]`, ... `[255, 255, 1]`, ...) so that
/// the sequence stays strictly increasing while every digit stays below the
/// radix. Zero digits never appear, so no seed is a trailing-zero extension
/// of another.
fn seed_identifiers(counter: u64, node: NodeId) -> Vec<Identifier> {
    let saturated = (counter / 255) as usize;
    let remainder = (counter % 255) as u32;
    let mut identifiers = vec![Identifier::new(255, node); saturated];
    if remainder != 0 {
        identifiers.push(Identifier::new(remainder, node));
    }
    identifiers
}

impl Document {
    /// An empty document: one line, no characters.
    pub fn new() -> Document {
        Document {
            lines: vec![Line::default()],
        }
    }

    /// Seed a document from plain text, one character per scalar, with
    /// strictly increasing positions and clocks starting at 1.
    ///
    /// Round-trips: `Document::from_text(s, n).to_text() == s`.
    pub fn from_text(text: &str, node: NodeId) -> Document {
        let mut counter = 0u64;
        let mut place = |value: char| {
            counter += 1;
            Character {
                pos: Position::from(seed_identifiers(counter, node)),
                clock: counter,
                value,
            }
        };

        let parts: Vec<&str> = text.split('\n').collect();
        let last = parts.len() - 1;
        let lines = parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                let mut characters: Vec<Character> = part.chars().map(&mut place).collect();
                if i < last {
                    characters.push(place('\n'));
                }
                Line { characters }
            })
            .collect();
        Document { lines }
    }

    /// Plain-text view. Stored newline characters are the line terminators;
    /// they are rendered as the separator between lines rather than
    /// re-emitted.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for ch in &line.characters {
                if ch.value != '\n' {
                    out.push(ch.value);
                }
            }
        }
        out
    }

    /// Total number of stored characters, newlines included.
    pub fn char_count(&self) -> usize {
        self.lines.iter().map(|l| l.characters.len()).sum()
    }

    /// Largest clock attached to any stored character.
    pub fn max_clock(&self) -> u64 {
        self.lines
            .iter()
            .flat_map(|l| l.characters.iter())
            .map(|c| c.clock)
            .max()
            .unwrap_or(0)
    }

    /// Insert `value` at `pos`. A newline splits its line: the newline
    /// becomes the final character of the current line and everything after
    /// the split point moves to a fresh successor line.
    pub fn insert_character(&mut self, value: char, pos: Position, clock: u64) {
        if self.lines.is_empty() {
            self.lines.push(Line::default());
        }

        let (line_idx, char_idx) = self.insertion_point(&pos);
        let character = Character { pos, clock, value };

        if value == '\n' {
            let tail = self.lines[line_idx].characters.split_off(char_idx);
            self.lines[line_idx].characters.push(character);
            self.lines.insert(line_idx + 1, Line { characters: tail });
        } else {
            self.lines[line_idx].characters.insert(char_idx, character);
        }
    }

    /// Remove the character at exactly `pos` and return it.
    ///
    /// Removing a newline merges the successor line back in; the merged
    /// characters were all greater than the newline, so the flat order is
    /// preserved.
    pub fn delete_character(&mut self, pos: &Position) -> Result<Character, DocumentError> {
        let (line_idx, char_idx) = self.locate(pos).ok_or(DocumentError::NotFound)?;
        let character = self.lines[line_idx].characters.remove(char_idx);

        if character.value == '\n' && line_idx + 1 < self.lines.len() {
            let successor = self.lines.remove(line_idx + 1);
            self.lines[line_idx].characters.extend(successor.characters);
        }
        Ok(character)
    }

    /// Position of the character at 1-based `(line, column)`.
    ///
    /// `column == line length + 1` resolves to the last character of the
    /// line (the caret-after-end case); on an empty line that is the empty
    /// position, i.e. document start.
    pub fn find_position_at(&self, line: usize, column: usize) -> Result<Position, DocumentError> {
        let out_of_range = DocumentError::OutOfRange { line, column };
        if line == 0 || line > self.lines.len() {
            return Err(out_of_range);
        }
        let characters = &self.lines[line - 1].characters;
        if column == 0 || column > characters.len() + 1 {
            return Err(out_of_range);
        }
        if column <= characters.len() {
            return Ok(characters[column - 1].pos.clone());
        }
        Ok(characters
            .last()
            .map(|c| c.pos.clone())
            .unwrap_or_else(Position::empty))
    }

    /// Allocate the position an insertion at 1-based `(line, column)` should
    /// take: between the characters flanking that caret slot, with virtual
    /// endpoints at the document edges. Columns past the end of the line
    /// clamp to "after its last character".
    pub fn generate_position_at(
        &self,
        line: usize,
        column: usize,
        node: NodeId,
    ) -> Result<Position, DocumentError> {
        if line == 0 || line > self.lines.len() || column == 0 {
            return Err(DocumentError::OutOfRange { line, column });
        }

        let mut index = 0usize;
        for l in &self.lines[..line - 1] {
            index += l.characters.len();
        }
        index += (column - 1).min(self.lines[line - 1].characters.len());

        let all: Vec<&Character> = self.flat_characters().collect();
        if all.is_empty() {
            return Ok(Position::from(seed_identifiers(1, node)));
        }

        let lo = if index == 0 {
            &[]
        } else {
            all[index - 1].pos.identifiers()
        };
        let hi = if index >= all.len() {
            &[]
        } else {
            all[index].pos.identifiers()
        };
        Ok(generate_position_between(lo, hi, node))
    }

    /// Characters in document order. Stored order is position order, so no
    /// re-sorting happens here.
    pub fn flat_characters(&self) -> impl Iterator<Item = &Character> {
        self.lines.iter().flat_map(|l| l.characters.iter())
    }

    /// Slot where a character with `pos` belongs: the first stored character
    /// ordered after it, or the end of the last line.
    fn insertion_point(&self, pos: &Position) -> (usize, usize) {
        for (line_idx, line) in self.lines.iter().enumerate() {
            for (char_idx, ch) in line.characters.iter().enumerate() {
                if *pos < ch.pos {
                    return (line_idx, char_idx);
                }
            }
        }
        let last = self.lines.len() - 1;
        (last, self.lines[last].characters.len())
    }

    /// Exact-match lookup of a stored position.
    fn locate(&self, pos: &Position) -> Option<(usize, usize)> {
        for (line_idx, line) in self.lines.iter().enumerate() {
            for (char_idx, ch) in line.characters.iter().enumerate() {
                if ch.pos == *pos {
                    return Some((line_idx, char_idx));
                }
            }
        }
        None
    }
}
