//! Character-level sequence CRDT.
//!
//! `position` is the dense identifier algebra; `document` is the replicated
//! line/character structure keyed by those identifiers.

pub mod document;
pub mod position;

pub use document::{Character, Document, DocumentError, Line};
pub use position::{generate_position_between, Identifier, NodeId, Position, BASE};
