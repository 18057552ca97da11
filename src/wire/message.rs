//! Message schema.
//!
//! Every frame is one self-describing JSON object with a `type`
//! discriminator:
//!
//! `{"type":"operation","operation":{"type":"insert",...},"user_id":7}`
//!
//! Character payloads travel as Unicode scalar values, not strings.

use serde::{Deserialize, Serialize};

use crate::crdt::document::{codepoint, Document};
use crate::crdt::position::{NodeId, Position};

/// A replicated document edit, keyed by position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Insert {
        position: Position,
        #[serde(with = "codepoint")]
        character: char,
        user_id: NodeId,
        clock: u64,
    },
    Delete {
        position: Position,
        user_id: NodeId,
        clock: u64,
    },
}

impl Operation {
    pub fn position(&self) -> &Position {
        match self {
            Operation::Insert { position, .. } | Operation::Delete { position, .. } => position,
        }
    }

    pub fn user_id(&self) -> NodeId {
        match self {
            Operation::Insert { user_id, .. } | Operation::Delete { user_id, .. } => *user_id,
        }
    }

    pub fn clock(&self) -> u64 {
        match self {
            Operation::Insert { clock, .. } | Operation::Delete { clock, .. } => *clock,
        }
    }
}

/// Ephemeral cursor placement for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub position: Position,
    pub user_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Ephemeral selection range for one user. Null endpoints clear the
/// selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub start_position: Option<Position>,
    pub end_position: Option<Position>,
    pub user_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl SelectionState {
    pub fn is_clear(&self) -> bool {
        self.start_position.is_none() && self.end_position.is_none()
    }
}

/// One peer-to-peer frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// A single edit to apply.
    Operation {
        operation: Operation,
        user_id: NodeId,
    },
    /// Full document state; the receiver adopts it wholesale.
    Sync {
        document: Document,
        user_id: NodeId,
    },
    /// Request for a `Sync`, sent by a dialing peer after connecting.
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document: Option<Document>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<NodeId>,
    },
    Ack {
        user_id: NodeId,
    },
    Error {
        error: String,
        user_id: NodeId,
    },
    Cursor {
        cursor: CursorState,
        user_id: NodeId,
    },
    Selection {
        selection: SelectionState,
        user_id: NodeId,
    },
}

impl PeerMessage {
    pub fn operation(operation: Operation) -> PeerMessage {
        let user_id = operation.user_id();
        PeerMessage::Operation { operation, user_id }
    }

    pub fn sync(document: Document, user_id: NodeId) -> PeerMessage {
        PeerMessage::Sync { document, user_id }
    }

    pub fn init_request(user_id: NodeId) -> PeerMessage {
        PeerMessage::Init {
            document: None,
            user_id: Some(user_id),
        }
    }

    pub fn ack(user_id: NodeId) -> PeerMessage {
        PeerMessage::Ack { user_id }
    }

    pub fn error(error: impl Into<String>, user_id: NodeId) -> PeerMessage {
        PeerMessage::Error {
            error: error.into(),
            user_id,
        }
    }

    pub fn cursor(
        position: Position,
        user_id: NodeId,
        user_name: Option<String>,
        color: Option<String>,
    ) -> PeerMessage {
        PeerMessage::Cursor {
            cursor: CursorState {
                position,
                user_id,
                user_name,
                color,
            },
            user_id,
        }
    }

    pub fn selection(
        start_position: Option<Position>,
        end_position: Option<Position>,
        user_id: NodeId,
        user_name: Option<String>,
        color: Option<String>,
    ) -> PeerMessage {
        PeerMessage::Selection {
            selection: SelectionState {
                start_position,
                end_position,
                user_id,
                user_name,
                color,
            },
            user_id,
        }
    }

    /// An empty selection, broadcast to clear this user's highlight.
    pub fn clear_selection(
        user_id: NodeId,
        user_name: Option<String>,
        color: Option<String>,
    ) -> PeerMessage {
        PeerMessage::selection(None, None, user_id, user_name, color)
    }
}
