//! Peer wire protocol: newline-delimited JSON messages.

pub mod codec;
pub mod message;

pub use codec::{MessageReader, MessageWriter, WireError, MAX_FRAME_BYTES};
pub use message::{CursorState, Operation, PeerMessage, SelectionState};
