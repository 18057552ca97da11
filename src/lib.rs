#![forbid(unsafe_code)]

pub mod config;
pub mod crdt;
pub mod cursor;
pub mod error;
pub mod replica;
pub mod telemetry;
pub mod users;
pub mod wire;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working set at the crate root for convenience
pub use crate::crdt::document::{Character, Document, DocumentError, Line};
pub use crate::crdt::position::{generate_position_between, Identifier, NodeId, Position, BASE};
pub use crate::cursor::{CursorMapper, TextCoords};
pub use crate::replica::{
    EventSubscription, PeerListener, PeerListenerHandle, Replica, ReplicaError, ReplicaEvent,
};
pub use crate::wire::{
    CursorState, MessageReader, MessageWriter, Operation, PeerMessage, SelectionState, WireError,
};
