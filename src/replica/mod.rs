//! Peer replication: the replica state machine, its event fan-out, and the
//! TCP surface.

use thiserror::Error;

pub mod clock;
pub mod events;
pub mod server;
pub mod state;

pub use clock::LogicalClock;
pub use events::{EventSubscription, ReplicaEvent};
pub use server::{PeerListener, PeerListenerHandle};
pub use state::Replica;

#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Listener setup failed; fatal at startup.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Dialing a peer failed; the caller decides whether to retry.
    #[error("failed to join peer at {addr}: {source}")]
    Join {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection setup (handshake send, socket introspection) failed.
    #[error("peer connection failed: {0}")]
    Connection(#[from] std::io::Error),
}
