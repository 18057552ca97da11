use thiserror::Error;

use crate::config::ConfigError;
use crate::crdt::document::DocumentError;
use crate::replica::ReplicaError;
use crate::wire::WireError;

/// Crate-level convenience error.
///
/// A thin wrapper over the per-subsystem errors; callers that care about a
/// specific failure match on the inner variant.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Replica(#[from] ReplicaError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
