//! TCP listener: accept loop and shutdown handle.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::replica::state::Replica;
use crate::replica::ReplicaError;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A bound-but-not-yet-serving listener. Binding is separate from serving
/// so bind failures surface before any thread spawns.
pub struct PeerListener {
    listener: TcpListener,
    replica: Replica,
}

impl std::fmt::Debug for PeerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerListener").finish_non_exhaustive()
    }
}

impl PeerListener {
    pub fn bind(addr: &str, replica: Replica) -> Result<PeerListener, ReplicaError> {
        let listener = TcpListener::bind(addr).map_err(|source| ReplicaError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(PeerListener { listener, replica })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ReplicaError> {
        self.listener.local_addr().map_err(ReplicaError::Connection)
    }

    /// Spawn the accept loop. Each accepted connection is registered with
    /// the replica, which greets it with a `Sync` and starts its receive
    /// thread.
    pub fn start(self) -> Result<PeerListenerHandle, ReplicaError> {
        let local_addr = self.local_addr()?;
        self.listener
            .set_nonblocking(true)
            .map_err(ReplicaError::Connection)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_shutdown = Arc::clone(&shutdown);
        let listener = self.listener;
        let replica = self.replica;

        let join = thread::spawn(move || run_accept_loop(listener, replica, accept_shutdown));

        Ok(PeerListenerHandle {
            shutdown,
            join,
            local_addr,
        })
    }
}

pub struct PeerListenerHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl PeerListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Existing peer connections are left
    /// to the replica.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }
}

fn run_accept_loop(listener: TcpListener, replica: Replica, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match listener.accept() {
            Ok((stream, addr)) => {
                tracing::debug!(%addr, "accepted peer connection");
                replica.accept(stream);
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}
