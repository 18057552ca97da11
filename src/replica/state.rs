//! The replica: document, clock, and peer set behind one lock.
//!
//! Local edits apply to the document first, then broadcast best-effort.
//! Remote frames arrive on one receive thread per connection and funnel
//! through [`Replica::handle_message`]. Broadcast sends never run under the
//! state lock: the peer list is snapshotted, the lock released, and each
//! send serialized per connection by its own writer lock.

use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::crdt::document::{Document, DocumentError};
use crate::crdt::position::{NodeId, Position};
use crate::replica::clock::LogicalClock;
use crate::replica::events::{EventHub, EventSubscription, ReplicaEvent};
use crate::replica::ReplicaError;
use crate::wire::codec::{MessageReader, MessageWriter};
use crate::wire::message::{Operation, PeerMessage};

/// Write half of one peer connection. Cloning shares the underlying stream;
/// the per-handle lock keeps concurrent frames from interleaving.
#[derive(Clone)]
struct PeerHandle {
    id: u64,
    addr: SocketAddr,
    writer: Arc<Mutex<MessageWriter<TcpStream>>>,
}

impl PeerHandle {
    fn send(&self, message: &PeerMessage) -> Result<(), crate::wire::WireError> {
        let mut writer = self.writer.lock().expect("peer writer lock poisoned");
        writer.write_message(message)?;
        Ok(())
    }

    fn close(&self) {
        let writer = self.writer.lock().expect("peer writer lock poisoned");
        let _ = writer.get_ref().shutdown(Shutdown::Both);
    }
}

#[derive(Clone, Debug, Default)]
struct Presence {
    user_name: Option<String>,
    color: Option<String>,
}

struct ReplicaState {
    document: Document,
    clock: LogicalClock,
    peers: Vec<PeerHandle>,
    presence: Presence,
}

struct ReplicaInner {
    node_id: NodeId,
    state: Mutex<ReplicaState>,
    events: EventHub,
    next_peer_id: AtomicU64,
}

enum PeerRole {
    /// Inbound connection: greet with a `Sync` of the current document.
    Accepted,
    /// Outbound connection: ask for the peer's document with `Init`.
    Dialed,
}

/// One collaborative-editing replica. Cheap to clone; all clones share
/// state.
#[derive(Clone)]
pub struct Replica {
    inner: Arc<ReplicaInner>,
}

impl Replica {
    /// A replica over an empty document.
    pub fn new(node_id: NodeId) -> Replica {
        Replica::with_document(Document::new(), node_id)
    }

    /// A replica over a pre-seeded document (e.g. loaded from a file).
    pub fn with_document(document: Document, node_id: NodeId) -> Replica {
        let clock = LogicalClock::with_value(document.max_clock());
        Replica {
            inner: Arc::new(ReplicaInner {
                node_id,
                state: Mutex::new(ReplicaState {
                    document,
                    clock,
                    peers: Vec::new(),
                    presence: Presence::default(),
                }),
                events: EventHub::new(),
                next_peer_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    /// Name and color attached to outgoing presence messages.
    pub fn set_presence(&self, user_name: Option<String>, color: Option<String>) {
        let mut state = self.state();
        state.presence = Presence { user_name, color };
    }

    /// Snapshot of the current document.
    pub fn document(&self) -> Document {
        self.state().document.clone()
    }

    /// Current plain-text contents.
    pub fn text(&self) -> String {
        self.state().document.to_text()
    }

    pub fn clock_value(&self) -> u64 {
        self.state().clock.value()
    }

    pub fn peer_count(&self) -> usize {
        self.state().peers.len()
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.inner.events.subscribe()
    }

    /// Register a callback run on its own thread for every replica event.
    /// Listeners must not call back into the replica synchronously with the
    /// expectation of observing the triggering state.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(ReplicaEvent) + Send + 'static,
    {
        self.inner.events.add_listener(listener);
    }

    /// Insert `value` at 1-based `(line, column)`: allocate a position,
    /// apply locally, broadcast. Returns the allocated position.
    pub fn insert_at(&self, line: usize, column: usize, value: char) -> crate::Result<Position> {
        let node_id = self.node_id();
        let (position, message) = {
            let mut state = self.state();
            let position = state.document.generate_position_at(line, column, node_id)?;
            let clock = state.clock.tick();
            state
                .document
                .insert_character(value, position.clone(), clock);
            let message = PeerMessage::operation(Operation::Insert {
                position: position.clone(),
                character: value,
                user_id: node_id,
                clock,
            });
            (position, message)
        };
        self.broadcast(&message);
        Ok(position)
    }

    /// Delete the character at `pos`: apply locally, broadcast. Returns the
    /// removed character value. A missing position is an error for local
    /// deletes; only remote deletes are idempotent.
    pub fn delete(&self, pos: &Position) -> crate::Result<char> {
        let node_id = self.node_id();
        let (value, message) = {
            let mut state = self.state();
            let removed = state.document.delete_character(pos)?;
            let clock = state.clock.tick();
            let message = PeerMessage::operation(Operation::Delete {
                position: pos.clone(),
                user_id: node_id,
                clock,
            });
            (removed.value, message)
        };
        self.broadcast(&message);
        Ok(value)
    }

    /// Delete the character at 1-based `(line, column)`.
    pub fn delete_at(&self, line: usize, column: usize) -> crate::Result<char> {
        let pos = {
            let state = self.state();
            state.document.find_position_at(line, column)?
        };
        self.delete(&pos)
    }

    /// Broadcast the local cursor position to all peers.
    pub fn publish_cursor(&self, position: Position) {
        let message = {
            let state = self.state();
            PeerMessage::cursor(
                position,
                self.node_id(),
                state.presence.user_name.clone(),
                state.presence.color.clone(),
            )
        };
        self.broadcast(&message);
    }

    /// Broadcast the local selection to all peers.
    pub fn publish_selection(&self, start: Position, end: Position) {
        let message = {
            let state = self.state();
            PeerMessage::selection(
                Some(start),
                Some(end),
                self.node_id(),
                state.presence.user_name.clone(),
                state.presence.color.clone(),
            )
        };
        self.broadcast(&message);
    }

    /// Broadcast an empty selection, clearing this user's highlight.
    pub fn clear_selection(&self) {
        let message = {
            let state = self.state();
            PeerMessage::clear_selection(
                self.node_id(),
                state.presence.user_name.clone(),
                state.presence.color.clone(),
            )
        };
        self.broadcast(&message);
    }

    /// Dial `addr`, register the connection, and request the peer's
    /// document with an `Init`. The answering `Sync` replaces the local
    /// document; edits made here before it lands are discarded, so join
    /// before editing.
    pub fn join(&self, addr: &str) -> crate::Result<SocketAddr> {
        let stream = TcpStream::connect(addr).map_err(|source| ReplicaError::Join {
            addr: addr.to_string(),
            source,
        })?;
        let peer_addr = self
            .attach(stream, PeerRole::Dialed)
            .map_err(ReplicaError::Connection)?;
        Ok(peer_addr)
    }

    /// Register an inbound connection (listener side) and greet it with a
    /// `Sync` of the current document.
    pub(crate) fn accept(&self, stream: TcpStream) {
        match self.attach(stream, PeerRole::Accepted) {
            Ok(addr) => tracing::info!(%addr, "peer connected"),
            Err(err) => tracing::warn!(error = %err, "inbound peer setup failed"),
        }
    }

    /// Close every peer connection, which also terminates their receive
    /// threads.
    pub fn shutdown(&self) {
        let peers: Vec<PeerHandle> = {
            let mut state = self.state();
            state.peers.drain(..).collect()
        };
        for peer in peers {
            peer.close();
        }
    }

    fn attach(&self, stream: TcpStream, role: PeerRole) -> std::io::Result<SocketAddr> {
        let _ = stream.set_nodelay(true);
        let addr = stream.peer_addr()?;
        let read_half = stream.try_clone()?;

        let id = self.inner.next_peer_id.fetch_add(1, Ordering::Relaxed);
        let handle = PeerHandle {
            id,
            addr,
            writer: Arc::new(Mutex::new(MessageWriter::new(stream))),
        };

        let greeting = {
            let mut state = self.state();
            state.peers.push(handle.clone());
            match role {
                PeerRole::Accepted => {
                    PeerMessage::sync(state.document.clone(), self.node_id())
                }
                PeerRole::Dialed => PeerMessage::init_request(self.node_id()),
            }
        };
        if let Err(err) = handle.send(&greeting) {
            tracing::warn!(%addr, error = %err, "greeting failed; dropping peer");
            self.remove_peer(id);
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, err));
        }

        let replica = self.clone();
        thread::spawn(move || run_session(replica, read_half, id, addr));

        self.inner.events.publish(ReplicaEvent::PeerConnected { addr });
        Ok(addr)
    }

    /// Send `message` to every connected peer, best-effort. Failed sends
    /// drop the peer and carry on.
    fn broadcast(&self, message: &PeerMessage) {
        let peers: Vec<PeerHandle> = self.state().peers.clone();
        for peer in peers {
            if let Err(err) = peer.send(message) {
                tracing::warn!(addr = %peer.addr, error = %err, "broadcast failed; dropping peer");
                self.remove_peer(peer.id);
            }
        }
    }

    /// Apply one remote frame.
    fn handle_message(&self, message: PeerMessage, peer_id: u64) {
        match message {
            PeerMessage::Operation { operation, user_id } => {
                if user_id == self.node_id() {
                    // our own echo; already applied locally
                    return;
                }
                {
                    let mut state = self.state();
                    state.clock.observe(operation.clock());
                    match &operation {
                        Operation::Insert {
                            position,
                            character,
                            clock,
                            ..
                        } => {
                            state
                                .document
                                .insert_character(*character, position.clone(), *clock);
                        }
                        Operation::Delete { position, .. } => {
                            match state.document.delete_character(position) {
                                Ok(_) => {}
                                // already gone: deletes are idempotent
                                Err(DocumentError::NotFound) => {
                                    tracing::debug!(%user_id, "remote delete of absent position ignored");
                                }
                                Err(err) => {
                                    tracing::warn!(%user_id, error = %err, "remote delete rejected");
                                }
                            }
                        }
                    }
                }
                self.inner
                    .events
                    .publish(ReplicaEvent::OperationApplied { operation });
            }
            PeerMessage::Sync { document, user_id } => {
                if user_id == self.node_id() {
                    return;
                }
                // a document always holds at least one line, even if the
                // peer sent none
                let document = if document.lines.is_empty() {
                    Document::new()
                } else {
                    document
                };
                {
                    let mut state = self.state();
                    state.clock.observe(document.max_clock());
                    state.document = document;
                }
                tracing::debug!(%user_id, "document replaced by sync");
                self.inner
                    .events
                    .publish(ReplicaEvent::DocumentReplaced { user_id });
            }
            PeerMessage::Init { .. } => {
                let reply = {
                    let state = self.state();
                    PeerMessage::sync(state.document.clone(), self.node_id())
                };
                if let Some(peer) = self.peer(peer_id) {
                    if let Err(err) = peer.send(&reply) {
                        tracing::warn!(addr = %peer.addr, error = %err, "sync reply failed; dropping peer");
                        self.remove_peer(peer_id);
                    }
                }
            }
            PeerMessage::Cursor { cursor, .. } => {
                self.inner
                    .events
                    .publish(ReplicaEvent::CursorMoved { cursor });
            }
            PeerMessage::Selection { selection, .. } => {
                self.inner
                    .events
                    .publish(ReplicaEvent::SelectionChanged { selection });
            }
            PeerMessage::Ack { user_id } => {
                tracing::debug!(%user_id, "ack received");
            }
            PeerMessage::Error { error, user_id } => {
                tracing::warn!(%user_id, %error, "peer reported an error");
            }
        }
    }

    fn peer(&self, id: u64) -> Option<PeerHandle> {
        self.state().peers.iter().find(|p| p.id == id).cloned()
    }

    fn remove_peer(&self, id: u64) {
        let removed = {
            let mut state = self.state();
            state
                .peers
                .iter()
                .position(|p| p.id == id)
                .map(|i| state.peers.remove(i))
        };
        if let Some(peer) = removed {
            peer.close();
            self.inner
                .events
                .publish(ReplicaEvent::PeerDisconnected { addr: peer.addr });
        }
    }

    fn state(&self) -> MutexGuard<'_, ReplicaState> {
        self.inner.state.lock().expect("replica state lock poisoned")
    }
}

/// Blocking receive loop for one connection; exits on close or error and
/// removes the peer either way.
fn run_session(replica: Replica, stream: TcpStream, peer_id: u64, addr: SocketAddr) {
    let mut reader = MessageReader::new(stream);
    loop {
        match reader.read_next() {
            Ok(Some(message)) => replica.handle_message(message, peer_id),
            Ok(None) => {
                tracing::debug!(%addr, "peer closed the connection");
                break;
            }
            Err(err) => {
                tracing::warn!(%addr, error = %err, "receive failed; dropping peer");
                break;
            }
        }
    }
    replica.remove_peer(peer_id);
}
