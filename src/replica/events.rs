//! Event fan-out to front-end listeners.
//!
//! The hub hands out channel subscriptions; publishing never blocks and
//! never runs under the replica lock. A subscriber that stops draining its
//! queue is disconnected rather than allowed to stall the hub.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvError, RecvTimeoutError, Sender, TrySendError};

use crate::crdt::position::NodeId;
use crate::wire::message::{CursorState, Operation, SelectionState};

/// Queue depth per subscriber before it counts as lagged.
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

/// What a replica tells its listeners.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicaEvent {
    /// A remote operation was applied to the local document.
    OperationApplied { operation: Operation },
    /// A remote `Sync` replaced the local document wholesale.
    DocumentReplaced { user_id: NodeId },
    /// A collaborator moved their cursor.
    CursorMoved { cursor: CursorState },
    /// A collaborator changed (or cleared) their selection.
    SelectionChanged { selection: SelectionState },
    PeerConnected { addr: SocketAddr },
    PeerDisconnected { addr: SocketAddr },
}

/// Receiving end of one subscription.
pub struct EventSubscription {
    receiver: Receiver<ReplicaEvent>,
}

impl EventSubscription {
    pub fn recv(&self) -> Result<ReplicaEvent, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Option<ReplicaEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ReplicaEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<ReplicaEvent>>>,
}

impl EventHub {
    pub(crate) fn new() -> EventHub {
        EventHub::default()
    }

    pub(crate) fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = bounded(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers
            .lock()
            .expect("event hub lock poisoned")
            .push(sender);
        EventSubscription { receiver }
    }

    /// Run `listener` on its own thread for every future event.
    pub(crate) fn add_listener<F>(&self, listener: F)
    where
        F: Fn(ReplicaEvent) + Send + 'static,
    {
        let subscription = self.subscribe();
        thread::spawn(move || {
            while let Ok(event) = subscription.recv() {
                listener(event);
            }
        });
    }

    /// Deliver `event` to every live subscriber. Full queues drop their
    /// subscription; a slow listener must not stall edits.
    pub(crate) fn publish(&self, event: ReplicaEvent) {
        let mut subscribers = self.subscribers.lock().expect("event hub lock poisoned");
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("event subscriber lagged; dropping its subscription");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64) -> ReplicaEvent {
        ReplicaEvent::DocumentReplaced { user_id: NodeId(n) }
    }

    #[test]
    fn subscribers_each_see_every_event() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.publish(event(1));
        hub.publish(event(2));

        for sub in [&a, &b] {
            assert_eq!(sub.try_recv(), Some(event(1)));
            assert_eq!(sub.try_recv(), Some(event(2)));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let hub = EventHub::new();
        let sub = hub.subscribe();
        drop(sub);

        hub.publish(event(1));
        assert!(hub
            .subscribers
            .lock()
            .expect("event hub lock poisoned")
            .is_empty());
    }

    #[test]
    fn lagged_subscriber_is_disconnected() {
        let hub = EventHub::new();
        let sub = hub.subscribe();

        for i in 0..(SUBSCRIBER_QUEUE_DEPTH as u64 + 8) {
            hub.publish(event(i));
        }
        // the queue filled; the overflowing publish dropped the sender
        assert!(hub
            .subscribers
            .lock()
            .expect("event hub lock poisoned")
            .is_empty());

        // queued events up to the cutoff still drain
        assert_eq!(sub.try_recv(), Some(event(0)));
    }

    #[test]
    fn listener_callback_runs_off_thread() {
        let hub = EventHub::new();
        let (tx, rx) = crossbeam::channel::bounded(1);
        hub.add_listener(move |event| {
            let _ = tx.try_send(event);
        });

        hub.publish(event(9));
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, event(9));
    }
}
