//! Multi-topic publish/subscribe.

use crate::dupemap::DupeMap;
use crate::listener_map::ListenerMap;
use nocturne_core::Message;
use nocturne_messages::Topic;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{trace, warn};

pub use crate::listener_map::ListenerId;

/// Errors from bus operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Deregistration referenced an unknown listener.
    #[error("no listener {id} for topic {topic:?}")]
    UnknownListener {
        /// The topic the deregistration targeted.
        topic: Topic,
        /// The unknown id.
        id: ListenerId,
    },
}

/// The in-process event bus.
///
/// Each listener owns a bounded queue; publishing copies the message into
/// every listener buffer without blocking. A full queue drops the message
/// for that listener only (slow consumers shed load, they do not stall the
/// publisher).
pub struct EventBus {
    listeners: ListenerMap,
    dupemap: Mutex<DupeMap>,
    queue_capacity: usize,
}

impl EventBus {
    /// A bus whose listener queues hold up to `queue_capacity` messages.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            listeners: ListenerMap::new(),
            dupemap: Mutex::new(DupeMap::new()),
            queue_capacity,
        }
    }

    /// Register a listener for `topic`. Returns the deregistration handle
    /// and the receiving end of the listener's queue.
    pub fn subscribe(&self, topic: Topic) -> (ListenerId, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = self.listeners.store(topic, tx);
        trace!(?topic, id, "listener subscribed");
        (id, rx)
    }

    /// Deregister a listener. Closes its queue.
    pub fn unsubscribe(&self, topic: Topic, id: ListenerId) -> Result<(), BusError> {
        if self.listeners.delete(topic, id) {
            trace!(?topic, id, "listener unsubscribed");
            Ok(())
        } else {
            Err(BusError::UnknownListener { topic, id })
        }
    }

    /// Publish a message to every listener of its topic.
    ///
    /// A `RoundUpdate` also resets the duplicate filter for the new round.
    pub fn publish(&self, message: Message) {
        let topic = message.topic();
        if let Message::RoundUpdate(ru) = &message {
            self.dupemap
                .lock()
                .expect("dupemap poisoned")
                .update_round(ru.round);
        }

        let mut delivered = 0usize;
        let mut dropped = 0usize;
        self.listeners.for_each(topic, |queue| {
            match queue.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
                // A closed queue belongs to a listener that went away without
                // deregistering; it is cleaned up on its next unsubscribe.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        });

        if dropped > 0 {
            warn!(?topic, dropped, "listener queues full, messages dropped");
        }
        trace!(?topic, delivered, "published");
    }

    /// Whether this payload is seen for the first time this round.
    ///
    /// Ingress gates every inbound wire message through this before
    /// decoding; syntactically identical payloads never reach a component
    /// twice within a round.
    pub fn can_forward(&self, topic: Topic, payload: &[u8]) -> bool {
        self.dupemap
            .lock()
            .expect("dupemap poisoned")
            .can_forward(topic, payload)
    }
}
