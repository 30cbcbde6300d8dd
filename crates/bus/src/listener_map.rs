//! Topic → listener table.

use nocturne_core::Message;
use nocturne_messages::Topic;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;

/// Opaque handle returned by `subscribe`, used to deregister.
pub type ListenerId = u64;

struct IdListener {
    id: ListenerId,
    queue: mpsc::Sender<Message>,
}

/// Listeners stored per topic, in subscription order.
///
/// Reads (publish) take the lock shared; subscription changes take it
/// exclusively. Removal is O(n) in the listeners for that topic and closes
/// the listener's queue by dropping its sender.
pub(crate) struct ListenerMap {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<Topic, Vec<IdListener>>>,
}

impl ListenerMap {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Store a listener queue under a topic.
    pub(crate) fn store(&self, topic: Topic, queue: mpsc::Sender<Message>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.listeners.write().expect("listener map poisoned");
        map.entry(topic).or_default().push(IdListener { id, queue });
        id
    }

    /// Remove a listener by id. Returns whether it was found.
    pub(crate) fn delete(&self, topic: Topic, id: ListenerId) -> bool {
        let mut map = self.listeners.write().expect("listener map poisoned");
        if let Some(listeners) = map.get_mut(&topic) {
            if let Some(pos) = listeners.iter().position(|l| l.id == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    /// Run `f` over every listener queue for a topic.
    pub(crate) fn for_each(&self, topic: Topic, mut f: impl FnMut(&mpsc::Sender<Message>)) {
        let map = self.listeners.read().expect("listener map poisoned");
        if let Some(listeners) = map.get(&topic) {
            for listener in listeners {
                f(&listener.queue);
            }
        }
    }

}
