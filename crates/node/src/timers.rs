//! Timer management for the runner.
//!
//! Timers are spawned as tokio tasks and can be cancelled. A fired timer
//! sends its event into the runner's event channel.

use nocturne_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Convert a TimerId to the corresponding Event.
fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::Generation => Event::GenerationTimer,
        TimerId::Selection => Event::SelectionTimer,
        TimerId::Reduction => Event::ReductionTimer,
    }
}

/// Manages the round's timers.
///
/// Each timer is a tokio task that sleeps for the given duration and then
/// sends the matching timer event.
pub struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    /// A manager feeding `event_tx`.
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Arm a timer. An already-armed timer with the same id is replaced.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(?id, "timer fired");
            let _ = event_tx.send(timer_event(id)).await;
        });

        self.timers.insert(id, handle);
        debug!(?id, ?duration, "timer set");
    }

    /// Disarm a timer. A no-op if it is not armed or already fired.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            debug!(?id, "timer cancelled");
        }
    }

    /// Disarm everything. Called on shutdown and round advance.
    pub fn cancel_all(&mut self) {
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(?id, "timer cancelled (shutdown)");
        }
    }

    /// Number of armed timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
