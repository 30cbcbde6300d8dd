//! State machine trait.

use crate::{Action, Event};

/// A synchronous, deterministic event handler.
///
/// Implementations mutate internal state and return the actions the runner
/// should perform. They never block and never perform I/O.
pub trait StateMachine {
    /// Process one event.
    fn handle(&mut self, event: Event) -> Vec<Action>;
}
