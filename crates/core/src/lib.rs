//! Core vocabulary for the Nocturne consensus architecture.
//!
//! This crate provides:
//!
//! - [`Event`]: all possible inputs to the consensus state machine
//! - [`Action`]: all possible outputs from the consensus state machine
//! - [`Message`]: what travels over the in-process event bus
//! - [`StateMachine`]: the trait the sequencer and phase machines implement
//!
//! # Architecture
//!
//! The consensus core is built on a simple event-driven model:
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! State machines are:
//! - **Synchronous**: no async, no .await
//! - **Deterministic**: same state + event = same actions
//! - **Pure-ish**: mutate self, but perform no I/O
//!
//! All I/O is handled by the runner (`nocturne-node`), which delivers bus
//! messages and timer fires as events, executes the returned actions, and
//! feeds action results back in as events.

mod action;
mod event;
mod message;
mod traits;

pub use action::Action;
pub use event::Event;
pub use message::{AbsenteeReport, Message, RoundUpdate};
pub use traits::StateMachine;

/// Identifies the timers a round can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Window for the local score to win before moving to selection anyway.
    Generation,
    /// Selection deadline.
    Selection,
    /// Reduction step duration (re-armed for each of the two steps).
    Reduction,
}
