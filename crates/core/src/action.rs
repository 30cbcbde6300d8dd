//! Action types for the consensus state machine.

use crate::{Event, Message, TimerId};
use nocturne_messages::ConsensusMessage;
use nocturne_types::Hash;
use std::time::Duration;

/// Actions the consensus state machine wants performed.
///
/// Actions are **commands** — they describe something to do. The runner
/// executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Gossip a signed consensus message to the network.
    ///
    /// The runner also loops the message back onto the local bus so our own
    /// votes and scores take the same path as everyone else's.
    Gossip(ConsensusMessage),

    /// Publish an internal message on the local bus only.
    Publish(Message),

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Arm a timer. Re-arming an already-armed id replaces it.
    SetTimer {
        /// Which timer.
        id: TimerId,
        /// Duration until it fires.
        duration: Duration,
    },

    /// Disarm a timer. A no-op if the timer is not armed.
    CancelTimer {
        /// Which timer.
        id: TimerId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Delegated Work (returns a callback event)
    // ═══════════════════════════════════════════════════════════════════════
    /// Ask the Chain for a mempool snapshot to build a candidate from.
    ///
    /// Returns [`Event::MempoolFetched`] when complete.
    FetchMempoolTxs {
        /// Round the candidate is being built for.
        round: u64,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Finalization
    // ═══════════════════════════════════════════════════════════════════════
    /// Hand the certified winning hash to the Chain.
    ///
    /// The Chain locates the matching candidate (through the candidate
    /// broker if it does not hold it), persists it and eventually publishes
    /// the next `RoundUpdate`.
    AcceptBlock {
        /// The finalized round.
        round: u64,
        /// The certified block hash.
        block_hash: Hash,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal
    // ═══════════════════════════════════════════════════════════════════════
    /// Enqueue an event for immediate processing, ahead of external input.
    EnqueueInternal {
        /// The event to process next.
        event: Event,
    },
}

impl Action {
    /// The action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Gossip(_) => "Gossip",
            Action::Publish(_) => "Publish",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::FetchMempoolTxs { .. } => "FetchMempoolTxs",
            Action::AcceptBlock { .. } => "AcceptBlock",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
        }
    }

    /// Whether this action leaves the node.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::Gossip(_))
    }
}
