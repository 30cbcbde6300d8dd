//! Event types for the consensus state machine.

use crate::message::RoundUpdate;
use nocturne_messages::{
    AgreementPayload, CandidatePayload, MessageHeader, ReductionPayload, ScorePayload,
};
use nocturne_types::{AsyncState, Transaction};

/// All possible events the consensus state machine can receive.
///
/// Events are **passive data** — they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Chain
    // ═══════════════════════════════════════════════════════════════════════
    /// Chain announced a new tip; start the next round.
    RoundUpdate(RoundUpdate),

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages
    // ═══════════════════════════════════════════════════════════════════════
    /// Received a score proposal.
    ///
    /// Sender identity comes from the envelope's Edwards key; committee
    /// eligibility is re-checked against the score's bid identity.
    ScoreReceived {
        /// Envelope fields.
        header: MessageHeader,
        /// The score payload.
        score: ScorePayload,
    },

    /// Received a full candidate block.
    CandidateReceived {
        /// Envelope fields.
        header: MessageHeader,
        /// The candidate payload.
        candidate: CandidatePayload,
    },

    /// Received a reduction step vote.
    ReductionReceived {
        /// Envelope fields.
        header: MessageHeader,
        /// The vote payload.
        vote: ReductionPayload,
    },

    /// Received an agreement attestation.
    AgreementReceived {
        /// Envelope fields.
        header: MessageHeader,
        /// The agreement payload.
        agreement: AgreementPayload,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// The generation window elapsed.
    GenerationTimer,
    /// The selection deadline elapsed.
    SelectionTimer,
    /// The running reduction step's duration elapsed.
    ReductionTimer,

    // ═══════════════════════════════════════════════════════════════════════
    // Action Callbacks
    // ═══════════════════════════════════════════════════════════════════════
    /// Mempool snapshot arrived for candidate assembly.
    ///
    /// Callback from [`Action::FetchMempoolTxs`](crate::Action::FetchMempoolTxs).
    MempoolFetched {
        /// Round the snapshot was requested for.
        round: u64,
        /// Transactions to include in the candidate.
        txs: Vec<Transaction>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal
    // ═══════════════════════════════════════════════════════════════════════
    /// The round restarted at a later step; regenerate a score.
    Regeneration(AsyncState),
}

impl Event {
    /// The event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::RoundUpdate(_) => "RoundUpdate",
            Event::ScoreReceived { .. } => "ScoreReceived",
            Event::CandidateReceived { .. } => "CandidateReceived",
            Event::ReductionReceived { .. } => "ReductionReceived",
            Event::AgreementReceived { .. } => "AgreementReceived",
            Event::GenerationTimer => "GenerationTimer",
            Event::SelectionTimer => "SelectionTimer",
            Event::ReductionTimer => "ReductionTimer",
            Event::MempoolFetched { .. } => "MempoolFetched",
            Event::Regeneration(_) => "Regeneration",
        }
    }

    /// Whether this is a timer event.
    pub fn is_timer(&self) -> bool {
        matches!(
            self,
            Event::GenerationTimer | Event::SelectionTimer | Event::ReductionTimer
        )
    }

    /// The round the event pertains to, when it carries one.
    pub fn round(&self) -> Option<u64> {
        match self {
            Event::RoundUpdate(ru) => Some(ru.round),
            Event::ScoreReceived { header, .. }
            | Event::CandidateReceived { header, .. }
            | Event::ReductionReceived { header, .. }
            | Event::AgreementReceived { header, .. } => Some(header.round),
            Event::MempoolFetched { round, .. } => Some(*round),
            Event::Regeneration(state) => Some(state.round),
            Event::GenerationTimer | Event::SelectionTimer | Event::ReductionTimer => None,
        }
    }
}
