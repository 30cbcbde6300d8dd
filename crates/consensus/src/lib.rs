//! Consensus phase state machines.
//!
//! This crate implements the round pipeline of the Nocturne protocol:
//!
//! ```text
//! Generation → Selection → Reduction (×2) → Agreement
//! ```
//!
//! Each phase is a synchronous state machine; the [`Sequencer`] multiplexes
//! them across a round and owns all per-round state. All I/O — gossip,
//! timers, bus traffic — is expressed as [`nocturne_core::Action`]s executed
//! by the runner.
//!
//! # Safety properties
//!
//! - A committee member's vote weight equals the sortition slots it won.
//! - No vote is counted twice from the same signer for one (round, step).
//! - Once a hash reaches quorum in a step, that step's outcome is fixed.
//! - A round finalizes only on an agreement whose step votes carry quorum
//!   in both reduction steps.

mod agreement;
mod candidate;
mod committee;
mod config;
mod error;
mod generation;
mod reduction;
mod selection;
mod sequencer;
pub mod sortition;

pub use agreement::AgreementAccumulator;
pub use candidate::{CandidateStore, SharedCandidateStore};
pub use committee::Extractor;
pub use config::Config;
pub use error::{ConsensusError, Severity};
pub use generation::{
    bid_commitment, bid_identity, score_value, BlindBidProver, MockProver, ProverError,
    ScoreGenerator, ScoreProposal,
};
pub use reduction::{ReductionStep, StepOutcome};
pub use selection::{BestScore, Selection};
pub use sequencer::{Phase, Sequencer};
pub use sortition::{deterministic_committee, quorum, SortitionError, VotingCommittee};
