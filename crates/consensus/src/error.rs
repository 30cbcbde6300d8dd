//! Consensus error taxonomy.

use crate::generation::ProverError;
use crate::sortition::SortitionError;
use nocturne_types::SignatureError;
use thiserror::Error;

/// How a failed operation should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Drop the message and debit the sender's reputation.
    ProtocolViolation,
    /// Drop silently; the message refers to a position we have passed.
    Stale,
    /// Retry at the next step; abort the round if it persists.
    Transient,
    /// Surface to the sequencer; the core halts until external recovery.
    Fatal,
}

/// Everything that can go wrong while processing consensus input.
///
/// Recoverable variants never leave the phase that produced them; only
/// `Fatal`-severity errors reach the sequencer's caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// A signature failed to parse or verify.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The envelope signer is not a staked provisioner.
    #[error("sender is not a provisioner")]
    UnknownProvisioner,

    /// The payload's BLS key does not belong to the envelope signer.
    #[error("BLS key does not match the envelope signer")]
    KeyMismatch,

    /// The signer holds no slot in the committee for this (round, step).
    #[error("signer is not a committee member at round {round} step {step}")]
    NotCommitteeMember {
        /// The committee's round.
        round: u64,
        /// The committee's step.
        step: u8,
    },

    /// The blind-bid proof did not verify.
    #[error("blind bid proof rejected")]
    InvalidProof,

    /// The score's bid identity is not in the current bid list.
    #[error("bid identity not in the current bid list")]
    UnknownBid,

    /// An agreement cannot certify the empty hash.
    #[error("agreement over the empty hash")]
    EmptyAgreementHash,

    /// The embedded step votes do not carry quorum.
    #[error("step votes below quorum at step {step}")]
    StepVotesBelowQuorum {
        /// The reduction step the votes claim.
        step: u8,
    },

    /// The message refers to a (round, step) we have moved past.
    #[error("stale message for round {round} step {step}")]
    Stale {
        /// The message's round.
        round: u64,
        /// The message's step.
        step: u8,
    },

    /// A second vote from the same signer within one step.
    #[error("duplicate vote")]
    DuplicateVote,

    /// The phase is no longer accepting this input.
    #[error("phase already decided")]
    AlreadyDecided,

    /// Sortition could not produce a committee.
    #[error(transparent)]
    Sortition(#[from] SortitionError),

    /// The blind-bid oracle failed.
    #[error(transparent)]
    Prover(#[from] ProverError),
}

impl ConsensusError {
    /// The handling policy for this error.
    pub fn severity(&self) -> Severity {
        match self {
            ConsensusError::Signature(_)
            | ConsensusError::UnknownProvisioner
            | ConsensusError::KeyMismatch
            | ConsensusError::NotCommitteeMember { .. }
            | ConsensusError::InvalidProof
            | ConsensusError::UnknownBid
            | ConsensusError::EmptyAgreementHash
            | ConsensusError::StepVotesBelowQuorum { .. } => Severity::ProtocolViolation,

            ConsensusError::Stale { .. }
            | ConsensusError::DuplicateVote
            | ConsensusError::AlreadyDecided => Severity::Stale,

            ConsensusError::Sortition(_) | ConsensusError::Prover(_) => Severity::Fatal,
        }
    }
}
