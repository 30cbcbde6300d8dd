//! Core types for Nocturne consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, seed, cryptographic keys and signatures
//! - **Staking**: Provisioner, ProvisionerSet, Bid, BidList
//! - **Consensus types**: Block, CandidateBlock, VotingCommittee, StepVotes, Agreement
//! - **Encoding**: base58 for key display
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod base58;
mod bid;
mod block;
mod hash;
mod keys;
mod provisioner;
mod signer_bitfield;
mod signing;
mod step_votes;

pub use base58::{base58_decode, base58_encode, Base58Error};
pub use bid::{Bid, BidList};
pub use block::{Block, BlockHeader, CandidateBlock, Transaction, BLOCK_VERSION};
pub use hash::{Hash, HexError, Seed};
pub use keys::{
    BlsAggregate, BlsKeyPair, BlsPublicKey, BlsSignature, ConsensusKeys, EdKeyPair, EdPublicKey,
    EdSignature, SignatureError, BLS_PUBLIC_KEY_SIZE, BLS_SIGNATURE_SIZE, ED_PUBLIC_KEY_SIZE,
    ED_SIGNATURE_SIZE,
};
pub use provisioner::{Provisioner, ProvisionerSet};
pub use signer_bitfield::SignerBitfield;
pub use signing::{agreement_message, reduction_vote_message, DOMAIN_AGREEMENT, DOMAIN_REDUCTION};
pub use step_votes::{Agreement, StepVotes};

/// Snapshot of the consensus position, used to route regeneration triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncState {
    /// Round the trigger belongs to.
    pub round: u64,
    /// Step the trigger belongs to.
    pub step: u8,
}
