//! Signature message construction.
//!
//! Every BLS signature in the protocol is over a domain-tagged message so
//! that a reduction vote can never be replayed as an agreement vote (or as a
//! vote for another round/step).

use crate::{Hash, StepVotes};

/// Domain tag for reduction step votes.
pub const DOMAIN_REDUCTION: &[u8] = b"reduction:";
/// Domain tag for agreement attestations.
pub const DOMAIN_AGREEMENT: &[u8] = b"agreement:";

/// The message a committee member BLS-signs when voting in a reduction step.
pub fn reduction_vote_message(round: u64, step: u8, block_hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_REDUCTION.len() + 8 + 1 + 32);
    message.extend_from_slice(DOMAIN_REDUCTION);
    message.extend_from_slice(&round.to_le_bytes());
    message.push(step);
    message.extend_from_slice(block_hash.as_bytes());
    message
}

/// The message a node BLS-signs over a full agreement payload.
///
/// Binds the round, the step the agreement was reached at, the winning hash
/// and both step-vote aggregates.
pub fn agreement_message(round: u64, step: u8, block_hash: &Hash, votes: &[StepVotes; 2]) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_AGREEMENT.len() + 8 + 1 + 32 + 128);
    message.extend_from_slice(DOMAIN_AGREEMENT);
    message.extend_from_slice(&round.to_le_bytes());
    message.push(step);
    message.extend_from_slice(block_hash.as_bytes());
    for sv in votes {
        message.extend_from_slice(&sv.to_signable_bytes());
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_messages_differ_by_position() {
        let hash = Hash::digest(b"candidate");
        let base = reduction_vote_message(5, 2, &hash);
        assert_ne!(base, reduction_vote_message(6, 2, &hash));
        assert_ne!(base, reduction_vote_message(5, 3, &hash));
        assert_ne!(base, reduction_vote_message(5, 2, &Hash::EMPTY));
    }

    #[test]
    fn domains_do_not_collide() {
        let hash = Hash::digest(b"candidate");
        let reduction = reduction_vote_message(1, 1, &hash);
        let agreement = agreement_message(
            1,
            1,
            &hash,
            &[StepVotes::default(), StepVotes::default()],
        );
        assert_ne!(reduction, agreement);
    }
}
