//! Score selection.
//!
//! Collects scored proposals for one (round, step) and elects the best one
//! within a deadline: lexicographically higher score wins, ties break to the
//! lower block hash.

use crate::error::ConsensusError;
use crate::generation::BlindBidProver;
use crate::sortition::VotingCommittee;
use nocturne_messages::{MessageHeader, ScorePayload};
use nocturne_types::{BidList, EdPublicKey, Hash, ProvisionerSet};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// The best proposal seen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestScore {
    /// The proposal's score `Y`.
    pub score: [u8; 32],
    /// The candidate hash it backs.
    pub block_hash: Hash,
}

enum State {
    Collecting,
    Decided,
}

/// The selection phase for one (round, step).
pub struct Selection {
    round: u64,
    step: u8,
    committee: Arc<VotingCommittee>,
    state: State,
    best: Option<BestScore>,
    proposers: HashSet<EdPublicKey>,
}

impl Selection {
    /// Start collecting for (round, step) against the generation committee.
    pub fn new(round: u64, step: u8, committee: Arc<VotingCommittee>) -> Self {
        Self {
            round,
            step,
            committee,
            state: State::Collecting,
            best: None,
            proposers: HashSet::new(),
        }
    }

    /// The best proposal so far.
    pub fn best(&self) -> Option<&BestScore> {
        self.best.as_ref()
    }

    /// Process one score message.
    ///
    /// Verifies the proposer's eligibility and proof, then keeps the
    /// proposal if it beats the current best.
    pub fn process_score(
        &mut self,
        header: &MessageHeader,
        payload: &ScorePayload,
        provisioners: &ProvisionerSet,
        bid_list: &BidList,
        prover: &dyn BlindBidProver,
    ) -> Result<(), ConsensusError> {
        if matches!(self.state, State::Decided) {
            return Err(ConsensusError::AlreadyDecided);
        }
        if header.round != self.round || header.step != self.step {
            return Err(ConsensusError::Stale {
                round: header.round,
                step: header.step,
            });
        }

        // One proposal per proposer per step.
        if self.proposers.contains(&header.signer) {
            return Err(ConsensusError::DuplicateVote);
        }

        // The proposer must hold a slot in the generation committee.
        let provisioner = provisioners
            .get_by_ed_key(&header.signer)
            .ok_or(ConsensusError::UnknownProvisioner)?;
        if !self.committee.is_member(&provisioner.bls_public_key) {
            return Err(ConsensusError::NotCommitteeMember {
                round: self.round,
                step: self.step,
            });
        }

        // The bid behind the score must exist and be unexpired.
        if !bid_list.contains(&payload.bid_identity, self.round) {
            return Err(ConsensusError::UnknownBid);
        }

        // The oracle has the last word on the proof.
        if !prover.verify(
            &payload.proof,
            &payload.seed,
            &payload.score,
            &payload.bid_identity,
        ) {
            return Err(ConsensusError::InvalidProof);
        }

        self.proposers.insert(header.signer);

        if self.improves_best(&payload.score, &payload.block_hash) {
            debug!(
                round = self.round,
                step = self.step,
                block_hash = ?payload.block_hash,
                "new best score"
            );
            self.best = Some(BestScore {
                score: payload.score,
                block_hash: payload.block_hash,
            });
        } else {
            trace!(
                round = self.round,
                step = self.step,
                block_hash = ?payload.block_hash,
                "score below current best"
            );
        }

        Ok(())
    }

    /// End collection. Returns the winning hash, or the empty hash when no
    /// valid proposal arrived.
    pub fn decide(&mut self) -> Hash {
        self.state = State::Decided;
        let winner = self
            .best
            .as_ref()
            .map_or(Hash::EMPTY, |best| best.block_hash);
        debug!(
            round = self.round,
            step = self.step,
            block_hash = ?winner,
            "selection decided"
        );
        winner
    }

    fn improves_best(&self, score: &[u8; 32], block_hash: &Hash) -> bool {
        match &self.best {
            None => true,
            Some(best) => {
                // Scores order as big-endian integers; byte comparison
                // matches. Ties break to the lower hash.
                score > &best.score
                    || (score == &best.score && block_hash < &best.block_hash)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockProver;
    use nocturne_types::{Bid, BlsPublicKey, Provisioner, Seed};

    fn fixtures() -> (ProvisionerSet, Arc<VotingCommittee>) {
        let provisioners: ProvisionerSet = (1..=3u8)
            .map(|tag| Provisioner {
                bls_public_key: BlsPublicKey::from_bytes([tag; 96]),
                ed_public_key: EdPublicKey::from_bytes([tag; 32]),
                stake: 1_000,
                start_round: 0,
                end_round: u64::MAX,
            })
            .collect();
        // One slot per member keeps eligibility independent of slot draws.
        let committee = Arc::new(VotingCommittee::from_members(
            provisioners.iter().map(|p| (p.bls_public_key, 1)),
        ));
        (provisioners, committee)
    }

    fn score_payload(score: [u8; 32], tag: u8, seed: &Seed) -> (ScorePayload, BidList) {
        let identity = [tag; 32];
        let mut bid_list = BidList::new();
        bid_list.push(Bid {
            x: identity,
            end_round: u64::MAX,
        });
        // Forge a proof the mock oracle accepts for these public values.
        let proof = nocturne_types::Hash::digest_all(&[
            b"blind-bid-proof",
            seed.as_bytes(),
            &score,
            &identity,
        ])
        .as_bytes()
        .to_vec();
        (
            ScorePayload {
                block_hash: Hash::digest(&[tag]),
                score,
                proof,
                seed: *seed,
                bid_identity: identity,
            },
            bid_list,
        )
    }

    fn header(tag: u8) -> MessageHeader {
        MessageHeader {
            round: 1,
            step: 1,
            signer: EdPublicKey::from_bytes([tag; 32]),
        }
    }

    #[test]
    fn higher_score_wins() {
        let (provisioners, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        let seed = Seed::default().next(1);

        let mut low = [0x80u8; 32];
        low[31] = 0x00;
        let mut high = [0x80u8; 32];
        high[31] = 0x01;

        let (low_payload, low_bids) = score_payload(low, 1, &seed);
        let (high_payload, high_bids) = score_payload(high, 2, &seed);

        selection
            .process_score(&header(1), &low_payload, &provisioners, &low_bids, &MockProver)
            .unwrap();
        selection
            .process_score(&header(2), &high_payload, &provisioners, &high_bids, &MockProver)
            .unwrap();

        assert_eq!(selection.decide(), high_payload.block_hash);
    }

    #[test]
    fn tie_breaks_to_lower_hash() {
        let (provisioners, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        let seed = Seed::default().next(1);
        let score = [0x42u8; 32];

        let (a, a_bids) = score_payload(score, 1, &seed);
        let (b, b_bids) = score_payload(score, 2, &seed);
        let lower_hash = a.block_hash.min(b.block_hash);

        selection
            .process_score(&header(1), &a, &provisioners, &a_bids, &MockProver)
            .unwrap();
        selection
            .process_score(&header(2), &b, &provisioners, &b_bids, &MockProver)
            .unwrap();

        assert_eq!(selection.decide(), lower_hash);
    }

    #[test]
    fn no_proposals_elects_empty_hash() {
        let (_, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        assert_eq!(selection.decide(), Hash::EMPTY);
    }

    #[test]
    fn non_member_is_rejected() {
        let (provisioners, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        let seed = Seed::default().next(1);
        let (payload, bids) = score_payload([1; 32], 9, &seed);

        let err = selection
            .process_score(&header(9), &payload, &provisioners, &bids, &MockProver)
            .unwrap_err();
        assert_eq!(err, ConsensusError::UnknownProvisioner);
        assert!(selection.best().is_none());
    }

    #[test]
    fn invalid_proof_is_rejected() {
        let (provisioners, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        let seed = Seed::default().next(1);
        let (mut payload, bids) = score_payload([1; 32], 1, &seed);
        payload.proof[0] ^= 0xff;

        let err = selection
            .process_score(&header(1), &payload, &provisioners, &bids, &MockProver)
            .unwrap_err();
        assert_eq!(err, ConsensusError::InvalidProof);
    }

    #[test]
    fn duplicate_proposer_is_rejected() {
        let (provisioners, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        let seed = Seed::default().next(1);
        let (payload, bids) = score_payload([1; 32], 1, &seed);

        selection
            .process_score(&header(1), &payload, &provisioners, &bids, &MockProver)
            .unwrap();
        let err = selection
            .process_score(&header(1), &payload, &provisioners, &bids, &MockProver)
            .unwrap_err();
        assert_eq!(err, ConsensusError::DuplicateVote);
    }

    #[test]
    fn decided_selection_refuses_input() {
        let (provisioners, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        selection.decide();

        let seed = Seed::default().next(1);
        let (payload, bids) = score_payload([1; 32], 1, &seed);
        let err = selection
            .process_score(&header(1), &payload, &provisioners, &bids, &MockProver)
            .unwrap_err();
        assert_eq!(err, ConsensusError::AlreadyDecided);
    }

    #[test]
    fn stale_round_is_rejected() {
        let (provisioners, committee) = fixtures();
        let mut selection = Selection::new(1, 1, committee);
        let seed = Seed::default().next(1);
        let (payload, bids) = score_payload([1; 32], 1, &seed);
        let mut hdr = header(1);
        hdr.round = 9;

        let err = selection
            .process_score(&hdr, &payload, &provisioners, &bids, &MockProver)
            .unwrap_err();
        assert!(matches!(err, ConsensusError::Stale { round: 9, .. }));
    }
}
